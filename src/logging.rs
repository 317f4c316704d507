//! `tracing` subscriber setup and the per-request network log line.
//!
//! Grounded on `original_source/micro/log.go`: a numeric `log_level`
//! (0=error .. 4+=trace) and a `log_out` target (`stdout`, `stderr`, or
//! a file path opened in append mode) drive a `tracing_subscriber::fmt`
//! layer with an `EnvFilter`.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::StartupError;

/// Map the reference server's numeric log level to a `tracing` level.
fn level_for(log_level: i32) -> Level {
    match log_level {
        i32::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize the global `tracing` subscriber from `log_level`/`log_out`.
///
/// `log_out` of `"stdout"` or `"stderr"` writes to the matching stream;
/// anything else is treated as a file path and opened in append mode.
pub fn init(log_level: i32, log_out: &str) -> Result<(), StartupError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for(log_level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_out {
        "stdout" => {
            builder.with_writer(std::io::stdout).init();
        }
        "stderr" => {
            builder.with_writer(std::io::stderr).init();
        }
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(path))
                .map_err(|source| StartupError::Resource {
                    path: path.into(),
                    source,
                })?;
            builder.with_writer(std::sync::Mutex::new(file)).init();
        }
    }

    Ok(())
}

/// Emit the per-request network log line, in the reference's
/// `LogNetwork` shape: status, method, host, path, query, remote
/// address, user agent.
#[allow(clippy::too_many_arguments)]
pub fn log_network(
    status: u16,
    method: &str,
    host: &str,
    path: &str,
    query: &str,
    remote_addr: &str,
    user_agent: &str,
) {
    tracing::info!(
        status,
        method,
        host,
        path,
        query,
        remote_addr,
        user_agent,
        "request"
    );
}
