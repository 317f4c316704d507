//! CLI entry point: load a configuration file, assemble the server, and
//! serve until a shutdown signal arrives.
//!
//! Grounded on `original_source/main.go` (argument parsing, usage banner)
//! and `original_source/micro/serve.go` (the startup log line).

use std::process::ExitCode;

use maguro::logging;
use maguro::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let Some(config_path) = args.get(1) else {
        print_usage(&args);
        return ExitCode::FAILURE;
    };

    if let Err(err) = run(config_path).await {
        eprintln!("maguro: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let server = Server::from_config_path(config_path)?;

    logging::init(server.config.core.log_level, &server.config.core.log_out)?;

    print_banner(&server);

    server.serve().await?;
    Ok(())
}

fn print_usage(args: &[String]) {
    let prog = args.first().map(String::as_str).unwrap_or("maguro");
    println!(
        "maguro version {}\n\nUsage:\n\n\t{prog} /path/to/config.json\n",
        maguro::VERSION
    );
}

fn print_banner(server: &Server) {
    let addr = format!("{}:{}", server.config.core.address, server.config.core.port);
    println!("===============================================");
    println!("  maguro {}", maguro::VERSION);
    println!("  listening on {addr}");
    if server.config.core.tls.enabled {
        println!("  TLS enabled");
    }
    if server.config.core.virtual_hosting {
        println!("  virtual hosting: {} host(s)", server.vhosts.len());
    }
    if server.config.metrics.enabled {
        println!("  metrics at {}", server.config.metrics.path);
    }
    println!("===============================================");
}
