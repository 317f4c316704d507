//! TLS configuration assembly: certificate/key loading and the cipher
//! baseline described in the external interface.
//!
//! Grounded on `original_source/micro/tls.go`'s `httpCreateTLSConfig`:
//! minimum TLS 1.2, AEAD-only cipher suites, curve preferences, and an
//! ALPN list that advertises the ACME TLS-ALPN challenge protocol when
//! autocert is configured.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring::{self, cipher_suite};
use rustls::crypto::CryptoProvider;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::config::TlsConfig;
use crate::error::StartupError;

/// ALPN protocol id for the ACME `tls-alpn-01` challenge.
const ACME_TLS_ALPN_PROTOCOL: &[u8] = b"acme-tls/1";

/// Build a `rustls::ServerConfig` from the static certificate/key pair
/// named in `tls`. Autocert issuance is not wired to a certificate
/// authority client in this build (no ACME client crate is part of the
/// dependency stack); a config with `auto_cert.enabled` set is rejected
/// here rather than silently falling back to self-signed or unissued
/// certificates.
pub fn build_server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>, StartupError> {
    if tls.auto_cert.enabled {
        return Err(StartupError::Resource {
            path: "core.tls.auto_cert".into(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "autocert is not implemented in this build; configure tls_cert/tls_key instead",
            ),
        });
    }

    let cert_chain = load_certs(&tls.tls_cert)?;
    let key = load_key(&tls.tls_key)?;

    let provider = restricted_provider();

    let mut config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|source| StartupError::Resource {
            path: tls.tls_cert.clone().into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, source),
        })?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|source| StartupError::Resource {
            path: tls.tls_cert.clone().into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    if !tls.private_ca.is_empty() {
        let mut roots = RootCertStore::empty();
        for path in &tls.private_ca {
            for cert in load_certs(path)? {
                let _ = roots.add(cert);
            }
        }
        // Trusted roots are loaded for future mutual-TLS verification;
        // this build does not yet enforce client certificate checks.
        let _ = roots;
    }

    Ok(Arc::new(config))
}

/// Append the ACME TLS-ALPN protocol id ahead of `h2`/`http/1.1`, for use
/// once autocert is wired to a real ACME client.
pub fn with_acme_alpn(config: &mut ServerConfig) {
    config.alpn_protocols.insert(0, ACME_TLS_ALPN_PROTOCOL.to_vec());
}

fn restricted_provider() -> CryptoProvider {
    let mut provider = ring::default_provider();
    provider.cipher_suites = vec![
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS13_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    ];
    provider
}

fn load_certs(path: impl AsRef<Path>) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, StartupError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StartupError::Resource {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StartupError::Resource {
            path: path.to_path_buf(),
            source,
        })
}

fn load_key(path: impl AsRef<Path>) -> Result<rustls::pki_types::PrivateKeyDer<'static>, StartupError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StartupError::Resource {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut keys = pkcs8_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StartupError::Resource {
            path: path.to_path_buf(),
            source,
        })?;
    let key = keys.pop().ok_or_else(|| StartupError::Resource {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "no PKCS#8 private key found"),
    })?;
    Ok(rustls::pki_types::PrivateKeyDer::Pkcs8(key))
}
