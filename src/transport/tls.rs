// src/transport/tls.rs
//! Client TLS configuration for the agent stream.
//!
//! The agent trusts only the CA in `ca.pem` and presents `cert.pem`/`key.pem`
//! as its client identity.

use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::constants::{CA_CERT_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE};
use crate::types::{AgentError, Result};

/// Build the mutual-TLS client configuration from `cert_dir`
pub fn load_client_config(cert_dir: &Path) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(&cert_dir.join(CA_CERT_FILE))? {
        roots
            .add(&cert)
            .map_err(|e| AgentError::Tls(format!("Invalid CA certificate: {}", e)))?;
    }

    let certs = read_certs(&cert_dir.join(CLIENT_CERT_FILE))?;
    let key = read_private_key(&cert_dir.join(CLIENT_KEY_FILE))?;

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_single_cert(certs, key)
        .map_err(|e| AgentError::Tls(format!("Invalid client certificate or key: {}", e)))?;

    debug!("Loaded TLS material from {}", cert_dir.display());
    Ok(Arc::new(config))
}

/// Name the server certificate is verified against
pub fn server_name(name: &str) -> Result<ServerName> {
    ServerName::try_from(name).map_err(|_| AgentError::Tls(format!("Invalid TLS server name: {:?}", name)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| AgentError::Tls(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(BufReader::new(file))
}

fn read_certs(path: &Path) -> Result<Vec<Certificate>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| AgentError::Tls(format!("Failed to parse {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(AgentError::Tls(format!("No certificates found in {}", path.display())));
    }

    Ok(certs.into_iter().map(Certificate).collect())
}

fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let mut reader = open(path)?;

    loop {
        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| AgentError::Tls(format!("Failed to parse {}: {}", path.display(), e)))?;

        match item {
            Some(rustls_pemfile::Item::PKCS8Key(key))
            | Some(rustls_pemfile::Item::RSAKey(key))
            | Some(rustls_pemfile::Item::ECKey(key)) => return Ok(PrivateKey(key)),
            Some(_) => continue,
            None => break,
        }
    }

    Err(AgentError::Tls(format!("No private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_ca_is_tls_error() {
        let dir = tempdir().unwrap();
        match load_client_config(dir.path()) {
            Err(AgentError::Tls(msg)) => assert!(msg.contains(CA_CERT_FILE)),
            other => panic!("Expected TLS error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_ca_without_certificates_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CA_CERT_FILE), "not a pem file\n").unwrap();

        match load_client_config(dir.path()) {
            Err(AgentError::Tls(msg)) => assert!(msg.contains("No certificates")),
            other => panic!("Expected TLS error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_key_file_without_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CLIENT_KEY_FILE);
        std::fs::write(&path, "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n").unwrap();

        assert!(matches!(read_private_key(&path), Err(AgentError::Tls(_))));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("ops.example.com").is_ok());
        assert!(server_name("").is_err());
    }
}
