// tests/tls_tests.rs
// Mutual TLS against a local listener that requires a client certificate.

use futures_util::StreamExt;
use rcgen::{BasicConstraints, Certificate as RcgenCertificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig};
use srehub_agent::protocol::AgentMessage;
use srehub_agent::transport::tls::load_client_config;
use srehub_agent::{AgentConfig, AgentError, TransportController};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

struct Authority {
    cert: RcgenCertificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// Issue a leaf certificate; returns (certificate, key pair)
    fn issue(&self, common_name: &str, dns_names: &[&str]) -> (RcgenCertificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let names = dns_names.iter().map(|name| name.to_string()).collect::<Vec<_>>();
        let mut params = CertificateParams::new(names).unwrap();
        params.distinguished_name.push(DnType::CommonName, common_name);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert, key)
    }

    fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(&Certificate(self.cert.der().to_vec())).unwrap();
        roots
    }
}

/// Write ca.pem, cert.pem and key.pem for an agent identity issued by `ca`
fn write_agent_material(dir: &Path, ca: &Authority) {
    let (cert, key) = ca.issue("agent-tls", &["agent-tls"]);
    std::fs::write(dir.join("ca.pem"), ca.cert.pem()).unwrap();
    std::fs::write(dir.join("cert.pem"), cert.pem()).unwrap();
    std::fs::write(dir.join("key.pem"), key.serialize_pem()).unwrap();
}

/// Server config for `localhost` that only accepts clients issued by `ca`
fn server_config(ca: &Authority) -> Arc<ServerConfig> {
    let (cert, key) = ca.issue("srehub-server", &["localhost"]);
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(AllowAnyAuthenticatedClient::new(ca.roots()))
        .with_single_cert(vec![Certificate(cert.der().to_vec())], PrivateKey(key.serialize_der()))
        .unwrap();
    Arc::new(config)
}

fn agent_config(addr: std::net::SocketAddr, cert_dir: &Path) -> AgentConfig {
    let mut config = AgentConfig::new("agent-tls", addr.to_string(), cert_dir);
    config.shell = "/bin/sh".to_string();
    config
}

#[test]
fn client_config_loads_from_valid_material() {
    let dir = tempfile::tempdir().unwrap();
    write_agent_material(dir.path(), &Authority::new("srehub test ca"));

    assert!(load_client_config(dir.path()).is_ok());
}

#[tokio::test]
async fn connect_and_serve_registers_over_mutual_tls() {
    let ca = Authority::new("srehub test ca");
    let dir = tempfile::tempdir().unwrap();
    write_agent_material(dir.path(), &ca);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_config(&ca));

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let tls = acceptor.accept(tcp).await.unwrap();
        let client_certs = tls.get_ref().1.peer_certificates().map(|certs| certs.len());

        let mut ws = tokio_tungstenite::accept_hdr_async(tls, |request: &Request, response: Response| {
            assert_eq!(request.uri().path(), "/agent/stream");
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .unwrap();

        let first = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break serde_json::from_str::<AgentMessage>(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("Expected a text frame, got {:?}", other),
            }
        };
        (client_certs, first, ws)
    });

    let controller = Arc::new(TransportController::new(agent_config(addr, dir.path())));
    let token = CancellationToken::new();
    let agent = tokio::spawn({
        let controller = controller.clone();
        let token = token.clone();
        async move { controller.connect_and_serve(&token).await }
    });

    let (client_certs, first, _ws) = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("handshake timed out")
        .unwrap();

    assert_eq!(client_certs, Some(1));
    assert!(matches!(first, AgentMessage::Register { agent_id, .. } if agent_id == "agent-tls"));

    token.cancel();
    assert!(matches!(agent.await.unwrap(), Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn untrusted_server_is_a_tls_error() {
    let server_ca = Authority::new("srehub server ca");
    let dir = tempfile::tempdir().unwrap();
    write_agent_material(dir.path(), &Authority::new("unrelated ca"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_config(&server_ca));
    tokio::spawn(async move {
        if let Ok((tcp, _)) = listener.accept().await {
            let _ = acceptor.accept(tcp).await;
        }
    });

    let controller = TransportController::new(agent_config(addr, dir.path()));
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        controller.connect_and_serve(&CancellationToken::new()),
    )
    .await
    .expect("handshake timed out");

    match result {
        Err(AgentError::Tls(message)) => assert!(message.contains("TLS handshake failed"), "{}", message),
        other => panic!("Expected TLS error, got {:?}", other),
    }
}
