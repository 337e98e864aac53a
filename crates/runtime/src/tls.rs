//! Self-signed certificate material and the HTTPS accept loop.
//!
//! Material is generated once for `tls.hostname` and cached on disk; later
//! starts reuse whatever is found at the configured paths.

use std::fs;
use std::future::Future;
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::{body::Body, extract::ConnectInfo, Router};
use huddle_config::TlsConfig;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls_pemfile::{certs, private_key};
use tokio::net::TcpListener;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Certificate and key locations, and whether this call created them.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub generated: bool,
}

/// Make sure a certificate/key pair exists at the configured paths.
///
/// Nothing is written when both files are already present.
pub fn ensure_material(config: &TlsConfig) -> Result<TlsMaterial> {
    let cert_path = PathBuf::from(&config.cert_path);
    let key_path = PathBuf::from(&config.key_path);

    if cert_path.exists() && key_path.exists() {
        debug!(cert = %cert_path.display(), "reusing existing TLS material");
        return Ok(TlsMaterial {
            cert_path,
            key_path,
            generated: false,
        });
    }

    let mut names = vec![config.hostname.clone()];
    if config.hostname != "localhost" {
        names.push("localhost".to_string());
    }

    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(names)
        .with_context(|| format!("failed to generate certificate for {}", config.hostname))?;

    write_pem(&cert_path, &cert.pem())?;
    write_pem(&key_path, &key_pair.serialize_pem())?;
    restrict_permissions(&key_path)?;

    info!(
        hostname = %config.hostname,
        cert = %cert_path.display(),
        key = %key_path.display(),
        "generated self-signed TLS material"
    );

    Ok(TlsMaterial {
        cert_path,
        key_path,
        generated: true,
    })
}

fn write_pem(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Build a TLS acceptor from PEM files.
pub fn load_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor> {
    let cert_file = fs::read(&material.cert_path)
        .with_context(|| format!("failed to read {}", material.cert_path.display()))?;
    let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
    let certs: Vec<CertificateDer<'static>> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        bail!("No certificates found in {}", material.cert_path.display());
    }

    let key_file = fs::read(&material.key_path)
        .with_context(|| format!("failed to read {}", material.key_path.display()))?;
    let key_reader = &mut BufReader::new(Cursor::new(key_file));
    let Some(key) = private_key(key_reader)? else {
        bail!("No private keys found in {}", material.key_path.display());
    };

    let mut tls_config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    // WebSocket upgrades need HTTP/1.1
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Serve `app` over TLS until `shutdown` resolves.
///
/// Each accepted connection is handshaken on its own task and handed to
/// hyper with upgrades enabled, so `/ws` works the same as over plain HTTP.
/// The peer address is exposed to handlers as `ConnectInfo<SocketAddr>`.
pub async fn serve_tls<F>(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(error) => {
                    warn!(%error, "failed to accept connection");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(error) => {
                    debug!(%remote, %error, "TLS handshake failed");
                    return;
                }
            };

            let service = hyper::service::service_fn(move |request: hyper::Request<hyper::body::Incoming>| {
                let mut request = request.map(Body::new);
                request.extensions_mut().insert(ConnectInfo::<SocketAddr>(remote));
                app.clone().oneshot(request)
            });

            if let Err(error) = Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
            {
                debug!(%remote, %error, "connection closed with error");
            }
        });
    }

    info!("TLS listener stopped");
    Ok(())
}
