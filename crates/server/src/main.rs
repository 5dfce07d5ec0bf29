//! spellcache proxy entry point.
//!
//! Loads configuration, installs and activates the current cache generation,
//! then serves HTTP/1 on `listen_addr`. Logs go to stderr as JSON.

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use spellcache_client::{CacheService, FetchConfig, HttpUpstream};
use spellcache_core::{AppConfig, CacheDb};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

use handler::{ProxyHandler, TargetResolver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.version, db = %config.db_path.display(), "starting spellcache proxy");

    let db = CacheDb::open(&config.db_path).await?;
    let upstream = HttpUpstream::new(FetchConfig::from(&config))?;
    let service = Arc::new(CacheService::new(&config, Arc::new(db), Arc::new(upstream))?);

    let install = service.on_install().await?;
    if !install.failed.is_empty() {
        tracing::warn!(failed = ?install.failed, "some static assets were not pre-cached");
    }
    service.on_activate().await?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, namespace = %service.namespaces().api.name, "listening");

    let handler = ProxyHandler::new(service.clone(), TargetResolver::new(&config), config.max_bytes);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let handler = handler.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let handler = handler.clone();
                        async move { handler.handle(req).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        tracing::debug!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(in_flight = service.revalidator().in_flight(), "shutting down");
                break;
            }
        }
    }

    service.revalidator().wait_idle().await;
    tracing::info!("revalidations drained");
    Ok(())
}
