use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use waypoint::cache::Cache;
use waypoint::config::AppConfig;
use waypoint::graceful_shutdown::GracefulShutdown;
use waypoint::pipeline::{Action, ChainNode};
use waypoint::server::ServerContext;
use waypoint::upstream::UpstreamExecutable;

/// Programmable DNS forwarder core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Overrides the `[logging].level` configured in the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(config).await {
        tracing::error!(%err, "fatal error, exiting");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> waypoint::Result<()> {
    let shutdown = Arc::new(GracefulShutdown::new());

    let mut chain_nodes = Vec::new();
    for upstream_cfg in &config.upstreams {
        let parsed = waypoint::upstream::url::parse(&upstream_cfg.url)?;
        let tls_ca_pem = match &upstream_cfg.tls_ca_path {
            Some(path) => Some(std::fs::read(path)?),
            None => None,
        };
        let upstream = waypoint::upstream::build(
            &parsed,
            tls_ca_pem,
            upstream_cfg.tls_insecure_skip_verify,
        )
        .await?;
        chain_nodes.push(ChainNode::unconditional(Action::Executable(Arc::new(
            UpstreamExecutable::new(upstream),
        ))));
    }
    let chain: Arc<Vec<ChainNode>> = Arc::new(chain_nodes);

    let cache = if config.cache.capacity > 0 {
        let redis = match &config.cache.redis_url {
            Some(url) => Some(
                waypoint::cache::RedisBackend::connect(url, "waypoint")
                    .await?,
            ),
            None => None,
        };
        let cache = Arc::new(
            Cache::new(config.cache.capacity, config.cache.shard_count, redis)
                .with_compression(config.cache.compress)
                .with_lazy_refresh(config.cache.lazy_refresh),
        );
        cache.spawn_cleaner(std::time::Duration::from_secs(config.cache.cleaner_interval_secs));
        Some(cache)
    } else {
        None
    };

    let mut ctx = ServerContext::new(chain, shutdown.clone());
    ctx.cache_everything = config.cache.cache_everything;
    ctx.lazy_cache_ttl = config.cache.lazy_cache_ttl;
    if let Some(cache) = cache {
        ctx = ctx.with_cache(cache);
    }
    let ctx = Arc::new(ctx);

    let mut handles = Vec::new();

    if let Some(addr) = config.server.udp_bind {
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        tracing::info!(%addr, "udp listener bound");
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            waypoint::server::udp::run(socket, ctx).await;
        }));
    }

    if let Some(addr) = config.server.tcp_bind {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "tcp listener bound");
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            waypoint::server::tcp::run(listener, ctx).await;
        }));
    }

    if config.server.dot_bind.is_some() || config.server.doq_bind.is_some() {
        let (cert_pem, key_pem) = waypoint::upstream::cert_gen::load_or_generate_cert(
            config.server.tls_cert_path.as_ref().map(PathBuf::from).as_deref(),
            config.server.tls_key_path.as_ref().map(PathBuf::from).as_deref(),
            "waypoint-forwarder",
            vec![],
        )
        .await?;

        if let Some(addr) = config.server.dot_bind {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            let acceptor = build_tls_acceptor(&cert_pem, &key_pem)?;
            tracing::info!(%addr, "dot listener bound");
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                waypoint::server::dot::run(listener, acceptor, ctx).await;
            }));
        }

        if let Some(addr) = config.server.doq_bind {
            let endpoint = build_quic_endpoint(addr, &cert_pem, &key_pem)?;
            tracing::info!(%addr, "doq listener bound");
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                waypoint::server::doq::run(endpoint, ctx).await;
            }));
        }
    }

    if let Some(addr) = config.server.doh_bind {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "doh listener bound");
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            waypoint::server::doh::run(listener, ctx).await;
        }));
    }

    if let Some(addr) = config.server.metrics_bind {
        let metrics = Arc::new(waypoint::metrics::Metrics::new().map_err(|e| {
            waypoint::ForwarderError::ConfigInvalid(format!("failed to build metrics registry: {e}"))
        })?);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "metrics listener bound");
        handles.push(tokio::spawn(async move {
            let app = waypoint::metrics::router(metrics);
            let _ = axum::serve(listener, app).await;
        }));
    }

    wait_for_shutdown_signal().await;
    shutdown.shutdown().await;

    Ok(())
}

fn build_tls_acceptor(cert_pem: &[u8], key_pem: &[u8]) -> waypoint::Result<tokio_rustls::TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut std::io::Cursor::new(key_pem))
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?
        .ok_or_else(|| waypoint::ForwarderError::ConfigInvalid("no private key found".to_string()))?;

    let mut server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?;
    server_config.alpn_protocols = vec![b"dot".to_vec()];

    Ok(tokio_rustls::TlsAcceptor::from(Arc::new(server_config)))
}

fn build_quic_endpoint(
    addr: std::net::SocketAddr,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> waypoint::Result<quinn::Endpoint> {
    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut std::io::Cursor::new(key_pem))
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?
        .ok_or_else(|| waypoint::ForwarderError::ConfigInvalid("no private key found".to_string()))?;

    let mut server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?;
    server_config.alpn_protocols = vec![b"doq".to_vec()];

    let quic_server_config = quinn::ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(server_config)
            .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))?,
    ));

    quinn::Endpoint::server(quic_server_config, addr)
        .map_err(|e| waypoint::ForwarderError::ConfigInvalid(e.to_string()))
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    tracing::info!("shutdown signal received");
}
