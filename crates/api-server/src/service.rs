//! # API Service
//!
//! Installs the two jobs that own the request-serving transport:
//!
//! - `serveapi PROTO://ADDR...` binds every listener, then serves until the
//!   engine shuts down. It resolves only when serving stops or fails.
//! - `acceptconnections` opens the readiness gate. Until then a buffering
//!   listener leaves connections queued in the kernel backlog, and a
//!   non-buffering one answers 503.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use job_engine::{Engine, EngineResult, Handler, Install, Job, Status};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ListenAddr, Proto, ServeApiConfig};
use crate::error::TransportError;
use crate::gate::ReadinessGate;
use crate::notify;
use crate::router::build_router;

/// Blackboard key holding the bound `ip:port` of every active listener.
pub const LISTENERS_KEY: &str = "api.listeners";

/// The remote API feature module.
#[derive(Debug, Clone, Default)]
pub struct ApiService {
    gate: ReadinessGate,
}

impl ApiService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }
}

impl Install for ApiService {
    fn install(&self, engine: &Engine) -> EngineResult<()> {
        engine.register(
            "serveapi",
            ServeApi {
                gate: self.gate.clone(),
            },
        )?;

        let gate = self.gate.clone();
        engine.register_fn("acceptconnections", move |_job| {
            if gate.open() {
                info!("API accepting connections");
                match notify::notify_ready() {
                    Ok(true) => debug!("Service manager notified"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Failed to notify service manager"),
                }
            }
            Status::Ok
        })?;

        info!("[ApiService] Installed serveapi, acceptconnections");
        Ok(())
    }
}

struct ServeApi {
    gate: ReadinessGate,
}

#[async_trait]
impl Handler for ServeApi {
    async fn handle(&self, job: &mut Job) -> Status {
        let config = match ServeApiConfig::from_job(job) {
            Ok(config) => config,
            Err(e) => return job.error(e),
        };
        match serve(job.engine(), &config, &self.gate).await {
            Ok(()) => Status::Ok,
            Err(e) => job.error(e),
        }
    }
}

/// Bind every configured listener and serve until shutdown.
///
/// Fails on the first listener that cannot be bound or that stops with an
/// error; the remaining listeners are dropped with it.
pub async fn serve(
    engine: &Engine,
    config: &ServeApiConfig,
    gate: &ReadinessGate,
) -> Result<(), TransportError> {
    config.tls.validate()?;
    if config.tls.requested() {
        return Err(TransportError::TlsUnsupported);
    }
    if let Some(group) = &config.socket_group {
        debug!(group = %group, "SocketGroup applies to unix sockets only");
    }

    let mut listeners = Vec::with_capacity(config.hosts.len());
    for host in &config.hosts {
        listeners.push(bind(host).await?);
    }

    let bound = listeners
        .iter()
        .map(|l| l.local_addr().map(|a| a.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    if let Err(e) = engine.blackboard().set_as(LISTENERS_KEY, &bound) {
        warn!(error = %e, "Failed to publish listener addresses");
    }

    let router = build_router(engine.clone(), config, gate.clone());
    let mut servers = JoinSet::new();
    for listener in listeners {
        servers.spawn(serve_listener(
            listener,
            router.clone(),
            engine.clone(),
            gate.clone(),
            config.buffer_requests,
        ));
    }

    let result = loop {
        match servers.join_next().await {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => break Err(e),
            Some(Err(e)) => break Err(TransportError::Listener(e)),
            None => break Ok(()),
        }
    };
    engine.blackboard().remove(LISTENERS_KEY);
    result
}

async fn bind(host: &ListenAddr) -> Result<TcpListener, TransportError> {
    match host.proto {
        Proto::Tcp => {
            let listener = TcpListener::bind(host.addr.as_str())
                .await
                .map_err(|source| TransportError::Bind {
                    addr: host.to_string(),
                    source,
                })?;
            let local = listener.local_addr()?;
            if !local.ip().is_loopback() {
                warn!(addr = %local, "API bound to a non-loopback address without TLS");
            }
            info!(addr = %host, local = %local, "Listening for HTTP");
            Ok(listener)
        }
        Proto::Unix | Proto::Fd => Err(TransportError::UnsupportedProtocol(host.proto.to_string())),
    }
}

async fn serve_listener(
    listener: TcpListener,
    router: Router,
    engine: Engine,
    gate: ReadinessGate,
    buffer_requests: bool,
) -> Result<(), TransportError> {
    let addr: SocketAddr = listener.local_addr()?;

    if buffer_requests && !gate.is_open() {
        debug!(addr = %addr, "Holding connections until the daemon is ready");
        tokio::select! {
            () = gate.wait_open() => {}
            () = engine.shutdown_requested() => {
                debug!(addr = %addr, "Shutdown before readiness");
                return Ok(());
            }
        }
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(engine.shutdown_requested())
        .await?;

    info!(addr = %addr, "API listener stopped");
    Ok(())
}
