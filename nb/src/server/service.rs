//! BridgeService - wires the correlation engine to an axum listener

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::routes::{AppState, router};
use crate::bridge::Bridge;
use crate::config::{Config, WEBHOOK_PATH};
use crate::correlator::{Correlator, CorrelatorHandle};
use crate::dispatch::{BackendTarget, Dispatcher, HttpTransport, Transport};
use crate::inbound::InboundReceiver;

/// A bound HTTP server plus the running Correlator behind it
pub struct BridgeService {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: AppState,
    correlator_task: JoinHandle<()>,
}

impl BridgeService {
    /// Bind the configured address with the HTTP transport
    pub async fn bind(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config.backend.ack_timeout(), config.backend.connect_timeout())
            .context("Failed to build HTTP client")?;
        Self::bind_with_transport(config, Arc::new(transport)).await
    }

    /// Bind the configured address with a caller-supplied transport
    pub async fn bind_with_transport(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        debug!("BridgeService::bind_with_transport: called");
        config.validate()?;

        let addr = config.server.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind {}", addr))?;
        let local_addr = listener.local_addr()?;

        let (correlator, correlator_task) = Correlator::spawn(config.correlator.clone());
        let target = Arc::new(BackendTarget::new(config.backend.url.clone()));
        let reply_to = config
            .reply_to()
            .or_else(|| local_reply_to(local_addr, &config.server.webhook_id));
        if reply_to.is_none() {
            warn!("No server.public-url configured; backend must know the webhook address");
        }

        let dispatcher = Dispatcher::new(
            correlator.clone(),
            transport,
            target,
            config.backend.agent_id(),
            reply_to,
        );
        let bridge = Bridge::new(dispatcher, &config.backend.agent_name, config.backend.request_timeout());

        let state = AppState {
            bridge,
            receiver: InboundReceiver::new(correlator.clone()),
            correlator,
            webhook_id: Arc::from(config.server.webhook_id.as_str()),
        };

        info!(%local_addr, "Bridge service bound");
        Ok(Self {
            listener,
            local_addr,
            state,
            correlator_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full callback URL on the bound address
    pub fn webhook_url(&self) -> String {
        format!("http://{}{}/{}", self.local_addr, WEBHOOK_PATH, self.state.webhook_id)
    }

    pub fn bridge(&self) -> Bridge {
        self.state.bridge.clone()
    }

    pub fn correlator(&self) -> CorrelatorHandle {
        self.state.correlator.clone()
    }

    /// Serve until `shutdown` completes
    ///
    /// On shutdown the Correlator is stopped first, so callers still waiting
    /// get `Cancelled` and their requests finish while the server drains.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let correlator = self.state.correlator.clone();
        let app = router(self.state);

        info!(addr = %self.local_addr, "Serving");
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown requested");
                if let Err(e) = correlator.shutdown().await {
                    debug!(error = %e, "BridgeService::run: correlator already stopped");
                }
            })
            .await
            .context("HTTP server error")?;

        if let Err(e) = self.correlator_task.await {
            warn!(error = %e, "Correlator task ended abnormally");
        }
        info!("Bridge service stopped");
        Ok(())
    }
}

/// Reply-to on the bound address, when that address is routable
fn local_reply_to(local_addr: SocketAddr, webhook_id: &str) -> Option<String> {
    if local_addr.ip().is_unspecified() {
        return None;
    }
    Some(format!("http://{}{}/{}", local_addr, WEBHOOK_PATH, webhook_id))
}
