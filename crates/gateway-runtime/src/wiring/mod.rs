//! # Gateway Wiring
//!
//! Builds every long-running task of the gateway from a [`GatewayConfig`] and
//! ties them to one shutdown signal.
//!
//! ```text
//!  TCP peer ──► TcpWorker ──► MessageDispatcher ──┐
//!                 ▲      (one per connection)     │ submit
//!                 │                               ▼
//!          ConnectionSupervisor            InMemorySignalRouter
//!                                                 │ broadcast
//!                         ┌───────────────────────┴──────────────┐
//!                         ▼                                      ▼
//!                 ConnectionRoutes                          SessionHub
//!            (responses, targeted fan-out)          (subscriptions, acks)
//!                                                                │
//!                                              WebSocket ◄── StreamingSession
//! ```

mod response_routing;

pub use response_routing::ConnectionRoutes;

use crate::config::GatewayConfig;
use crate::transport::worker_for;
use anyhow::{Context, Result};
use shared_bus::{InMemoryEventBus, InMemorySignalRouter};
use shared_types::{DefaultProtocolAdapter, ProtocolAdapter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tc_01_message_mapping::{
    spawn_expiry_task, ChannelPublisher, MessageDispatcher, ProtocolMappingProcessor,
    RoundTripTracer,
};
use tc_02_connection_supervisor::{ConnectionRegistry, ConnectionSupervisor};
use tc_03_streaming_gateway::{serve_on, SessionHub, SessionServices, StreamingState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for tasks to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct GatewayRuntime {
    config: GatewayConfig,
    router: Arc<InMemorySignalRouter>,
    events: Arc<InMemoryEventBus>,
    tracer: Arc<RoundTripTracer>,
    hub: Arc<SessionHub>,
    registry: Arc<ConnectionRegistry>,
    adapter: Arc<dyn ProtocolAdapter>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl GatewayRuntime {
    pub fn new(config: GatewayConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            router: Arc::new(InMemorySignalRouter::new()),
            events: Arc::new(InMemoryEventBus::new()),
            tracer: Arc::new(RoundTripTracer::new()),
            hub: Arc::new(SessionHub::new()),
            registry: ConnectionRegistry::new(),
            adapter: Arc::new(DefaultProtocolAdapter),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
            local_addr: None,
        }
    }

    /// Start every task. Router subscriptions are taken before any
    /// connection runs, so nothing submitted early is missed.
    pub async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Twin-Connect Gateway v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        for connection in &self.config.connections {
            worker_for(&connection.connection_type)
                .with_context(|| format!("connection <{}>", connection.id))?;
        }

        let listener = TcpListener::bind(self.config.streaming.bind_address())
            .await
            .with_context(|| {
                format!(
                    "failed to bind streaming gateway on {}",
                    self.config.streaming.bind_address()
                )
            })?;
        self.local_addr = Some(listener.local_addr().context("streaming listener address")?);

        let hub_signals = self.router.subscribe();
        let connection_signals = self.router.subscribe();

        self.tasks.push(spawn_expiry_task(
            Arc::clone(&self.tracer),
            self.config.dispatch.trace_ttl,
            self.config.dispatch.trace_sweep_interval,
            self.shutdown_rx.clone(),
        ));

        let routes = Arc::new(self.start_connections()?);
        self.tasks.push(tokio::spawn({
            let routes = Arc::clone(&routes);
            let shutdown = self.shutdown_rx.clone();
            async move { routes.run(connection_signals, shutdown).await }
        }));

        self.tasks.push(tokio::spawn({
            let hub = Arc::clone(&self.hub);
            let shutdown = self.shutdown_rx.clone();
            async move { hub.run(hub_signals, shutdown).await }
        }));

        let state = StreamingState {
            services: SessionServices {
                hub: Arc::clone(&self.hub),
                router: self.router.clone(),
                events: self.events.clone(),
                adapter: Arc::clone(&self.adapter),
                config: Arc::new(self.config.streaming.clone()),
            },
            shutdown: self.shutdown_rx.clone(),
        };
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = serve_on(listener, state).await {
                error!(error = %e, "Streaming gateway failed");
            }
        }));

        info!(connections = routes.len(), "Connections started");
        if let Some(addr) = self.local_addr {
            info!("Streaming: ws://{}/ws/{{version}}", addr);
        }
        Ok(())
    }

    /// One dispatcher and one supervisor per open connection.
    fn start_connections(&mut self) -> Result<ConnectionRoutes> {
        let mut routes = ConnectionRoutes::new();
        let processor = Arc::new(ProtocolMappingProcessor::new(Arc::clone(&self.adapter)));

        for connection in self.config.connections.clone() {
            if !connection.is_open() {
                info!(connection_id = %connection.id, "Connection is closed, not starting");
                continue;
            }
            let worker = worker_for(&connection.connection_type)?;

            let (publisher, outbound) =
                ChannelPublisher::new(self.config.dispatch.inbox_capacity);
            let (dispatch, dispatcher_task) = MessageDispatcher::new(
                connection.id.clone(),
                processor.clone(),
                self.router.clone(),
                Arc::new(publisher),
                Arc::clone(&self.tracer),
            )
            .spawn(self.config.dispatch.inbox_capacity, self.shutdown_rx.clone());
            self.tasks.push(dispatcher_task);
            routes.insert(dispatch.clone(), &connection.targets);

            let connection_id = connection.id.clone();
            let supervisor = ConnectionSupervisor::new(
                connection,
                self.config.supervisor.clone(),
                worker,
                Arc::clone(&self.registry),
                self.events.clone(),
                Arc::clone(&self.tracer),
                dispatch,
                outbound,
            )
            .spawn(self.shutdown_rx.clone());

            self.tasks.push(tokio::spawn(async move {
                match supervisor.await {
                    Ok(Ok(state)) => info!(connection_id = %connection_id, state = ?state, "Supervisor finished"),
                    Ok(Err(e)) => error!(connection_id = %connection_id, error = %e, "Connection failed"),
                    Err(e) => error!(connection_id = %connection_id, error = %e, "Supervisor task panicked"),
                }
            }));
        }
        Ok(routes)
    }

    /// Signal shutdown and wait for the tasks, up to a grace period.
    pub async fn shutdown(mut self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No task was listening for shutdown");
        }

        let tasks = std::mem::take(&mut self.tasks);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(grace = ?SHUTDOWN_GRACE, "Tasks still running after shutdown grace period");
        }
        info!("Shutdown complete");
    }

    /// Bound streaming address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn router(&self) -> Arc<InMemorySignalRouter> {
        Arc::clone(&self.router)
    }

    pub fn events(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.events)
    }

    pub fn hub(&self) -> Arc<SessionHub> {
        Arc::clone(&self.hub)
    }

    pub fn tracer(&self) -> Arc<RoundTripTracer> {
        Arc::clone(&self.tracer)
    }
}
