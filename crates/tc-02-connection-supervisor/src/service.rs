//! Connection Supervisor - control loop owning one connection's worker.
//!
//! One incarnation of the worker runs at a time. Abnormal termination is
//! followed by a jittered exponential backoff and a fresh incarnation, up to
//! `max_restarts` consecutive failures. Startup claims the connection name
//! with a bounded retry; exhausting it is fatal for the connection.

use crate::domain::config::SupervisorConfig;
use crate::domain::connection::Connection;
use crate::domain::state::{SupervisionEvent, SupervisionState, SupervisionStateMachine};
use crate::error::{SupervisorError, SupervisorResult};
use crate::ports::{ConnectionWorker, WorkerContext};
use crate::registry::ConnectionRegistry;
use gateway_telemetry::metrics::CONNECTION_RESTARTS;
use shared_bus::{EventPublisher, GatewayEvent};
use std::sync::Arc;
use tc_01_message_mapping::{DispatchHandle, MappedOutboundSignal, RoundTripTracer};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub struct ConnectionSupervisor {
    connection: Arc<Connection>,
    config: SupervisorConfig,
    worker: Arc<dyn ConnectionWorker>,
    registry: Arc<ConnectionRegistry>,
    events: Arc<dyn EventPublisher>,
    tracer: Arc<RoundTripTracer>,
    dispatch: DispatchHandle,
    outbound: Arc<Mutex<mpsc::Receiver<MappedOutboundSignal>>>,
    machine: SupervisionStateMachine,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection: Connection,
        config: SupervisorConfig,
        worker: Arc<dyn ConnectionWorker>,
        registry: Arc<ConnectionRegistry>,
        events: Arc<dyn EventPublisher>,
        tracer: Arc<RoundTripTracer>,
        dispatch: DispatchHandle,
        outbound: mpsc::Receiver<MappedOutboundSignal>,
    ) -> Self {
        let machine = SupervisionStateMachine::new(config.max_restarts);
        Self {
            connection: Arc::new(connection),
            config,
            worker,
            registry,
            events,
            tracer,
            dispatch,
            outbound: Arc::new(Mutex::new(outbound)),
            machine,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection.id
    }

    pub fn state(&self) -> SupervisionState {
        self.machine.state()
    }

    async fn apply(&mut self, event: SupervisionEvent) -> SupervisionState {
        let before = self.machine.state();
        let after = self.machine.process_event(event);
        if before != after {
            info!(connection_id = %self.connection.id, from = %before, to = %after, "Supervision state changed");
            self.events
                .publish(GatewayEvent::ConnectionStatusChanged {
                    connection_id: self.connection.id.clone(),
                    state: after.to_string(),
                })
                .await;
        }
        after
    }

    /// Supervise until shutdown or escalation. Returns the terminal state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SupervisorResult<SupervisionState> {
        let result = self.supervise(&mut shutdown).await;
        let dropped = self.tracer.drop_connection(&self.connection.id);
        info!(connection_id = %self.connection.id, dropped_traces = dropped, "Supervisor stopped");
        result
    }

    async fn supervise(&mut self, shutdown: &mut watch::Receiver<bool>) -> SupervisorResult<SupervisionState> {
        if !self.connection.is_open() {
            info!(connection_id = %self.connection.id, "Connection desired closed, not starting");
            return Ok(self.apply(SupervisionEvent::Stop).await);
        }

        let policy = self.config.backoff_policy();
        let reset_after = self.config.reset_after();

        loop {
            let registration = match self
                .registry
                .register_with_retry(
                    &self.connection.id,
                    self.config.registration_max_attempts,
                    self.config.registration_delay,
                )
                .await
            {
                Ok(registration) => registration,
                Err(e) => {
                    error!(connection_id = %self.connection.id, error = %e, "Connection startup failed");
                    self.apply(SupervisionEvent::RegistrationFailed).await;
                    return Err(e);
                }
            };
            self.apply(SupervisionEvent::Registered).await;

            let context = WorkerContext {
                connection: Arc::clone(&self.connection),
                dispatch: self.dispatch.clone(),
                outbound: Arc::clone(&self.outbound),
                shutdown: shutdown.clone(),
            };
            let started = Instant::now();
            let worker = Arc::clone(&self.worker);
            let outcome = tokio::select! {
                result = worker.run(context) => Some(result),
                _ = wait_for_shutdown(shutdown) => None,
            };
            drop(registration);

            let error = match outcome {
                None | Some(Ok(())) => return Ok(self.apply(SupervisionEvent::Stop).await),
                Some(Err(e)) => e,
            };

            if started.elapsed() >= reset_after {
                self.apply(SupervisionEvent::StableRun).await;
            }
            let state = self.apply(SupervisionEvent::WorkerFailed).await;
            let SupervisionState::BackingOff { attempt } = state else {
                let failures = self.machine.consecutive_failures();
                error!(connection_id = %self.connection.id, failures, error = %error, "Restart limit reached");
                return Err(SupervisorError::RestartsExhausted {
                    connection_id: self.connection.id.clone(),
                    failures,
                });
            };

            let delay = policy.delay(attempt.saturating_sub(1));
            warn!(
                connection_id = %self.connection.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Worker terminated abnormally, restarting after backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(shutdown) => {
                    return Ok(self.apply(SupervisionEvent::Stop).await);
                }
            }
            CONNECTION_RESTARTS
                .with_label_values(&[self.connection.id.as_str()])
                .inc();
            self.apply(SupervisionEvent::BackoffElapsed).await;
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<SupervisorResult<SupervisionState>> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
