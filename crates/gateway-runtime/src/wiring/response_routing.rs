//! Router to connection routing.
//!
//! The counterpart of the session hub for external connections:
//!
//! - a response whose `origin` names a connection goes back to that
//!   connection's dispatcher, where it completes the round trip;
//! - every other signal is published on each connection that declares
//!   targets, except the connection it came from.

use shared_bus::SignalSubscription;
use shared_types::Signal;
use std::collections::HashMap;
use tc_01_message_mapping::{DispatchHandle, DispatchMessage, OutboundSignal, Target};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

struct ConnectionRoute {
    dispatch: DispatchHandle,
    targets: Vec<Target>,
}

#[derive(Default)]
pub struct ConnectionRoutes {
    routes: HashMap<String, ConnectionRoute>,
}

impl ConnectionRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dispatch: DispatchHandle, targets: &[String]) {
        let route = ConnectionRoute {
            targets: targets.iter().map(Target::new).collect(),
            dispatch,
        };
        self.routes
            .insert(route.dispatch.connection_id().to_string(), route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Hand one routed signal to the connections it concerns. Returns the
    /// number of dispatchers that accepted it.
    pub async fn route(&self, signal: Signal) -> usize {
        let origin = signal.headers().origin().map(str::to_string);

        if signal.is_response() {
            let Some(route) = origin.as_deref().and_then(|o| self.routes.get(o)) else {
                trace!(signal_type = %signal.signal_type(), "Response is not addressed to a connection");
                return 0;
            };
            return match route.dispatch.send(DispatchMessage::CommandResponse(signal)).await {
                Ok(()) => 1,
                Err(e) => {
                    warn!(error = %e, "Dropping response for stopped dispatcher");
                    0
                }
            };
        }

        let mut accepted = 0;
        for (connection_id, route) in &self.routes {
            if route.targets.is_empty() || origin.as_deref() == Some(connection_id.as_str()) {
                continue;
            }
            let outbound = OutboundSignal::new(signal.clone(), route.targets.clone());
            match route.dispatch.send(DispatchMessage::Outbound(outbound)).await {
                Ok(()) => accepted += 1,
                Err(e) => debug!(connection_id = %connection_id, error = %e, "Dispatcher closed during fan-out"),
            }
        }
        accepted
    }

    pub async fn run(&self, mut signals: SignalSubscription, mut shutdown: watch::Receiver<bool>) {
        info!(connections = self.routes.len(), "Connection routing started");
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        self.route(signal).await;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Connection routing stopped");
    }
}
