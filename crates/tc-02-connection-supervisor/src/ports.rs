//! Worker port: the transport-specific client a supervisor runs.

use crate::domain::connection::Connection;
use crate::error::WorkerError;
use async_trait::async_trait;
use std::sync::Arc;
use tc_01_message_mapping::{DispatchHandle, MappedOutboundSignal};
use tokio::sync::{mpsc, watch, Mutex};

/// What a worker incarnation gets from its supervisor.
///
/// The outbound receiver outlives incarnations: messages published while a
/// worker is backing off wait for the next one.
#[derive(Clone)]
pub struct WorkerContext {
    pub connection: Arc<Connection>,
    pub dispatch: DispatchHandle,
    pub outbound: Arc<Mutex<mpsc::Receiver<MappedOutboundSignal>>>,
    pub shutdown: watch::Receiver<bool>,
}

#[async_trait]
pub trait ConnectionWorker: Send + Sync {
    /// Run until the transport ends. `Ok` only for an orderly stop; any
    /// `Err` is an abnormal termination and triggers a restart.
    async fn run(&self, context: WorkerContext) -> Result<(), WorkerError>;
}
