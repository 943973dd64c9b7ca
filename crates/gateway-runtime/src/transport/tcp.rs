//! Line-oriented TCP client transport.
//!
//! Every newline-terminated line read from the peer becomes one external
//! text message; every published outbound message is written back as one
//! line. Losing the socket is an abnormal termination.

use async_trait::async_trait;
use tc_01_message_mapping::{DispatchMessage, ExternalMessage, MappedOutboundSignal, Payload};
use tc_02_connection_supervisor::{Connection, ConnectionWorker, WorkerContext, WorkerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpWorker;

#[async_trait]
impl ConnectionWorker for TcpWorker {
    async fn run(&self, context: WorkerContext) -> Result<(), WorkerError> {
        let connection = context.connection.as_ref();
        let stream = TcpStream::connect(&connection.uri)
            .await
            .map_err(|e| WorkerError::Connect {
                uri: connection.uri.clone(),
                reason: e.to_string(),
            })?;
        let source_address = source_address(connection);
        info!(connection_id = %connection.id, uri = %connection.uri, "TCP transport connected");

        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut outbound = context.outbound.lock().await;
        let mut shutdown = context.shutdown.clone();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let message = external_message(connection, &source_address, line);
                        context
                            .dispatch
                            .send(DispatchMessage::External(message))
                            .await
                            .map_err(|_| WorkerError::DispatcherClosed)?;
                    }
                    Ok(None) => {
                        return Err(WorkerError::Disconnected("peer closed the connection".into()))
                    }
                    Err(e) => return Err(WorkerError::Disconnected(e.to_string())),
                },
                mapped = outbound.recv() => match mapped {
                    Some(mapped) => {
                        let Some(line) = outbound_line(&mapped) else {
                            debug!(connection_id = %connection.id, "Skipping empty outbound message");
                            continue;
                        };
                        writer
                            .write_all(line.as_bytes())
                            .await
                            .map_err(|e| WorkerError::Disconnected(e.to_string()))?;
                    }
                    None => return Err(WorkerError::DispatcherClosed),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(connection_id = %connection.id, "TCP transport stopping");
                        let _ = writer.shutdown().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// The first configured source, else the connection uri.
fn source_address(connection: &Connection) -> String {
    connection
        .sources
        .first()
        .cloned()
        .unwrap_or_else(|| connection.uri.clone())
}

fn external_message(connection: &Connection, source_address: &str, line: String) -> ExternalMessage {
    let mut builder = ExternalMessage::builder()
        .authorization_context(connection.authorization_context())
        .source_address(source_address)
        .text(line);
    if let Some(filter) = connection.enforcement_filter(source_address) {
        builder = builder.enforcement_filter(filter);
    }
    if let Some(mapping) = connection.header_mapping.clone() {
        builder = builder.header_mapping(mapping);
    }
    builder.build()
}

fn outbound_line(mapped: &MappedOutboundSignal) -> Option<String> {
    let text = match mapped.message.payload() {
        Payload::Text(text) => text.clone(),
        Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Payload::Empty => return None,
    };
    Some(format!("{}\n", text.trim_end_matches('\n')))
}
