//! # Round-Trip Tracer
//!
//! Process-wide table from correlation id to an open timer. This is the one
//! piece of state shared across dispatchers: a response may complete a trace
//! on any task while new traces are being started on others.
//!
//! Contract:
//! - `start` inserts; at most one open trace per correlation id. Starting
//!   again for the same id replaces the previous entry.
//! - `finish` removes; an entry is removed exactly once. Finishing an id
//!   with no open trace is reported, never a panic.
//! - `drop_connection` and `remove_expired` remove without recording a
//!   duration.

use dashmap::DashMap;
use gateway_telemetry::metrics::ROUND_TRIP_DURATION;
use shared_types::Signal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("No open trace for correlation id <{correlation_id}>")]
    Missing { correlation_id: String },
}

struct OpenTrace {
    connection_id: String,
    signal_type: String,
    started_at: Instant,
}

#[derive(Debug, Default)]
pub struct TraceStats {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub missing: AtomicU64,
    pub replaced: AtomicU64,
    pub expired: AtomicU64,
}

#[derive(Default)]
pub struct RoundTripTracer {
    open: DashMap<String, OpenTrace>,
    stats: TraceStats,
}

impl RoundTripTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a trace for the signal's correlation id. Returns `false` without
    /// doing anything when the signal has none.
    pub fn start(&self, connection_id: &str, signal: &Signal) -> bool {
        let Some(correlation_id) = signal.correlation_id() else {
            return false;
        };
        let trace = OpenTrace {
            connection_id: connection_id.to_string(),
            signal_type: signal.signal_type().to_string(),
            started_at: Instant::now(),
        };
        if self.open.insert(correlation_id.to_string(), trace).is_some() {
            self.stats.replaced.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id,
                connection_id, "Replaced open trace for reused correlation id"
            );
        }
        self.stats.started.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Close the trace for `correlation_id` and record its duration.
    pub fn finish(&self, correlation_id: &str, success: bool) -> Result<Duration, TraceError> {
        let Some((_, trace)) = self.open.remove(correlation_id) else {
            self.stats.missing.fetch_add(1, Ordering::Relaxed);
            return Err(TraceError::Missing {
                correlation_id: correlation_id.to_string(),
            });
        };
        let elapsed = trace.started_at.elapsed();
        ROUND_TRIP_DURATION
            .with_label_values(&[trace.connection_id.as_str(), if success { "true" } else { "false" }])
            .observe(elapsed.as_secs_f64());
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id,
            connection_id = %trace.connection_id,
            signal_type = %trace.signal_type,
            success,
            elapsed_ms = elapsed.as_millis() as u64,
            "Round trip completed"
        );
        Ok(elapsed)
    }

    pub fn is_open(&self, correlation_id: &str) -> bool {
        self.open.contains_key(correlation_id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Drop every open trace started by `connection_id`.
    pub fn drop_connection(&self, connection_id: &str) -> usize {
        let before = self.open.len();
        self.open.retain(|_, trace| trace.connection_id != connection_id);
        let dropped = before.saturating_sub(self.open.len());
        if dropped > 0 {
            debug!(connection_id, dropped, "Dropped open traces of connection");
        }
        dropped
    }

    /// Remove traces open for longer than `ttl`.
    pub fn remove_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.open.retain(|correlation_id, trace| {
            let elapsed = now.duration_since(trace.started_at);
            if elapsed > ttl {
                debug!(
                    correlation_id = %correlation_id,
                    connection_id = %trace.connection_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Removing expired trace"
                );
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }
}

/// Sweep expired traces every `interval` until `shutdown` flips to `true`.
pub fn spawn_expiry_task(
    tracer: Arc<RoundTripTracer>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = tracer.remove_expired(ttl);
                    if removed > 0 {
                        info!(removed, open = tracer.open_count(), "Swept expired traces");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
