//! Name registry for connection workers.
//!
//! A name is held by a [`Registration`] guard and released when the guard
//! is dropped. A restarted worker may find its name still held by the
//! previous incarnation for a short moment, which is why claiming retries.

use crate::error::SupervisorError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
pub struct ConnectionRegistry {
    names: DashMap<String, u64>,
    generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_register(self: &Arc<Self>, name: &str) -> Result<Registration, SupervisorError> {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SupervisorError::NameTaken {
                name: name.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                vacant.insert(generation);
                Ok(Registration {
                    registry: Arc::clone(self),
                    name: name.to_string(),
                    generation,
                })
            }
        }
    }

    /// Claim `name`, retrying a collision up to `max_attempts` times with
    /// `delay` in between.
    pub async fn register_with_retry(
        self: &Arc<Self>,
        name: &str,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<Registration, SupervisorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_register(name) {
                Ok(registration) => return Ok(registration),
                Err(e) if attempt < max_attempts => {
                    debug!(name, attempt, error = %e, "Name collision, retrying registration");
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {
                    warn!(name, attempts = attempt, "Giving up on registration");
                    return Err(SupervisorError::RegistrationFailed {
                        connection_id: name.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Holds a name until dropped.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    name: String,
    generation: u64,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // Only release our own claim, never a later one.
        self.registry
            .names
            .remove_if(&self.name, |_, generation| *generation == self.generation);
    }
}
