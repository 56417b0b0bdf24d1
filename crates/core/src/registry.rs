use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Process-wide record of which environments have a deployment in flight.
///
/// Cloning shares the same underlying map. The map is never persisted, so a
/// restart forgets every in-flight flag.
#[derive(Clone, Debug, Default)]
pub struct JobRegistry {
    running: Arc<Mutex<HashMap<String, bool>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, env_name: &str) -> bool {
        self.lock().get(env_name).copied().unwrap_or(false)
    }

    /// Atomically checks the flag and marks it running.
    ///
    /// Returns `None` when a job for `env_name` is already in flight. The returned
    /// guard clears the flag when dropped, including during unwinding.
    pub fn try_claim(&self, env_name: &str) -> Option<JobGuard> {
        let mut map = self.lock();
        let running = map.entry(env_name.to_owned()).or_insert(false);
        if *running {
            return None;
        }
        *running = true;
        drop(map);

        debug!(env_name, "job registry entry claimed");
        Some(JobGuard { registry: self.clone(), env_name: env_name.to_owned() })
    }

    // Only reachable through `JobGuard::drop`, so a flag is cleared by its owner alone.
    fn release(&self, env_name: &str) {
        self.lock().remove(env_name);
    }

    pub fn running_environments(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, running)| **running)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    // A panicking job must not wedge every later dispatch, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of one environment's running flag.
#[derive(Debug)]
pub struct JobGuard {
    registry: JobRegistry,
    env_name: String,
}

impl JobGuard {
    pub fn env_name(&self) -> &str {
        &self.env_name
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.release(&self.env_name);
        debug!(env_name = %self.env_name, "job registry entry released");
    }
}
