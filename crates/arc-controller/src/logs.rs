//! Access to step logs for failure diagnostics.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use arc_core::ObjectKey;

use crate::error::{Error, Result};

/// Container whose logs are read for a failed step.
pub const MAIN_CONTAINER: &str = "main";

/// Source of pod logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Returns the last `lines` lines logged by `container` of `pod`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no logs exist for the pod.
    async fn tail(&self, namespace: &str, pod: &str, container: &str, lines: usize)
    -> Result<String>;
}

/// Log source backed by a map, filled by tests or by a sidecar.
#[derive(Debug, Default)]
pub struct InMemoryLogSource {
    logs: RwLock<HashMap<(ObjectKey, String), String>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    arc_core::Error::storage("lock poisoned").into()
}

impl InMemoryLogSource {
    /// Creates an empty log source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text to a container's log.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn append(&self, namespace: &str, pod: &str, container: &str, text: &str) -> Result<()> {
        let mut logs = self.logs.write().map_err(poison_err)?;
        logs.entry((ObjectKey::new(namespace, pod), container.to_string()))
            .or_default()
            .push_str(text);
        Ok(())
    }
}

#[async_trait]
impl LogSource for InMemoryLogSource {
    async fn tail(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: usize,
    ) -> Result<String> {
        let key = ObjectKey::new(namespace, pod);
        let logs = self.logs.read().map_err(poison_err)?;
        let Some(text) = logs.get(&(key.clone(), container.to_string())) else {
            return Err(arc_core::Error::not_found("Pod", &key).into());
        };
        Ok(tail_lines(text, lines))
    }
}

/// Keeps the last `n` lines of `text`, each terminated by a newline.
#[must_use]
pub fn tail_lines(text: &str, n: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(n);
    all[start..].iter().fold(String::new(), |mut out, line| {
        out.push_str(line);
        out.push('\n');
        out
    })
}
