//! Prefixed logging context.
//!
//! A `Logger` is passed down explicitly: listener -> client -> relay
//! direction, each level appending its own label to the prefix.

use std::fmt::Display;

#[derive(Debug, Clone)]
pub struct Logger {
    prefix: String,
}

impl Logger {
    pub fn new(prefix: impl Display) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn extend(&self, label: impl Display) -> Self {
        Self {
            prefix: format!("{} {}", self.prefix, label),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn debug(&self, msg: impl Display) {
        tracing::debug!("{} {}", self.prefix, msg);
    }

    pub fn info(&self, msg: impl Display) {
        tracing::info!("{} {}", self.prefix, msg);
    }

    pub fn warn(&self, msg: impl Display) {
        tracing::warn!("{} {}", self.prefix, msg);
    }
}
