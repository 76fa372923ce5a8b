//! Time bounds for every call that may block on I/O.
//!
//! One slow store query, image download or outbound send must never stall a
//! loop indefinitely, so each of them runs under one of these limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-call timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Store query timeout in seconds (default: 10)
    #[serde(default = "default_store_timeout")]
    pub store_timeout_seconds: u64,

    /// Image download timeout in seconds (default: 15)
    #[serde(default = "default_image_timeout")]
    pub image_timeout_seconds: u64,

    /// Outbound message timeout in seconds (default: 30)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,

    /// Content source timeout in seconds (default: 60)
    #[serde(default = "default_source_timeout")]
    pub source_timeout_seconds: u64,
}

fn default_store_timeout() -> u64 {
    10
}
fn default_image_timeout() -> u64 {
    15
}
fn default_send_timeout() -> u64 {
    30
}
fn default_source_timeout() -> u64 {
    60
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            store_timeout_seconds: default_store_timeout(),
            image_timeout_seconds: default_image_timeout(),
            send_timeout_seconds: default_send_timeout(),
            source_timeout_seconds: default_source_timeout(),
        }
    }
}

impl Limits {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds.max(1))
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_seconds.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds.max(1))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds.max(1))
    }
}
