//! Deployment lock records.
//!
//! The lock is a JSON document under the bundle's remote state directory.
//! It protects a target against concurrent deploys from different machines;
//! a stale lock past its expiry is treated as released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300; // 5 minutes

/// File name of the lock document under the state directory.
pub const LOCK_FILE_NAME: &str = "deploy.lock";

/// A deployment lock record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a fresh lock record for `holder`.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Whether the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Remote path of the lock document under `state_path`.
    #[must_use]
    pub fn remote_path(state_path: &str) -> String {
        format!("{}/{LOCK_FILE_NAME}", state_path.trim_end_matches('/'))
    }
}

/// Generates a holder identifier for the current process.
#[must_use]
pub fn holder_id() -> String {
    let host = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());
    let pid = std::process::id();
    format!("{host}-{pid}")
}
