use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;

pub mod rest;

pub use rest::RestQuotaStore;

/// Usage counters tracked per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    AudioMinutes,
    ImageCount,
    PdfPages,
}

impl QuotaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::AudioMinutes => "audio_minutes",
            QuotaType::ImageCount => "image_count",
            QuotaType::PdfPages => "pdf_pages",
        }
    }
}

impl fmt::Display for QuotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining units for one user, as stored remotely
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quota {
    pub audio_minutes: i64,
    pub image_count: i64,
    pub pdf_pages: i64,
}

impl Quota {
    pub fn remaining(&self, quota_type: QuotaType) -> i64 {
        match quota_type {
            QuotaType::AudioMinutes => self.audio_minutes,
            QuotaType::ImageCount => self.image_count,
            QuotaType::PdfPages => self.pdf_pages,
        }
    }
}

/// The signed-in user, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Remote store holding quota counters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Atomically decrement a counter. Returns `false` when the counter was
    /// already at or below zero and nothing was decremented.
    async fn decrement_quota(&self, user_id: &str, quota_type: QuotaType, amount: u32) -> Result<bool>;

    /// Read the current counters for display
    async fn fetch_quota(&self, user_id: &str) -> Result<Quota>;
}

/// Reserves one unit of quota before work is dispatched
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Reserve one unit. Denies on exhaustion and on any store failure.
    pub async fn check_and_reserve(&self, user_id: &str, quota_type: QuotaType) -> bool {
        match self.store.decrement_quota(user_id, quota_type, 1).await {
            Ok(true) => {
                tracing::debug!(user_id, quota = %quota_type, "Quota unit reserved");
                true
            }
            Ok(false) => {
                tracing::info!(user_id, quota = %quota_type, "Quota exhausted");
                false
            }
            Err(e) => {
                tracing::warn!(user_id, quota = %quota_type, "Quota check failed, denying: {}", e);
                false
            }
        }
    }

    /// Current counters for the user
    pub async fn remaining(&self, user_id: &str) -> Result<Quota> {
        self.store.fetch_quota(user_id).await
    }
}
