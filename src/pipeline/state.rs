use serde::{Deserialize, Serialize};
use std::fmt;

use crate::content::ContentKind;
use crate::handles::SessionId;

/// Lifecycle of one processing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Idle,
    Validating,
    CacheHit,
    Dispatching,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingState {
    /// Whether the session has stopped producing updates
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Completed | ProcessingState::Failed | ProcessingState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Idle => "idle",
            ProcessingState::Validating => "validating",
            ProcessingState::CacheHit => "cache_hit",
            ProcessingState::Dispatching => "dispatching",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
            ProcessingState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the presentation layer needs to render the current session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewState {
    /// Session that last wrote this state
    pub session: SessionId,
    pub status: ProcessingState,
    /// 0..=100
    pub progress: u8,
    /// Handle URI of the submitted content
    pub original: Option<String>,
    pub accessible: String,
    pub analysis: String,
    pub content_type: Option<ContentKind>,
    pub mime_type: Option<String>,
    /// Handle URI of narrated audio, when synthesis produced any
    pub audio_url: Option<String>,
    pub error: Option<String>,
}

impl PreviewState {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            status: ProcessingState::Idle,
            progress: 0,
            original: None,
            accessible: String::new(),
            analysis: String::new(),
            content_type: None,
            mime_type: None,
            audio_url: None,
            error: None,
        }
    }
}
