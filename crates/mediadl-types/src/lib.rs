//! Shared types for MediaDL
//!
//! This crate contains the data structures shared between the
//! download engine and the CLI.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Task Types
// ============================================================================

/// A single queued, active or finished download job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub thumbnail: String,
    /// Label of the chosen variant, e.g. "720p"
    pub variant: String,
    /// Human-readable total size, e.g. "65 MB"
    pub total_size: String,
    /// Percentage in [0, 100]
    pub progress: f64,
    /// Current transfer rate; empty unless downloading
    pub speed: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: String, thumbnail: String, variant: String, total_size: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            thumbnail,
            variant,
            total_size,
            progress: 0.0,
            speed: String::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the chosen variant is an audio-only rendition
    pub fn is_audio(&self) -> bool {
        let label = self.variant.to_lowercase();
        label.contains("mp3") || label.contains("audio")
    }

    /// Local calendar date the job was queued on
    pub fn date_label(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// Status of a download job
///
/// ```text
/// Pending -> Connecting -> Downloading -> Completed | Failed
///    \___________\______________\______-> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Connecting,
    Downloading,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Connecting)
                | (Connecting, Downloading)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Pending | Connecting | Downloading, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Connecting => "CONNECTING",
            TaskStatus::Downloading => "DOWNLOADING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Resolver Types
// ============================================================================

/// One downloadable rendition of a media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaVariant {
    /// e.g. "1080p", "720p", "Audio"
    pub label: String,
    /// e.g. "45.2 MB"
    pub size: String,
    /// Container extension, e.g. "mp4", "mp3"
    pub ext: String,
}

impl MediaVariant {
    pub fn new(label: impl Into<String>, size: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            size: size.into(),
            ext: ext.into(),
        }
    }
}

/// Metadata produced by a resolver for a source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub title: String,
    pub thumbnail: String,
    /// Host the media was found on
    pub source: String,
    pub variants: Vec<MediaVariant>,
}

impl ResolvedMedia {
    /// Find a variant by label, ignoring case
    pub fn variant(&self, label: &str) -> Option<&MediaVariant> {
        self.variants
            .iter()
            .find(|v| v.label.eq_ignore_ascii_case(label))
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Tunables for the simulated transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between enqueue and the start of the transfer
    pub connect_delay_ms: u64,
    /// Period of the progress driver
    pub tick_interval_ms: u64,
    /// Lower bound of the simulated speed
    pub min_speed: f64,
    /// Upper bound of the simulated speed
    pub max_speed: f64,
    /// Largest progress increment per tick, in percentage points
    pub max_step: f64,
    /// Unit appended to the speed label
    pub speed_unit: String,
    /// Probability that a tick fails the transfer
    pub failure_rate: f64,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl EngineConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check the config for values the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_delay_ms == 0 {
            return Err("connect_delay_ms must be greater than zero".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than zero".to_string());
        }
        if !self.min_speed.is_finite() || !self.max_speed.is_finite() {
            return Err("speed bounds must be finite".to_string());
        }
        if !(self.min_speed >= 0.0) || !(self.max_speed >= self.min_speed) {
            return Err(format!(
                "speed range {}..={} is invalid",
                self.min_speed, self.max_speed
            ));
        }
        if !self.max_step.is_finite() || !(self.max_step >= 0.0) {
            return Err("max_step must be finite and not negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err("failure_rate must be within 0..=1".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: 1000,
            tick_interval_ms: 500,
            min_speed: 1.0,
            max_speed: 5.0,
            max_step: 5.0,
            speed_unit: "MB/s".to_string(),
            failure_rate: 0.0,
            event_capacity: 1024,
        }
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted by the engine to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    TaskAdded {
        task: Task,
    },
    TaskStatusChanged {
        id: Uuid,
        status: TaskStatus,
    },
    TaskProgress {
        id: Uuid,
        progress: f64,
        speed: String,
    },
    TaskRemoved {
        id: Uuid,
    },
}
