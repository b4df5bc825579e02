/// Audit event logging for solver invocations
/// Emits one structured JSON record per security-relevant event through the
/// `log` facade so deployments can route target `platesolve::audit` separately.
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::SystemTime;

/// Log target used for every audit record
pub const AUDIT_TARGET: &str = "platesolve::audit";

/// Audit event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Types of events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    SolveStart,
    SolveEnd,
    BinaryRejected,
    DeadlineKill,
    CleanupSuccess,
    CleanupFailure,
    ArtifactsRetained,
}

impl AuditEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::SolveStart | AuditEventType::SolveEnd => AuditSeverity::Low,
            AuditEventType::CleanupSuccess => AuditSeverity::Low,
            AuditEventType::ArtifactsRetained => AuditSeverity::Medium,
            AuditEventType::DeadlineKill => AuditSeverity::High,
            AuditEventType::BinaryRejected | AuditEventType::CleanupFailure => {
                AuditSeverity::Critical
            }
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: SystemTime,
    pub details: String,
    pub run_id: Option<String>,
    pub binary: Option<String>,
    pub input_sha256: Option<String>,
}

impl AuditEvent {
    /// Create a new event with default severity
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            severity: event_type.default_severity(),
            event_type,
            timestamp: SystemTime::now(),
            details,
            run_id: None,
            binary: None,
            input_sha256: None,
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = Some(binary.to_string());
        self
    }

    pub fn with_input_sha256(mut self, digest: String) -> Self {
        self.input_sha256 = Some(digest);
        self
    }

    /// JSON record written to the log
    pub fn to_record(&self) -> serde_json::Value {
        let mut record = serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "process_id": std::process::id(),
        });

        if let Some(run_id) = &self.run_id {
            record["run_id"] = serde_json::json!(run_id);
        }
        if let Some(binary) = &self.binary {
            record["binary"] = serde_json::json!(binary);
        }
        if let Some(digest) = &self.input_sha256 {
            record["input_sha256"] = serde_json::json!(digest);
        }
        record
    }
}

/// Log an audit event at a level matching its severity
pub fn log_event(event: AuditEvent) {
    let record = event.to_record();
    match event.severity {
        AuditSeverity::Critical | AuditSeverity::High => {
            error!(target: AUDIT_TARGET, "{}", record)
        }
        AuditSeverity::Medium => warn!(target: AUDIT_TARGET, "{}", record),
        AuditSeverity::Low => info!(target: AUDIT_TARGET, "{}", record),
    }
}

/// Hex SHA-256 of an uploaded image
pub fn input_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Convenience functions for common events
pub mod events {
    use super::*;

    pub fn solve_start(run_id: &str, binary: &str, input_sha256: String) {
        log_event(
            AuditEvent::new(AuditEventType::SolveStart, "solve started".to_string())
                .with_run_id(run_id)
                .with_binary(binary)
                .with_input_sha256(input_sha256),
        );
    }

    pub fn solve_end(run_id: &str, solved: bool, solve_time: f64) {
        log_event(
            AuditEvent::new(
                AuditEventType::SolveEnd,
                format!("solved={} solve_time={:.3}s", solved, solve_time),
            )
            .with_run_id(run_id),
        );
    }

    /// Log a rejected executable name
    pub fn binary_rejected(name: &str) {
        log_event(
            AuditEvent::new(
                AuditEventType::BinaryRejected,
                format!("blocked executable name not on allowlist: {:?}", name),
            )
            .with_binary(name),
        );
    }

    pub fn deadline_kill(binary: &str, pid: u32, elapsed_ms: u64) {
        log_event(
            AuditEvent::new(
                AuditEventType::DeadlineKill,
                format!("process group {} killed after {}ms", pid, elapsed_ms),
            )
            .with_binary(binary),
        );
    }

    pub fn cleanup_success(run_id: &str, removed: usize) {
        log_event(
            AuditEvent::new(
                AuditEventType::CleanupSuccess,
                format!("removed {} staged artifact(s)", removed),
            )
            .with_run_id(run_id),
        );
    }

    pub fn cleanup_failure(run_id: &str, failed: Vec<String>) {
        log_event(
            AuditEvent::new(
                AuditEventType::CleanupFailure,
                format!("failed to remove: {}", failed.join(", ")),
            )
            .with_run_id(run_id),
        );
    }

    pub fn artifacts_retained(run_id: &str, input: &str) {
        log_event(
            AuditEvent::new(
                AuditEventType::ArtifactsRetained,
                format!("keep_temp_files set; caller owns artifacts of {}", input),
            )
            .with_run_id(run_id),
        );
    }
}
