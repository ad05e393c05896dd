//! Security guard rails around the token core: alert dispatch, audit
//! recording, and failed-attempt tracking. All three are fire-and-forget
//! from the request path; none of them may fail a caller.

pub mod alert;
pub mod audit;
pub mod tracker;

pub use alert::{
    AlertDispatcher, AlertSeverity, LogAlertDispatcher, MemoryAlertDispatcher,
    WebhookAlertDispatcher,
};
pub use audit::{AuditEntry, AuditRecorder, LogAuditRecorder, MemoryAuditRecorder, PgAuditRecorder};
pub use tracker::{AttemptStore, FailedAttemptTracker, MemoryAttemptStore, TrackerConfig};
