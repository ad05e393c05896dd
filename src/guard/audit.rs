//! Append-only audit trail of authentication-relevant requests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use tracing::{Instrument, error, info, info_span};

/// Outcome of one completed request against an authentication endpoint.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub identity: Option<String>,
    pub source_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Recorders take ownership of the entry and must return immediately; any
/// backing I/O happens off the request path and its failure is only logged.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Default recorder: the audit trail goes to the service log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAuditRecorder;

impl AuditRecorder for LogAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        info!(
            method = %entry.method,
            path = %entry.path,
            status = entry.status,
            identity = entry.identity.as_deref().unwrap_or("-"),
            source = entry.source_address.map(|ip| ip.to_string()).as_deref().unwrap_or("-"),
            error = entry.error.as_deref().unwrap_or("-"),
            "auth activity"
        );
    }
}

/// Appends entries to `auth_activity_log`. The insert runs on a spawned
/// task so a slow or down database never delays the response.
#[derive(Clone, Debug)]
pub struct PgAuditRecorder {
    pool: PgPool,
}

impl PgAuditRecorder {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditRecorder for PgAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = insert_activity(&pool, &entry).await {
                error!("failed to record auth activity: {err}");
            }
        });
    }
}

async fn insert_activity(pool: &PgPool, entry: &AuditEntry) -> Result<()> {
    let query = r"
        INSERT INTO auth_activity_log
            (method, path, status, identity, source_address, user_agent, error, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(i16::try_from(entry.status).unwrap_or(i16::MAX))
        .bind(entry.identity.as_deref())
        .bind(entry.source_address)
        .bind(entry.user_agent.as_deref())
        .bind(entry.error.as_deref())
        .bind(entry.recorded_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert auth activity entry")?;
    Ok(())
}

/// Collects entries in memory for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditRecorder for MemoryAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
