//! Storage boundary for usage records.
//!
//! Handlers and the importer receive an explicitly constructed
//! `Arc<dyn UsageStore>`; nothing reaches for a process-wide client.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use starlink_client::{
    db::{self, StoreError},
    domain::{RawUsageRow, UsageDraft, UsageFilter, UsageRecord},
};

use crate::config::{AppConfig, StoreKind};

pub mod memory;

pub use memory::MemoryUsageStore;

#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    /// Rows matching `filter`, ordered by date then unit.
    async fn list(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, StoreError>;

    async fn get(&self, id: i32) -> Result<UsageRecord, StoreError>;

    async fn create(&self, draft: UsageDraft) -> Result<UsageRecord, StoreError>;

    async fn update(&self, id: i32, draft: UsageDraft) -> Result<UsageRecord, StoreError>;

    async fn delete(&self, id: i32) -> Result<(), StoreError>;

    /// Insert or replace rows keyed on `(date, unit)`. Drafts must not repeat
    /// a `(date, unit)` pair. Returns the number of rows written.
    async fn upsert_batch(&self, drafts: &[UsageDraft]) -> Result<u64, StoreError>;
}

pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UsageStore for PgUsageStore {
    async fn list(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, StoreError> {
        db::list_usage(&self.pool, filter).await
    }

    async fn get(&self, id: i32) -> Result<UsageRecord, StoreError> {
        db::fetch_usage(&self.pool, id).await
    }

    async fn create(&self, draft: UsageDraft) -> Result<UsageRecord, StoreError> {
        db::insert_usage(&self.pool, &draft).await
    }

    async fn update(&self, id: i32, draft: UsageDraft) -> Result<UsageRecord, StoreError> {
        db::update_usage(&self.pool, id, &draft).await
    }

    async fn delete(&self, id: i32) -> Result<(), StoreError> {
        db::delete_usage(&self.pool, id).await
    }

    async fn upsert_batch(&self, drafts: &[UsageDraft]) -> Result<u64, StoreError> {
        db::upsert_usage_batch(&self.pool, drafts).await
    }
}

/// Build the store selected by `storage.kind`.
pub async fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn UsageStore>> {
    match cfg.storage.kind {
        StoreKind::Postgres => {
            let db_cfg = cfg
                .database
                .as_ref()
                .context("storage.kind = \"postgres\" requires a [database] section")?;
            let pool = PgPoolOptions::new()
                .max_connections(db_cfg.max_connections)
                .connect(&db_cfg.uri)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!(max_connections = db_cfg.max_connections, "connected to postgres");
            Ok(Arc::new(PgUsageStore::new(pool)))
        }
        StoreKind::Memory => {
            let store = match &cfg.storage.fixture_path {
                Some(path) => MemoryUsageStore::from_json_file(path)?,
                None => MemoryUsageStore::default(),
            };
            tracing::info!("using in-memory usage store");
            Ok(Arc::new(store))
        }
    }
}

/// Decode rows from an external backend, skipping any row that cannot be
/// decoded. A bad row is logged and counted; it never fails the batch.
pub fn decode_rows(rows: Vec<RawUsageRow>) -> Vec<UsageRecord> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match UsageRecord::try_from(row) {
            Ok(record) => out.push(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable usage row");
                metrics::counter!("usage_rows_skipped_total").increment(1);
            }
        }
    }
    out
}
