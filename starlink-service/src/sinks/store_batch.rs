use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::StreamExt;
use starlink_client::{db::StoreError, domain::UsageDraft};
use time::Date;

use crate::{
    pipeline::{Envelope, ImportReport, PipelineError, RowStream, Sink},
    store::UsageStore,
};

/// Batches validated drafts into `UsageStore::upsert_batch` calls, retrying
/// database failures with linear backoff.
pub struct StoreBatchSink {
    store: Arc<dyn UsageStore>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl StoreBatchSink {
    pub fn new(
        store: Arc<dyn UsageStore>,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<UsageDraft>]) -> Result<u64, PipelineError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let drafts = dedupe_last_wins(batch);

        let mut attempt: u32 = 0;
        loop {
            match self.store.upsert_batch(&drafts).await {
                Ok(written) => {
                    metrics::counter!("usage_import_written_total").increment(written);
                    return Ok(written);
                }
                Err(StoreError::Database(e)) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "usage import flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "usage import flush failed, giving up");
                    metrics::counter!("usage_import_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }
}

/// Keep one draft per `(date, unit)`; a later row replaces an earlier one.
fn dedupe_last_wins(batch: &[Envelope<UsageDraft>]) -> Vec<UsageDraft> {
    let mut slots: HashMap<(Date, &str), usize> = HashMap::with_capacity(batch.len());
    let mut out: Vec<UsageDraft> = Vec::with_capacity(batch.len());

    for env in batch {
        let d = &env.payload;
        match slots.get(&(d.date, d.unit.as_str())) {
            Some(&idx) => out[idx] = d.clone(),
            None => {
                slots.insert((d.date, d.unit.as_str()), out.len());
                out.push(d.clone());
            }
        }
    }
    out
}

#[async_trait::async_trait]
impl Sink<UsageDraft> for StoreBatchSink {
    async fn run(&self, mut input: RowStream<UsageDraft>) -> Result<ImportReport, PipelineError> {
        let mut report = ImportReport::default();
        let mut buffer: Vec<Envelope<UsageDraft>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            report.read += 1;
            let env = match item {
                Ok(env) => env,
                Err(PipelineError::Rejected { line, reason }) => {
                    tracing::warn!(line, reason = %reason, "skipping usage row");
                    report.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                report.written += self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        report.written += self.flush_batch(&buffer).await?;
        Ok(report)
    }
}
