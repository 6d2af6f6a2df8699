use anyhow::{bail, Result};
use starlink_client::domain::UsageDraft;
use starlink_service::{
    config::AppConfig,
    observability,
    pipeline::{Pipeline, Transform},
    sinks::StoreBatchSink,
    sources::UsageCsvFileSource,
    store,
    transform,
};
use std::{env, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_usage_csv <csv_file_path>");
    }
    let file_path = &args[1];

    let cfg = AppConfig::load()?;
    let store = store::open_store(&cfg).await?;

    let import_cfg = &cfg.import;
    let sink = StoreBatchSink::new(
        store,
        import_cfg.batch_size,
        import_cfg.max_retries,
        Duration::from_millis(import_cfg.retry_backoff_ms),
    );

    let validation: Arc<dyn Transform<UsageDraft, UsageDraft>> =
        Arc::new(transform::UsageDraftValidation);
    let pipeline: Pipeline<_, UsageDraft, _> = Pipeline {
        source: UsageCsvFileSource::new(file_path),
        transforms: vec![validation],
        sink,
    };

    let report = pipeline.run().await?;
    tracing::info!(
        file = %file_path,
        read = report.read,
        written = report.written,
        rejected = report.rejected,
        "usage import finished"
    );

    Ok(())
}
