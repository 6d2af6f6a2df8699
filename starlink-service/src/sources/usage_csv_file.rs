use std::{fs::File, path::PathBuf, str::FromStr};

use rust_decimal::Decimal;
use starlink_client::domain::{parse_calendar_date, UsageDraft};

use crate::pipeline::{Envelope, PipelineError, RowStream, Source};

/// CSV source for usage drafts.
///
/// Expected header columns (by name, any order, extra columns ignored):
/// - date (YYYY-MM-DD)
/// - unit
/// - amount (decimal)
pub struct UsageCsvFileSource {
    path: PathBuf,
}

impl UsageCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    date: String,
    unit: String,
    amount: String,
}

fn row_to_draft(row: CsvRow) -> Result<UsageDraft, String> {
    let date = parse_calendar_date(&row.date)
        .map_err(|e| format!("invalid date '{}': {e}", row.date))?;
    let amount = Decimal::from_str(row.amount.trim())
        .map_err(|e| format!("invalid amount '{}': {e}", row.amount))?;

    Ok(UsageDraft {
        date,
        unit: row.unit,
        amount,
    })
}

#[async_trait::async_trait]
impl Source<UsageDraft> for UsageCsvFileSource {
    async fn stream(&self) -> RowStream<UsageDraft> {
        // Blocking reads inside one task; import files are small daily logs.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    let msg = format!("failed to open '{}': {e}", path.display());
                    yield Err(PipelineError::Source(msg));
                    return;
                }
            };

            let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(file);
            let mut line: u64 = 0;
            for result in rdr.deserialize::<CsvRow>() {
                line += 1;
                let parsed = result
                    .map_err(|e| e.to_string())
                    .and_then(row_to_draft);

                match parsed {
                    Ok(payload) => yield Ok(Envelope { payload, line }),
                    Err(reason) => {
                        metrics::counter!("usage_csv_parse_errors_total").increment(1);
                        yield Err(PipelineError::Rejected { line, reason });
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use time::macros::date;

    #[tokio::test]
    async fn reads_rows_and_flags_bad_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "unit, date, amount").unwrap();
        writeln!(file, "Barge,2024-01-01,10.25").unwrap();
        writeln!(file, "Barge,2024-01-32,1").unwrap();
        writeln!(file, "Yard,2024-01-02,lots").unwrap();
        writeln!(file, "Yard,2024-01-02,0.5").unwrap();

        let items: Vec<_> = UsageCsvFileSource::new(file.path()).stream().await.collect().await;
        assert_eq!(items.len(), 4);

        let first = items[0].as_ref().unwrap();
        assert_eq!(first.line, 1);
        assert_eq!(first.payload.date, date!(2024 - 01 - 01));
        assert_eq!(first.payload.amount, dec!(10.25));

        assert!(matches!(items[1], Err(PipelineError::Rejected { line: 2, .. })));
        assert!(matches!(items[2], Err(PipelineError::Rejected { line: 3, .. })));
        assert_eq!(items[3].as_ref().unwrap().payload.unit, "Yard");
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let items: Vec<_> = UsageCsvFileSource::new("/nonexistent/usage.csv")
            .stream()
            .await
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}
