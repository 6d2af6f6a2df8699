use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use starlink_client::{
    db::StoreError,
    domain::{RawUsageRow, UsageDraft, UsageFilter, UsageRecord},
};
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;

use super::{decode_rows, UsageStore};

#[derive(Default)]
struct State {
    next_id: i32,
    records: BTreeMap<i32, UsageRecord>,
}

impl State {
    fn id_for(&self, date: Date, unit: &str) -> Option<i32> {
        self.records
            .values()
            .find(|r| r.date == date && r.unit == unit)
            .map(|r| r.id)
    }

    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Usage store held in process memory, with the same uniqueness rule on
/// `(date, unit)` as the database table.
#[derive(Default)]
pub struct MemoryUsageStore {
    state: RwLock<State>,
}

impl MemoryUsageStore {
    pub fn from_records(records: Vec<UsageRecord>) -> Self {
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        let records = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            state: RwLock::new(State { next_id, records }),
        }
    }

    /// Load a JSON array of rows as exported by the hosted backend.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture '{}'", path.display()))?;
        let rows: Vec<RawUsageRow> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid fixture '{}'", path.display()))?;

        let total = rows.len();
        let records = decode_rows(rows);
        tracing::info!(
            loaded = records.len(),
            skipped = total - records.len(),
            "loaded usage fixture"
        );
        Ok(Self::from_records(records))
    }
}

#[async_trait::async_trait]
impl UsageStore for MemoryUsageStore {
    async fn list(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, StoreError> {
        let state = self.state.read().await;
        let mut rows: Vec<UsageRecord> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.unit.cmp(&b.unit)));
        Ok(rows)
    }

    async fn get(&self, id: i32) -> Result<UsageRecord, StoreError> {
        let state = self.state.read().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, draft: UsageDraft) -> Result<UsageRecord, StoreError> {
        let mut state = self.state.write().await;
        if state.id_for(draft.date, &draft.unit).is_some() {
            return Err(StoreError::Conflict);
        }

        let now = OffsetDateTime::now_utc();
        let record = UsageRecord {
            id: state.allocate_id(),
            date: draft.date,
            unit: draft.unit,
            amount: draft.amount,
            created_at: now,
            updated_at: now,
        };
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i32, draft: UsageDraft) -> Result<UsageRecord, StoreError> {
        let mut state = self.state.write().await;
        if !state.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if matches!(state.id_for(draft.date, &draft.unit), Some(other) if other != id) {
            return Err(StoreError::Conflict);
        }

        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.date = draft.date;
        record.unit = draft.unit;
        record.amount = draft.amount;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.records.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    async fn upsert_batch(&self, drafts: &[UsageDraft]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let now = OffsetDateTime::now_utc();

        for draft in drafts {
            match state.id_for(draft.date, &draft.unit) {
                Some(id) => {
                    if let Some(existing) = state.records.get_mut(&id) {
                        existing.amount = draft.amount;
                        existing.updated_at = now;
                    }
                }
                None => {
                    let id = state.allocate_id();
                    state.records.insert(
                        id,
                        UsageRecord {
                            id,
                            date: draft.date,
                            unit: draft.unit.clone(),
                            amount: draft.amount,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }

        Ok(drafts.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use starlink_client::domain::DateRange;
    use std::io::Write;
    use time::macros::date;

    fn draft(date: Date, unit: &str, amount: rust_decimal::Decimal) -> UsageDraft {
        UsageDraft {
            date,
            unit: unit.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicates() {
        let store = MemoryUsageStore::default();
        let a = store.create(draft(date!(2024 - 01 - 01), "A", dec!(1))).await.unwrap();
        let b = store.create(draft(date!(2024 - 01 - 01), "B", dec!(2))).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let dup = store.create(draft(date!(2024 - 01 - 01), "A", dec!(9))).await;
        assert!(matches!(dup, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn list_applies_inclusive_range_and_unit() {
        let store = MemoryUsageStore::default();
        for (d, unit) in [
            (date!(2024 - 01 - 03), "B"),
            (date!(2024 - 01 - 01), "A"),
            (date!(2024 - 01 - 03), "A"),
            (date!(2024 - 01 - 05), "A"),
        ] {
            store.create(draft(d, unit, dec!(1))).await.unwrap();
        }

        let all = store.list(&UsageFilter::default()).await.unwrap();
        let order: Vec<(Date, &str)> = all.iter().map(|r| (r.date, r.unit.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (date!(2024 - 01 - 01), "A"),
                (date!(2024 - 01 - 03), "A"),
                (date!(2024 - 01 - 03), "B"),
                (date!(2024 - 01 - 05), "A"),
            ]
        );

        let filter = UsageFilter {
            range: DateRange::new(Some(date!(2024 - 01 - 03)), Some(date!(2024 - 01 - 05))),
            unit: Some("A".to_string()),
        };
        let some = store.list(&filter).await.unwrap();
        assert_eq!(some.len(), 2);
        assert!(some.iter().all(|r| r.unit == "A"));
    }

    #[tokio::test]
    async fn update_checks_existence_and_uniqueness() {
        let store = MemoryUsageStore::default();
        let a = store.create(draft(date!(2024 - 01 - 01), "A", dec!(1))).await.unwrap();
        store.create(draft(date!(2024 - 01 - 02), "A", dec!(1))).await.unwrap();

        let updated = store
            .update(a.id, draft(date!(2024 - 01 - 01), "A", dec!(3.75)))
            .await
            .unwrap();
        assert_eq!(updated.amount, dec!(3.75));
        assert!(updated.updated_at >= a.updated_at);

        let clash = store.update(a.id, draft(date!(2024 - 01 - 02), "A", dec!(1))).await;
        assert!(matches!(clash, Err(StoreError::Conflict)));

        let missing = store.update(99, draft(date!(2024 - 01 - 09), "A", dec!(1))).await;
        assert!(matches!(missing, Err(StoreError::NotFound(99))));
    }

    #[tokio::test]
    async fn delete_removes_once() {
        let store = MemoryUsageStore::default();
        let a = store.create(draft(date!(2024 - 01 - 01), "A", dec!(1))).await.unwrap();
        store.delete(a.id).await.unwrap();
        assert!(matches!(store.get(a.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(a.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn upsert_replaces_amount_for_existing_pairs() {
        let store = MemoryUsageStore::default();
        let a = store.create(draft(date!(2024 - 01 - 01), "A", dec!(1))).await.unwrap();

        let written = store
            .upsert_batch(&[
                draft(date!(2024 - 01 - 01), "A", dec!(8.50)),
                draft(date!(2024 - 01 - 02), "A", dec!(2)),
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);

        assert_eq!(store.get(a.id).await.unwrap().amount, dec!(8.50));
        assert_eq!(store.list(&UsageFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fixture_file_loads_and_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": 4, "date": "2024-01-01", "unit": "A", "amount": "10.00"}},
                {{"id": 5, "date": "2024-99-01", "unit": "A", "amount": 3}},
                {{"id": 9, "date": "2024-01-02", "unit": "B", "amount": 2.5}}
            ]"#
        )
        .unwrap();

        let store = MemoryUsageStore::from_json_file(file.path()).unwrap();
        let rows = store.list(&UsageFilter::default()).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 9]);

        let next = store.create(draft(date!(2024 - 01 - 03), "A", dec!(1))).await.unwrap();
        assert_eq!(next.id, 10);
    }
}
