use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::StoreError;
use crate::domain::{UsageDraft, UsageFilter, UsageRecord};

const RETURNING: &str = "RETURNING id, date, unit, amount, created_at, updated_at";

/// Fetch usage rows matching `filter`, ordered by date then unit.
pub async fn list_usage(
    pool: &PgPool,
    filter: &UsageFilter,
) -> Result<Vec<UsageRecord>, StoreError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        r#"
        SELECT id, date, unit, amount, created_at, updated_at
        FROM starlink_usage
        WHERE TRUE
        "#,
    );

    if let Some(start) = filter.range.start {
        builder.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = filter.range.end {
        builder.push(" AND date <= ").push_bind(end);
    }
    if let Some(unit) = &filter.unit {
        builder.push(" AND unit = ").push_bind(unit);
    }
    builder.push(" ORDER BY date, unit");

    let rows = builder
        .build_query_as::<UsageRecord>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn fetch_usage(pool: &PgPool, id: i32) -> Result<UsageRecord, StoreError> {
    sqlx::query_as::<_, UsageRecord>(
        r#"
        SELECT id, date, unit, amount, created_at, updated_at
        FROM starlink_usage
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound(id))
}

/// Insert one row. Fails with [`StoreError::Conflict`] if the unit already
/// has usage logged on that date.
pub async fn insert_usage(pool: &PgPool, draft: &UsageDraft) -> Result<UsageRecord, StoreError> {
    let sql = format!(
        "INSERT INTO starlink_usage (date, unit, amount) VALUES ($1, $2, $3) {RETURNING}"
    );

    let row = sqlx::query_as::<_, UsageRecord>(&sql)
        .bind(draft.date)
        .bind(&draft.unit)
        .bind(draft.amount)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

pub async fn update_usage(
    pool: &PgPool,
    id: i32,
    draft: &UsageDraft,
) -> Result<UsageRecord, StoreError> {
    let sql = format!(
        r#"
        UPDATE starlink_usage
        SET date = $1, unit = $2, amount = $3, updated_at = now()
        WHERE id = $4
        {RETURNING}
        "#
    );

    sqlx::query_as::<_, UsageRecord>(&sql)
        .bind(draft.date)
        .bind(&draft.unit)
        .bind(draft.amount)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound(id))
}

pub async fn delete_usage(pool: &PgPool, id: i32) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM starlink_usage WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Insert-or-replace a batch keyed on `(date, unit)`.
///
/// Postgres refuses to touch the same conflict target twice in one statement,
/// so callers must not pass two drafts with the same date and unit.
pub async fn upsert_usage_batch(pool: &PgPool, drafts: &[UsageDraft]) -> Result<u64, StoreError> {
    if drafts.is_empty() {
        return Ok(0);
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO starlink_usage (date, unit, amount) ");
    builder.push_values(drafts, |mut b, d| {
        b.push_bind(d.date).push_bind(&d.unit).push_bind(d.amount);
    });
    builder.push(
        " ON CONFLICT (date, unit) DO UPDATE SET amount = EXCLUDED.amount, updated_at = now()",
    );

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
