//! HTTP surface: usage CRUD plus the report endpoint feeding the charts.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use starlink_client::domain::{UsageDraft, UsageFilter, UsageRecord};

use crate::{
    aggregate::{self, DateTotal, DateUnitRow, MonthTotal, MonthUnitRow},
    store::UsageStore,
    transform::validate_draft,
};

pub mod error;
pub mod query;

pub use error::ApiError;
use query::{GroupBy, ReportParams};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn UsageStore>,
    auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn UsageStore>, auth_token: Option<String>) -> Self {
        Self {
            store,
            auth_token: auth_token.map(Arc::from),
        }
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let api = Router::new()
        .route("/api/starlink/usage", get(usage_report).post(create_usage))
        .route(
            "/api/starlink/usage/:id",
            get(get_usage).put(update_usage).delete(delete_usage),
        )
        .route("/api/starlink/units", get(list_units))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn require_bearer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.auth_token {
        let presented = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if presented != Some(expected.as_ref()) {
            metrics::counter!("api_unauthorized_total").increment(1);
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Body of the report endpoint: either raw rows or one aggregated shape.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UsageReport {
    Raw(Vec<UsageRecord>),
    ByDate(Vec<DateTotal>),
    ByDateAndUnit(Vec<DateUnitRow>),
    ByMonth(Vec<MonthTotal>),
    ByMonthAndUnit(Vec<MonthUnitRow>),
}

/// Build a report from an already-fetched snapshot.
pub fn build_report(records: Vec<UsageRecord>, params: &ReportParams) -> UsageReport {
    let range = params.range();
    let (start, end) = (range.start, range.end);

    match params.group_by() {
        None => UsageReport::Raw(records),
        Some(GroupBy::Date) => {
            UsageReport::ByDate(aggregate::aggregate_by_date(&records, start, end))
        }
        Some(GroupBy::DateAndUnit) => {
            UsageReport::ByDateAndUnit(aggregate::aggregate_by_date_and_unit(&records, start, end))
        }
        Some(GroupBy::Month) => {
            let month = params.month();
            UsageReport::ByMonth(aggregate::aggregate_by_month(&records, start, end, month))
        }
        Some(GroupBy::MonthAndUnit) => {
            let month = params.month();
            UsageReport::ByMonthAndUnit(aggregate::aggregate_by_month_and_unit(
                &records, start, end, month,
            ))
        }
    }
}

async fn usage_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<UsageReport>, ApiError> {
    let group = params.group_by().map_or("raw", |g| g.as_str());
    metrics::counter!("api_report_requests_total", "group_by" => group).increment(1);

    let records = state.store.list(&params.filter()).await?;
    tracing::debug!(rows = records.len(), group_by = group, "building usage report");
    Ok(Json(build_report(records, &params)))
}

async fn list_units(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let filter = UsageFilter {
        range: params.range(),
        unit: None,
    };
    let records = state.store.list(&filter).await?;
    Ok(Json(aggregate::distinct_units(&records)))
}

fn usage_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn usage_draft(payload: Result<Json<UsageDraft>, JsonRejection>) -> Result<UsageDraft, ApiError> {
    let Json(draft) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
        _ => ApiError::BadRequest(e.body_text()),
    })?;
    Ok(validate_draft(draft)?)
}

async fn get_usage(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<UsageRecord>, ApiError> {
    let id = usage_id(path)?;
    Ok(Json(state.store.get(id).await?))
}

async fn create_usage(
    State(state): State<AppState>,
    payload: Result<Json<UsageDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<UsageRecord>), ApiError> {
    let draft = usage_draft(payload)?;
    let record = state.store.create(draft).await?;
    tracing::info!(
        id = record.id,
        unit = %record.unit,
        date = %record.date,
        "usage record created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_usage(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UsageDraft>, JsonRejection>,
) -> Result<Json<UsageRecord>, ApiError> {
    let id = usage_id(path)?;
    let draft = usage_draft(payload)?;
    let record = state.store.update(id, draft).await?;
    tracing::info!(id, "usage record updated");
    Ok(Json(record))
}

async fn delete_usage(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = usage_id(path)?;
    state.store.delete(id).await?;
    tracing::info!(id, "usage record deleted");
    Ok(StatusCode::NO_CONTENT)
}
