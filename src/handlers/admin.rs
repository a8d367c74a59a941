use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Consultancy, ConsultancyAvailability, VerificationStatus};
use crate::state::AppState;

use super::identity::check_admin;

// GET /api/admin/consultancies
pub async fn list_consultancies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let consultancies = {
        let db = state.db()?;
        queries::list_consultancies(&db)?
    };

    let listed: Vec<Value> = consultancies
        .into_iter()
        .map(|c| {
            let schedule = c.availability.parse().map(|h| h.to_human_readable()).ok();
            json!({ "consultancy": c, "schedule": schedule })
        })
        .collect();

    Ok(Json(json!({ "success": true, "consultancies": listed })))
}

// POST /api/admin/consultancies
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultancyInput {
    pub id: Option<String>,
    pub name: String,
    pub owner_id: String,
    pub availability: ConsultancyAvailability,
    #[serde(default)]
    pub fee_cents: i64,
    pub status: Option<VerificationStatus>,
}

pub async fn upsert_consultancy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ConsultancyInput>,
) -> Result<Json<Value>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    if body.name.trim().is_empty() || body.owner_id.trim().is_empty() {
        return Err(AppError::BadRequest("name and ownerId are required".to_string()));
    }
    if body.fee_cents < 0 {
        return Err(AppError::BadRequest("feeCents cannot be negative".to_string()));
    }
    body.availability
        .parse()
        .map_err(|e| AppError::BadRequest(format!("invalid availability: {e}")))?;

    let db = state.db()?;
    let now = Utc::now().naive_utc();
    let existing = match body.id.as_deref() {
        Some(id) => queries::get_consultancy(&db, id)?,
        None => None,
    };

    let consultancy = Consultancy {
        id: body.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: body.name.trim().to_string(),
        owner_id: body.owner_id.trim().to_string(),
        status: body
            .status
            .or(existing.as_ref().map(|c| c.status))
            .unwrap_or(VerificationStatus::Pending),
        availability: body.availability,
        fee_cents: body.fee_cents,
        created_at: existing.as_ref().map(|c| c.created_at).unwrap_or(now),
        updated_at: now,
    };
    queries::upsert_consultancy(&db, &consultancy)?;

    tracing::info!(
        consultancy_id = %consultancy.id,
        status = consultancy.status.as_str(),
        "consultancy saved"
    );

    Ok(Json(json!({ "success": true, "consultancy": consultancy })))
}

// POST /api/admin/consultancies/:id/status
#[derive(Deserialize)]
pub struct StatusInput {
    pub status: VerificationStatus,
}

pub async fn set_consultancy_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StatusInput>,
) -> Result<Json<Value>, AppError> {
    check_admin(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db()?;
        queries::set_consultancy_status(&db, &id, body.status)?
    };
    if !updated {
        return Err(AppError::NotFound(format!("consultancy {id}")));
    }

    tracing::info!(
        consultancy_id = %id,
        status = body.status.as_str(),
        "consultancy status changed"
    );
    Ok(Json(json!({ "success": true, "status": body.status })))
}
