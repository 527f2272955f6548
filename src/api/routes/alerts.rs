use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::{error_response, ApiError};
use crate::alerts::{AlertFilter, AlertUpdate, NewAlert, OutdatedVersionAlert};
use crate::api::AppState;
use crate::error::AlertError;

/// Request structure for updating an alert
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlertRequest {
    #[serde(flatten)]
    pub update: AlertUpdate,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// GET /api/alerts
/// Lists alerts matching the query string filter, newest first
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<OutdatedVersionAlert>>, ApiError> {
    let alerts = state
        .manager
        .find_many(&filter)
        .map_err(|e| error_response("Failed to list alerts", e))?;
    Ok(Json(alerts))
}

/// GET /api/alerts/count
pub async fn count_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state
        .manager
        .count(&filter)
        .map_err(|e| error_response("Failed to count alerts", e))?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/alerts/{alert_id}
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
) -> Result<Json<OutdatedVersionAlert>, ApiError> {
    let alert = state
        .manager
        .find_one(alert_id)
        .and_then(|alert| {
            alert.ok_or_else(|| AlertError::NotFound(format!("Alert {}", alert_id)))
        })
        .map_err(|e| error_response("Failed to load alert", e))?;
    Ok(Json(alert))
}

/// POST /api/alerts
/// Creates an alert, canceling the open alerts of the same scope
pub async fn create_alert(
    State(state): State<AppState>,
    Json(req): Json<NewAlert>,
) -> Result<(StatusCode, Json<OutdatedVersionAlert>), ApiError> {
    let alert = state
        .manager
        .create(&req)
        .map_err(|e| error_response("Failed to create alert", e))?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// PATCH /api/alerts/{alert_id}
pub async fn update_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
    Json(req): Json<UpdateAlertRequest>,
) -> Result<Json<OutdatedVersionAlert>, ApiError> {
    let alert = state
        .manager
        .update(alert_id, &req.update, &req.user_id)
        .map_err(|e| error_response("Failed to update alert", e))?;
    Ok(Json(alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStatus;

    #[test]
    fn test_update_request_flattens_fields() {
        let req: UpdateAlertRequest =
            serde_json::from_str(r#"{"status": "Resolved", "userId": "user-1"}"#).unwrap();
        assert_eq!(req.update.status, Some(AlertStatus::Resolved));
        assert_eq!(req.update.latest_version, None);
        assert_eq!(req.user_id, "user-1");
    }
}
