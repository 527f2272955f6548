use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::{error_response, ApiError};
use crate::alerts::OutdatedVersionAlert;
use crate::api::AppState;

/// Request structure for a template version bump
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionRequest {
    pub template_id: String,
    pub outdated_version: Option<String>,
    pub latest_version: String,
    pub user_id: String,
}

/// Request structure for a plugin version bump
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginVersionRequest {
    pub project_id: String,
    pub plugin_id: String,
    pub new_version: String,
    pub user_id: String,
}

/// Request structure for moving a service to another template version
#[derive(Debug, Deserialize)]
pub struct TemplateUpgradeRequest {
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub created: Vec<OutdatedVersionAlert>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub resolved: usize,
}

/// POST /api/triggers/template-version
pub async fn template_version(
    State(state): State<AppState>,
    Json(req): Json<TemplateVersionRequest>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let created = state
        .manager
        .trigger_alerts_for_template_version(
            &req.template_id,
            req.outdated_version.as_deref(),
            &req.latest_version,
            &req.user_id,
        )
        .map_err(|e| error_response("Failed to raise template version alerts", e))?;
    Ok(Json(TriggerResponse { created }))
}

/// POST /api/triggers/plugin-version
pub async fn plugin_version(
    State(state): State<AppState>,
    Json(req): Json<PluginVersionRequest>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let created = state
        .manager
        .trigger_alerts_for_new_plugin_version(
            &req.project_id,
            &req.plugin_id,
            &req.new_version,
            &req.user_id,
        )
        .map_err(|e| error_response("Failed to raise plugin version alerts", e))?;
    Ok(Json(TriggerResponse { created }))
}

/// POST /api/resources/{resource_id}/template-version
/// Records the service's new template version, resolving its template alerts when current
pub async fn upgrade_template(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Json(req): Json<TemplateUpgradeRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let resolved = state
        .manager
        .upgrade_service_template(&resource_id, &req.version)
        .map_err(|e| error_response("Failed to upgrade service template", e))?;
    Ok(Json(ResolveResponse { resolved }))
}

/// POST /api/resources/{resource_id}/resolve-template-alerts
pub async fn resolve_template_alerts(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let resolved = state
        .manager
        .resolve_for_template_update(&resource_id)
        .map_err(|e| error_response("Failed to resolve template alerts", e))?;
    Ok(Json(ResolveResponse { resolved }))
}
