// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PowerMan.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! JSON handlers for entries, actions and options

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use powerman_core::{AdvisorError, Command, CommandResponse};
use powerman_types::{EntryOptions, PublishedAdvice, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::AppState;

/// Advisor errors rendered as `{"error": ...}` with a matching status
#[derive(Debug)]
pub struct ApiError(AdvisorError);

impl From<AdvisorError> for ApiError {
    fn from(error: AdvisorError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AdvisorError::UnknownEntry(_) => StatusCode::NOT_FOUND,
            AdvisorError::UnknownCommand(_) => StatusCode::BAD_REQUEST,
            AdvisorError::InvalidOptions(_) | AdvisorError::InvalidPeakWindow { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AdvisorError::AlreadyRunning(_) => StatusCode::CONFLICT,
            AdvisorError::SubscriptionClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AdvisorError::Sink { .. } | AdvisorError::Timeout { .. } => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "API request failed");
        } else {
            debug!(status = %status, error = %self.0, "API request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub entries: Vec<String>,
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        entries: state.manager.entry_ids(),
    })
}

#[derive(Debug, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub name: String,
}

/// GET /api/entries
pub async fn list_entries_handler(State(state): State<AppState>) -> Json<Vec<EntrySummary>> {
    let entries = state
        .manager
        .entry_ids()
        .into_iter()
        .filter_map(|id| {
            let name = state.manager.entry_name(&id)?;
            Some(EntrySummary { id, name })
        })
        .collect();
    Json(entries)
}

#[derive(Debug, Serialize)]
pub struct AdviceResponse {
    pub entry_id: String,
    /// Absent until the first successful evaluation
    pub advice: Option<PublishedAdvice>,
}

/// GET /api/entries/{id}/advice
pub async fn advice_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<AdviceResponse>, ApiError> {
    let advice = state.manager.current_advice(&entry_id).await?;
    Ok(Json(AdviceResponse { entry_id, advice }))
}

/// POST /api/entries/{id}/actions/{action}
pub async fn action_handler(
    State(state): State<AppState>,
    Path((entry_id, action)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = action.parse::<Command>()?;
    info!(entry_id = %entry_id, command = %command, "Action requested over HTTP");
    let response = state.manager.dispatch(&entry_id, command).await?;
    Ok(Json(response))
}

/// GET /api/entries/{id}/options
pub async fn get_options_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<EntryOptions>, ApiError> {
    Ok(Json(state.manager.options(&entry_id)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOptionsRequest {
    pub options: EntryOptions,
}

#[derive(Debug, Serialize)]
pub struct UpdateOptionsResponse {
    pub applied: bool,
    pub validation: ValidationResult,
}

/// PUT /api/entries/{id}/options
///
/// Invalid options are reported in the body and not applied.
pub async fn update_options_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    Json(request): Json<UpdateOptionsRequest>,
) -> Result<(StatusCode, Json<UpdateOptionsResponse>), ApiError> {
    let validation = request.options.validate("options.");
    if validation.has_errors() {
        // Unknown entries still answer 404 rather than a validation error
        state.manager.options(&entry_id)?;
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(UpdateOptionsResponse {
                applied: false,
                validation,
            }),
        ));
    }

    state.manager.update_options(&entry_id, request.options)?;
    Ok((
        StatusCode::OK,
        Json(UpdateOptionsResponse {
            applied: true,
            validation,
        }),
    ))
}
