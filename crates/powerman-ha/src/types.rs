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

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity state as returned by `GET /api/states/{entity_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub last_changed: String,
    #[serde(default)]
    pub last_updated: String,
}

/// Body of `POST /api/states/{entity_id}`
#[derive(Debug, Clone, Serialize)]
pub struct HaStateUpdate {
    pub state: String,
    pub attributes: Value,
}

/// Service call made with `?return_response`
#[derive(Debug, Clone, Deserialize)]
pub struct HaServiceResponse {
    #[serde(default)]
    pub changed_states: Vec<HaEntityState>,
    #[serde(default)]
    pub service_response: Value,
}

impl HaServiceResponse {
    /// Spoken reply of a `conversation.process` call
    pub fn conversation_speech(&self) -> Option<&str> {
        self.service_response
            .pointer("/response/speech/plain/speech")
            .and_then(Value::as_str)
    }
}
