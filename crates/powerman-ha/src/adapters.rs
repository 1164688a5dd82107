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

//! Home Assistant implementations of the advisor's collaborator traits

use anyhow::{Context, Result};
use async_trait::async_trait;
use powerman_core::{AdvicePublisher, AdvisorSink, EntityStateSource, NotificationSink};
use powerman_types::PublishedAdvice;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::HomeAssistantClient;
use crate::errors::HaError;
use crate::types::HaStateUpdate;

/// Entity id under which an entry's advice is published
pub fn advice_entity_id(entry_id: &str) -> String {
    let slug: String = entry_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("sensor.powerman_{slug}_advice")
}

/// Raw entity states straight from `/api/states`
#[derive(Debug, Clone)]
pub struct HaStateSource {
    client: Arc<HomeAssistantClient>,
}

impl HaStateSource {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntityStateSource for HaStateSource {
    async fn raw_state(&self, entity_id: &str) -> Result<String> {
        let state = self
            .client
            .get_state(entity_id)
            .await
            .with_context(|| format!("Failed to read entity: {entity_id}"))?;
        Ok(state.state)
    }

    fn name(&self) -> &str {
        "home_assistant"
    }
}

/// Notifications via `persistent_notification.create`
#[derive(Debug, Clone)]
pub struct HaNotifier {
    client: Arc<HomeAssistantClient>,
}

impl HaNotifier {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for HaNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        let data = json!({ "title": title, "message": message });
        self.client
            .call_service("persistent_notification.create", data)
            .await
            .context("Failed to create persistent notification")?;
        debug!("🔔 [ADAPTER] Notification sent: {}", title);
        Ok(())
    }

    fn name(&self) -> &str {
        "persistent_notification"
    }
}

/// Prompts answered by a Home Assistant conversation agent
#[derive(Debug, Clone)]
pub struct HaConversationAdvisor {
    client: Arc<HomeAssistantClient>,
}

impl HaConversationAdvisor {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdvisorSink for HaConversationAdvisor {
    async fn run_prompt(&self, agent_id: &str, prompt: &str) -> Result<String> {
        info!("🤖 [ADAPTER] Asking conversation agent {}", agent_id);
        let response = self
            .client
            .call_service_with_response(
                "conversation.process",
                json!({ "agent_id": agent_id, "text": prompt }),
            )
            .await
            .with_context(|| format!("Conversation agent {agent_id} failed"))?;

        let speech = response
            .conversation_speech()
            .map(str::trim)
            .filter(|speech| !speech.is_empty())
            .ok_or_else(|| HaError::InvalidResponse("conversation reply has no speech".to_owned()))?;
        Ok(speech.to_owned())
    }

    fn name(&self) -> &str {
        "conversation"
    }
}

/// Publishes advice as `sensor.powerman_<entry>_advice`
#[derive(Debug, Clone)]
pub struct HaAdvicePublisher {
    client: Arc<HomeAssistantClient>,
}

impl HaAdvicePublisher {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }

    pub fn state_update(entry_name: &str, published: &PublishedAdvice) -> HaStateUpdate {
        let advice = &published.advice;
        HaStateUpdate {
            state: advice.code.as_str().to_owned(),
            attributes: json!({
                "friendly_name": format!("{entry_name} advice"),
                "icon": "mdi:lightbulb-on-outline",
                "title": advice.title,
                "confidence": advice.confidence,
                "reasons": advice.reasons,
                "timestamp": published.timestamp.to_rfc3339(),
                "next_review_minutes": advice.next_review_minutes,
            }),
        }
    }
}

#[async_trait]
impl AdvicePublisher for HaAdvicePublisher {
    async fn publish(
        &self,
        entry_id: &str,
        entry_name: &str,
        advice: &PublishedAdvice,
    ) -> Result<()> {
        let entity_id = advice_entity_id(entry_id);
        self.client
            .set_state(&entity_id, &Self::state_update(entry_name, advice))
            .await
            .with_context(|| format!("Failed to publish {entity_id}"))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "ha_state"
    }
}
