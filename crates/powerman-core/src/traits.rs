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

use anyhow::Result;
use async_trait::async_trait;
use powerman_types::PublishedAdvice;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;

// ============= Collaborator Traits =============

/// Source of raw entity states (e.g. Home Assistant)
///
/// Implementations return the state exactly as the platform reports it.
/// Parsing and fallback to "absent" happen in [`crate::SnapshotReader`].
#[async_trait]
pub trait EntityStateSource: Send + Sync {
    async fn raw_state(&self, entity_id: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Fire-and-forget user notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Expensive external advisor (a conversation agent) that answers a prompt
#[async_trait]
pub trait AdvisorSink: Send + Sync {
    async fn run_prompt(&self, agent_id: &str, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Exposes the current advice as state for dashboards and automations
#[async_trait]
pub trait AdvicePublisher: Send + Sync {
    async fn publish(&self, entry_id: &str, entry_name: &str, advice: &PublishedAdvice)
    -> Result<()>;

    fn name(&self) -> &str;
}

/// Everything a subscription needs from the outside world
#[derive(Clone)]
pub struct Collaborators {
    pub states: Arc<dyn EntityStateSource>,
    pub notifier: Arc<dyn NotificationSink>,
    pub advisor: Arc<dyn AdvisorSink>,
    pub publisher: Arc<dyn AdvicePublisher>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("states", &self.states.name())
            .field("notifier", &self.notifier.name())
            .field("advisor", &self.advisor.name())
            .field("publisher", &self.publisher.name())
            .field("clock", &self.clock)
            .finish()
    }
}
