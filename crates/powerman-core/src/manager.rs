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

use parking_lot::{Mutex, RwLock};
use powerman_types::{EntryConfig, EntryOptions, PublishedAdvice};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::{Command, CommandResponse};
use crate::error::{AdvisorError, Result};
use crate::scheduler::{Message, Subscription};
use crate::traits::Collaborators;

struct SubscriptionHandle {
    name: String,
    mailbox: UnboundedSender<Message>,
    options: Arc<RwLock<EntryOptions>>,
    task: JoinHandle<()>,
}

/// Owns one running subscription per configured entry
pub struct SubscriptionManager {
    collaborators: Collaborators,
    subscriptions: Mutex<HashMap<String, SubscriptionHandle>>,
}

impl SubscriptionManager {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn the polling actor for an entry. The first tick runs right away.
    pub fn start(&self, entry: EntryConfig) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&entry.id) {
            return Err(AdvisorError::AlreadyRunning(entry.id));
        }

        // A zero interval would re-arm the timer back to back
        if entry.options.advisor_interval_minutes == 0 {
            return Err(AdvisorError::InvalidOptions(
                "options.advisor_interval_minutes: Must be at least 1 minute".to_owned(),
            ));
        }

        let validation = entry.options.validate("options.");
        for warning in &validation.warnings {
            warn!(entry_id = %entry.id, field = %warning.field, "{}", warning.message);
        }
        if validation.has_errors() {
            // Not fatal: each tick logs the evaluation failure until options are fixed
            warn!(
                entry_id = %entry.id,
                errors = %validation.error_summary(),
                "Starting with invalid options"
            );
        }

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let options = Arc::new(RwLock::new(entry.options));
        let subscription = Subscription::new(
            entry.id.clone(),
            entry.name.clone(),
            entry.entities,
            options.clone(),
            self.collaborators.clone(),
            mailbox.downgrade(),
        );
        let task = tokio::spawn(subscription.run(inbox));

        info!(entry_id = %entry.id, name = %entry.name, "Entry registered");
        subscriptions.insert(
            entry.id,
            SubscriptionHandle {
                name: entry.name,
                mailbox,
                options,
                task,
            },
        );
        Ok(())
    }

    /// Tear down one entry and wait for its actor to finish
    pub async fn stop(&self, entry_id: &str) -> Result<()> {
        let handle = self
            .subscriptions
            .lock()
            .remove(entry_id)
            .ok_or_else(|| AdvisorError::UnknownEntry(entry_id.to_owned()))?;

        let _ = handle.mailbox.send(Message::Shutdown);
        drop(handle.mailbox);
        if let Err(e) = handle.task.await {
            warn!(entry_id = %entry_id, error = %e, "Subscription task ended abnormally");
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let ids = self.entry_ids();
        info!("Stopping {} subscription(s)", ids.len());
        for id in ids {
            // Already gone means a concurrent stop won the race
            let _ = self.stop(&id).await;
        }
    }

    pub async fn dispatch(&self, entry_id: &str, command: Command) -> Result<CommandResponse> {
        let mailbox = self.mailbox(entry_id)?;
        let (reply, response) = oneshot::channel();
        mailbox
            .send(Message::Command { command, reply })
            .map_err(|_| AdvisorError::SubscriptionClosed(entry_id.to_owned()))?;
        response
            .await
            .map_err(|_| AdvisorError::SubscriptionClosed(entry_id.to_owned()))?
    }

    /// Dispatch an action by its external name
    pub async fn dispatch_named(&self, entry_id: &str, action: &str) -> Result<CommandResponse> {
        let command = action.parse::<Command>()?;
        self.dispatch(entry_id, command).await
    }

    /// Latest advice produced for the entry, if any
    pub async fn current_advice(&self, entry_id: &str) -> Result<Option<PublishedAdvice>> {
        let mailbox = self.mailbox(entry_id)?;
        let (reply, response) = oneshot::channel();
        mailbox
            .send(Message::CurrentAdvice(reply))
            .map_err(|_| AdvisorError::SubscriptionClosed(entry_id.to_owned()))?;
        response
            .await
            .map_err(|_| AdvisorError::SubscriptionClosed(entry_id.to_owned()))
    }

    /// Replace the options of a running entry. The next re-arm uses the new interval.
    pub fn update_options(&self, entry_id: &str, options: EntryOptions) -> Result<()> {
        let validation = options.validate("options.");
        if validation.has_errors() {
            return Err(AdvisorError::InvalidOptions(validation.error_summary()));
        }

        let subscriptions = self.subscriptions.lock();
        let handle = subscriptions
            .get(entry_id)
            .ok_or_else(|| AdvisorError::UnknownEntry(entry_id.to_owned()))?;
        *handle.options.write() = options;
        info!(entry_id = %entry_id, "Options updated");
        Ok(())
    }

    pub fn options(&self, entry_id: &str) -> Result<EntryOptions> {
        self.subscriptions
            .lock()
            .get(entry_id)
            .map(|handle| handle.options.read().clone())
            .ok_or_else(|| AdvisorError::UnknownEntry(entry_id.to_owned()))
    }

    pub fn entry_name(&self, entry_id: &str) -> Option<String> {
        self.subscriptions
            .lock()
            .get(entry_id)
            .map(|handle| handle.name.clone())
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.subscriptions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn mailbox(&self, entry_id: &str) -> Result<UnboundedSender<Message>> {
        self.subscriptions
            .lock()
            .get(entry_id)
            .map(|handle| handle.mailbox.clone())
            .ok_or_else(|| AdvisorError::UnknownEntry(entry_id.to_owned()))
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("entries", &self.entry_ids())
            .field("collaborators", &self.collaborators)
            .finish()
    }
}
