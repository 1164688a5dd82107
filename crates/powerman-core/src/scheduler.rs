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

//! Per-entry polling actor
//!
//! Each subscription is one tokio task draining its mailbox. Scheduled ticks,
//! manual commands and the external advisor call all run inside that task,
//! so [`EntryState`] is never shared.

use parking_lot::RwLock;
use powerman_types::{
    Advice, AdviceCode, EntityMapping, EntryOptions, PublishedAdvice, Snapshot, Thresholds,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::advisor::{evaluate, thresholds_from_options};
use crate::commands::{AdviseNowResponse, Command, CommandResponse, ExternalOutcome, InsightResponse};
use crate::error::{AdvisorError, Result};
use crate::insight::{
    AI_INSIGHT_FAILED_TITLE, AI_INSIGHT_TITLE, INSIGHT_TITLE, advisor_prompt, local_summary,
};
use crate::rate_gate::{GatedCall, RateLimitedCallGate};
use crate::snapshot_reader::SnapshotReader;
use crate::traits::Collaborators;

/// Messages accepted by a subscription
#[derive(Debug)]
pub(crate) enum Message {
    /// Posted by a [`ScheduledTick`] when its delay elapses
    Tick { generation: u64 },
    Command {
        command: Command,
        reply: oneshot::Sender<Result<CommandResponse>>,
    },
    CurrentAdvice(oneshot::Sender<Option<PublishedAdvice>>),
    Shutdown,
}

/// A pending tick. Dropping or cancelling it aborts the sleeping task.
#[derive(Debug)]
pub struct ScheduledTick {
    generation: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

impl ScheduledTick {
    pub(crate) fn arm(
        delay: Duration,
        generation: u64,
        mailbox: WeakUnboundedSender<Message>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Holding only a weak sender lets the mailbox close once the manager lets go
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender.send(Message::Tick { generation });
            }
        });
        Self {
            generation,
            delay,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for ScheduledTick {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Result of comparing a tick's advice with the previously recorded code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeChange {
    /// First code after start or after a reset; never notified
    Seeded(AdviceCode),
    Unchanged(AdviceCode),
    Changed { from: AdviceCode, to: AdviceCode },
    /// No advice any more, detection reset
    Cleared,
    NoAdvice,
}

/// Everything a subscription remembers between ticks
#[derive(Debug, Default)]
pub struct EntryState {
    previous_code: Option<AdviceCode>,
    gate: RateLimitedCallGate,
    pending_tick: Option<ScheduledTick>,
    generation: u64,
    last_advice: Option<PublishedAdvice>,
}

impl EntryState {
    pub fn previous_code(&self) -> Option<AdviceCode> {
        self.previous_code
    }

    pub fn last_advice(&self) -> Option<&PublishedAdvice> {
        self.last_advice.as_ref()
    }

    pub fn pending_tick(&self) -> Option<&ScheduledTick> {
        self.pending_tick.as_ref()
    }

    /// Record the code of the latest advice and report how it moved
    pub fn observe(&mut self, advice: Option<&Advice>) -> CodeChange {
        match (advice, self.previous_code) {
            (Some(advice), None) => {
                self.previous_code = Some(advice.code);
                CodeChange::Seeded(advice.code)
            }
            (Some(advice), Some(previous)) if previous == advice.code => {
                CodeChange::Unchanged(previous)
            }
            (Some(advice), Some(previous)) => {
                self.previous_code = Some(advice.code);
                CodeChange::Changed {
                    from: previous,
                    to: advice.code,
                }
            }
            (None, Some(_)) => {
                self.previous_code = None;
                CodeChange::Cleared
            }
            (None, None) => CodeChange::NoAdvice,
        }
    }

    /// Cancel the pending tick (if any) and arm a new one
    pub(crate) fn arm_next_tick(&mut self, delay: Duration, mailbox: WeakUnboundedSender<Message>) {
        self.cancel_pending();
        self.generation += 1;
        self.pending_tick = Some(ScheduledTick::arm(delay, self.generation, mailbox));
    }

    pub fn cancel_pending(&mut self) {
        if let Some(tick) = self.pending_tick.take() {
            tick.cancel();
        }
    }

    /// Whether a fired tick belongs to the currently armed timer
    pub fn is_current(&self, generation: u64) -> bool {
        self.pending_tick
            .as_ref()
            .is_some_and(|tick| tick.generation == generation)
    }
}

/// What one evaluation produced
enum TickOutcome {
    NoEntities,
    Failed(AdvisorError),
    Evaluated(PublishedAdvice),
}

pub(crate) struct Subscription {
    entry_id: String,
    entry_name: String,
    entities: EntityMapping,
    options: Arc<RwLock<EntryOptions>>,
    collaborators: Collaborators,
    reader: SnapshotReader,
    mailbox: WeakUnboundedSender<Message>,
    state: EntryState,
}

impl Subscription {
    pub(crate) fn new(
        entry_id: String,
        entry_name: String,
        entities: EntityMapping,
        options: Arc<RwLock<EntryOptions>>,
        collaborators: Collaborators,
        mailbox: WeakUnboundedSender<Message>,
    ) -> Self {
        let reader = SnapshotReader::new(collaborators.states.clone());
        Self {
            entry_id,
            entry_name,
            entities,
            options,
            collaborators,
            reader,
            mailbox,
            state: EntryState::default(),
        }
    }

    pub(crate) async fn run(mut self, mut inbox: UnboundedReceiver<Message>) {
        info!(
            entry_id = %self.entry_id,
            mapped = self.entities.mapped().count(),
            "▶️ Subscription started"
        );
        if self.entities.is_empty() {
            warn!(entry_id = %self.entry_id, "No entities mapped, advice will stay empty");
        }

        self.scheduled_tick().await;
        self.arm_next_tick();

        while let Some(message) = inbox.recv().await {
            match message {
                Message::Tick { generation } => {
                    if !self.state.is_current(generation) {
                        debug!(entry_id = %self.entry_id, generation, "Ignoring stale tick");
                        continue;
                    }
                    self.state.pending_tick = None;
                    self.scheduled_tick().await;
                    self.arm_next_tick();
                }
                Message::Command { command, reply } => {
                    let response = self.handle_command(command).await;
                    let _ = reply.send(response);
                }
                Message::CurrentAdvice(reply) => {
                    let _ = reply.send(self.state.last_advice.clone());
                }
                Message::Shutdown => break,
            }
        }

        self.state.cancel_pending();
        info!(entry_id = %self.entry_id, "⏹️ Subscription stopped");
    }

    fn arm_next_tick(&mut self) {
        let delay = self.options.read().advisor_interval();
        self.state.arm_next_tick(delay, self.mailbox.clone());
        debug!(
            entry_id = %self.entry_id,
            delay_secs = delay.as_secs(),
            generation = self.state.generation,
            "⏰ Next tick armed"
        );
    }

    async fn handle_command(&mut self, command: Command) -> Result<CommandResponse> {
        info!(entry_id = %self.entry_id, command = %command, "Handling command");
        match command {
            Command::AdviseNow => Ok(CommandResponse::AdviseNow(self.advise_now().await)),
            Command::GenerateInsight => Ok(CommandResponse::GenerateInsight(
                self.generate_insight().await,
            )),
        }
    }

    async fn scheduled_tick(&mut self) {
        let published = match self.evaluate_now().await {
            TickOutcome::Evaluated(published) => published,
            TickOutcome::NoEntities => {
                if self.state.observe(None) == CodeChange::Cleared {
                    debug!(entry_id = %self.entry_id, "Advice gone, change detection reset");
                }
                return;
            }
            TickOutcome::Failed(e) => {
                error!(entry_id = %self.entry_id, error = %e, "❌ Advice evaluation failed");
                return;
            }
        };

        self.publish(&published).await;

        match self.state.observe(Some(&published.advice)) {
            CodeChange::Changed { from, to } => {
                info!(entry_id = %self.entry_id, from = %from, to = %to, "🔀 Advice changed");
                if self.options.read().notify_on_change {
                    self.notify(&published.advice.title, &published.advice.formatted_reasons())
                        .await;
                }
            }
            CodeChange::Seeded(code) => {
                info!(entry_id = %self.entry_id, code = %code, "Initial advice");
            }
            CodeChange::Unchanged(code) => {
                debug!(entry_id = %self.entry_id, code = %code, "Advice unchanged");
            }
            CodeChange::Cleared | CodeChange::NoAdvice => {}
        }
    }

    /// Out-of-band tick that always notifies and leaves the timer alone
    async fn advise_now(&mut self) -> AdviseNowResponse {
        match self.evaluate_now().await {
            TickOutcome::Evaluated(published) => {
                self.publish(&published).await;
                self.state.observe(Some(&published.advice));
                let notified = self
                    .notify(&published.advice.title, &published.advice.formatted_reasons())
                    .await;
                AdviseNowResponse {
                    advice: Some(published),
                    notified,
                }
            }
            TickOutcome::NoEntities => {
                self.state.observe(None);
                AdviseNowResponse {
                    advice: None,
                    notified: false,
                }
            }
            TickOutcome::Failed(e) => {
                error!(entry_id = %self.entry_id, error = %e, "❌ Advice evaluation failed");
                AdviseNowResponse {
                    advice: None,
                    notified: false,
                }
            }
        }
    }

    async fn generate_insight(&mut self) -> InsightResponse {
        let snapshot = self.reader.read(&self.entities).await;
        let options = self.options.read().clone();
        let thresholds = match thresholds_from_options(&options) {
            Ok(thresholds) => Some(thresholds),
            Err(e) => {
                warn!(entry_id = %self.entry_id, error = %e, "Insight without recommendation");
                None
            }
        };
        let advice = if self.entities.is_empty() {
            None
        } else {
            thresholds.map(|thresholds| self.stamp(&snapshot, &thresholds))
        };

        let summary = local_summary(&snapshot, advice.as_ref().map(|p| &p.advice));
        self.notify(INSIGHT_TITLE, &summary).await;

        let external = match options.external_agent() {
            Some(agent_id) => {
                let prompt = advisor_prompt(
                    &snapshot,
                    thresholds.as_ref(),
                    advice.as_ref().map(|p| &p.advice),
                );
                self.consult_advisor(agent_id, &options, prompt).await
            }
            None => ExternalOutcome::Disabled,
        };

        InsightResponse {
            summary,
            advice,
            external,
        }
    }

    /// Rate-limited, time-bounded call to the external advisor
    async fn consult_advisor(
        &mut self,
        agent_id: &str,
        options: &EntryOptions,
        prompt: String,
    ) -> ExternalOutcome {
        let advisor = self.collaborators.advisor.clone();
        let agent = agent_id.to_owned();
        let timeout = options.external_call_timeout();
        let now = self.collaborators.clock.now();

        let call = move || async move {
            match tokio::time::timeout(timeout, advisor.run_prompt(&agent, &prompt)).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(AdvisorError::Sink {
                    sink: "advisor",
                    reason: format!("{e:#}"),
                }),
                Err(_) => Err(AdvisorError::Timeout {
                    operation: "external advisor call",
                    timeout_secs: timeout.as_secs(),
                }),
            }
        };

        let outcome = self
            .state
            .gate
            .invoke(&self.entry_id, options.min_minutes_between_calls, now, call)
            .await;

        match outcome {
            GatedCall::Completed(reply) => {
                info!(entry_id = %self.entry_id, agent_id = %agent_id, "🤖 AI insight received");
                self.notify(AI_INSIGHT_TITLE, &reply).await;
                ExternalOutcome::Completed { reply }
            }
            GatedCall::Failed(e) => {
                warn!(entry_id = %self.entry_id, agent_id = %agent_id, error = %e, "AI insight failed");
                let error = e.to_string();
                self.notify(AI_INSIGHT_FAILED_TITLE, &error).await;
                ExternalOutcome::Failed { error }
            }
            GatedCall::RateLimited { retry_after } => {
                let retry_after_minutes = (retry_after + chrono::Duration::seconds(59)).num_minutes();
                info!(
                    entry_id = %self.entry_id,
                    retry_after_minutes,
                    "⏳ AI insight skipped, rate limited"
                );
                ExternalOutcome::RateLimited {
                    retry_after_minutes,
                }
            }
        }
    }

    async fn evaluate_now(&self) -> TickOutcome {
        if self.entities.is_empty() {
            return TickOutcome::NoEntities;
        }

        let snapshot = self.reader.read(&self.entities).await;
        let thresholds = {
            let options = self.options.read();
            thresholds_from_options(&options)
        };
        match thresholds {
            Ok(thresholds) => TickOutcome::Evaluated(self.stamp(&snapshot, &thresholds)),
            Err(e) => TickOutcome::Failed(e),
        }
    }

    fn stamp(&self, snapshot: &Snapshot, thresholds: &Thresholds) -> PublishedAdvice {
        let clock = &self.collaborators.clock;
        let now = clock.now();
        let advice = evaluate(snapshot, thresholds, clock.local_time(now).time());
        debug!(
            entry_id = %self.entry_id,
            code = %advice.code,
            confidence = advice.confidence,
            "Advice evaluated"
        );
        PublishedAdvice {
            advice,
            timestamp: now,
        }
    }

    async fn publish(&mut self, published: &PublishedAdvice) {
        self.state.last_advice = Some(published.clone());
        if let Err(e) = self
            .collaborators
            .publisher
            .publish(&self.entry_id, &self.entry_name, published)
            .await
        {
            warn!(
                entry_id = %self.entry_id,
                publisher = self.collaborators.publisher.name(),
                error = %e,
                "Failed to publish advice"
            );
        }
    }

    /// Send a notification; failures are logged, never propagated
    async fn notify(&self, title: &str, message: &str) -> bool {
        match self.collaborators.notifier.notify(title, message).await {
            Ok(()) => {
                debug!(entry_id = %self.entry_id, title = %title, "🔔 Notification sent");
                true
            }
            Err(e) => {
                let e = AdvisorError::Sink {
                    sink: "notification",
                    reason: format!("{e:#}"),
                };
                warn!(entry_id = %self.entry_id, error = %e, "Failed to send notification");
                false
            }
        }
    }
}
