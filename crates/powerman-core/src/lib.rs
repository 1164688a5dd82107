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

//! PowerMan advisor core
//!
//! Rule-based advice engine, the per-entry polling scheduler with change
//! notification, and the rate gate for external advisor calls. Everything that
//! talks to the outside world is reached through the traits in [`traits`].

pub mod advisor;
pub mod clock;
pub mod commands;
pub mod error;
pub mod insight;
pub mod manager;
pub mod rate_gate;
pub mod scheduler;
pub mod snapshot_reader;
pub mod traits;

pub use advisor::{evaluate, infer_load, is_within_peak, thresholds_from_options};
pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{AdviseNowResponse, Command, CommandResponse, ExternalOutcome, InsightResponse};
pub use error::{AdvisorError, Result};
pub use manager::SubscriptionManager;
pub use rate_gate::{GateDecision, GatedCall, RateLimitedCallGate};
pub use scheduler::{CodeChange, EntryState, ScheduledTick};
pub use snapshot_reader::{SnapshotReader, parse_numeric};
pub use traits::{AdvicePublisher, AdvisorSink, Collaborators, EntityStateSource, NotificationSink};
