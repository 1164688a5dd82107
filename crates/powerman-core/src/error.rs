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

//! Error types for the advisor core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("invalid peak window: {field} = '{value}' is not a valid HH:MM time")]
    InvalidPeakWindow { field: &'static str, value: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unknown entry: {0}")]
    UnknownEntry(String),

    #[error("entry already running: {0}")]
    AlreadyRunning(String),

    #[error("subscription {0} is no longer running")]
    SubscriptionClosed(String),

    #[error("{sink} failed: {reason}")]
    Sink { sink: &'static str, reason: String },

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
