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

//! Externally triggerable actions and their typed responses

use powerman_types::PublishedAdvice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AdvisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Force a tick and always notify
    AdviseNow,
    /// Local summary plus an optional rate-limited external advisor call
    GenerateInsight,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdviseNow => "advise_now",
            Self::GenerateInsight => "generate_insight",
        }
    }

    pub fn all() -> &'static [Command] {
        &[Self::AdviseNow, Self::GenerateInsight]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| AdvisorError::UnknownCommand(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResponse {
    AdviseNow(AdviseNowResponse),
    GenerateInsight(InsightResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviseNowResponse {
    /// Absent when no entity is mapped or the options are invalid
    pub advice: Option<PublishedAdvice>,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub summary: String,
    pub advice: Option<PublishedAdvice>,
    pub external: ExternalOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExternalOutcome {
    /// No agent configured
    Disabled,
    RateLimited { retry_after_minutes: i64 },
    Completed { reply: String },
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        for command in Command::all() {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), *command);
        }
    }

    #[test]
    fn test_unknown_command() {
        let err = "reboot_inverter".parse::<Command>().unwrap_err();
        assert!(matches!(err, AdvisorError::UnknownCommand(ref name) if name == "reboot_inverter"));
    }

    #[test]
    fn test_external_outcome_serialization() {
        let json = serde_json::to_value(ExternalOutcome::RateLimited {
            retry_after_minutes: 170,
        })
        .unwrap();
        assert_eq!(json["status"], "rate_limited");
        assert_eq!(json["retry_after_minutes"], 170);
    }
}
