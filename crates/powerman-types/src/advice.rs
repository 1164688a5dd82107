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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recommendation codes the advisor can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceCode {
    /// Nothing worth doing right now
    DoNothingNormalDay,
    /// Import from the grid into the battery
    ChargeBatteryFromGridNow,
    /// Soak up exported solar with the EV
    PlugInEvNow,
}

impl AdviceCode {
    /// Stable identifier used as the published state value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoNothingNormalDay => "do_nothing_normal_day",
            Self::ChargeBatteryFromGridNow => "charge_battery_from_grid_now",
            Self::PlugInEvNow => "plug_in_ev_now",
        }
    }

    pub fn all() -> &'static [AdviceCode] {
        &[
            Self::DoNothingNormalDay,
            Self::ChargeBatteryFromGridNow,
            Self::PlugInEvNow,
        ]
    }
}

impl fmt::Display for AdviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdviceCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("Unknown advice code: '{s}'"))
    }
}

/// A single recommendation produced by the advice engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub code: AdviceCode,

    /// Short human-readable headline
    pub title: String,

    /// Confidence in [0, 1], rounded to two decimals
    pub confidence: f64,

    /// Ordered justification, never empty
    pub reasons: Vec<String>,

    /// When the advice should be looked at again
    pub next_review_minutes: u32,
}

impl Advice {
    /// Reasons rendered as a bullet list for notifications
    pub fn formatted_reasons(&self) -> String {
        self.reasons
            .iter()
            .map(|reason| format!("• {reason}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Advice as exposed to the outside world, stamped with the tick that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedAdvice {
    #[serde(flatten)]
    pub advice: Advice,
    pub timestamp: DateTime<Utc>,
}
