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

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::snapshot::SnapshotField;
use crate::validation::ValidationResult;

/// Parse a local time of day written as `HH:MM` or `HH:MM:SS`
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Source entity for each logical input. Unmapped inputs stay absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    #[serde(default, alias = "battery_entity")]
    pub battery: Option<String>,

    #[serde(default, alias = "solar_power_entity")]
    pub solar_power: Option<String>,

    #[serde(default, alias = "solar_energy_today_entity")]
    pub solar_energy_today: Option<String>,

    #[serde(default, alias = "load_entity")]
    pub load: Option<String>,

    #[serde(default, alias = "grid_import_entity")]
    pub grid_import: Option<String>,

    #[serde(default, alias = "grid_export_entity")]
    pub grid_export: Option<String>,

    #[serde(default, alias = "price_now_entity")]
    pub price_now: Option<String>,

    #[serde(default, alias = "price_next_entity")]
    pub price_next: Option<String>,

    #[serde(default, alias = "solar_remaining_entity")]
    pub solar_remaining: Option<String>,
}

impl EntityMapping {
    /// Entity mapped to a field; blank ids count as unmapped
    pub fn entity_for(&self, field: SnapshotField) -> Option<&str> {
        let entity = match field {
            SnapshotField::BatteryPct => &self.battery,
            SnapshotField::SolarW => &self.solar_power,
            SnapshotField::SolarKwhToday => &self.solar_energy_today,
            SnapshotField::LoadW => &self.load,
            SnapshotField::ImportW => &self.grid_import,
            SnapshotField::ExportW => &self.grid_export,
            SnapshotField::PriceNow => &self.price_now,
            SnapshotField::PriceNext => &self.price_next,
            SnapshotField::SolarKwhRemainingToday => &self.solar_remaining,
        };
        entity.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn mapped(&self) -> impl Iterator<Item = (SnapshotField, &str)> + '_ {
        SnapshotField::all()
            .iter()
            .filter_map(|field| self.entity_for(*field).map(|entity| (*field, entity)))
    }

    pub fn is_empty(&self) -> bool {
        self.mapped().next().is_none()
    }
}

fn default_reserve_soc() -> u8 {
    30
}

fn default_target_soc() -> u8 {
    80
}

fn default_cheap_price() -> f64 {
    0.15
}

fn default_high_price() -> f64 {
    0.30
}

fn default_peak_start() -> String {
    "17:00".to_owned()
}

fn default_peak_end() -> String {
    "21:00".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_advisor_interval_minutes() -> u32 {
    10
}

fn default_min_minutes_between_calls() -> u32 {
    180
}

fn default_external_call_timeout_secs() -> u64 {
    60
}

/// Runtime-adjustable options of one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Battery level below which grid charging is considered (percent)
    #[serde(default = "default_reserve_soc")]
    pub reserve_soc: u8,

    /// Battery level considered "full enough" (percent)
    #[serde(default = "default_target_soc")]
    pub target_soc: u8,

    #[serde(default = "default_cheap_price")]
    pub cheap_price: f64,

    #[serde(default = "default_high_price")]
    pub high_price: f64,

    /// Local peak window start, `HH:MM`
    #[serde(default = "default_peak_start")]
    pub peak_start: String,

    /// Local peak window end (exclusive), `HH:MM`
    #[serde(default = "default_peak_end")]
    pub peak_end: String,

    #[serde(default = "default_true")]
    pub ev_enabled: bool,

    #[serde(default = "default_true")]
    pub notify_on_change: bool,

    #[serde(default = "default_advisor_interval_minutes")]
    pub advisor_interval_minutes: u32,

    /// Conversation agent used for AI insights, empty disables them
    #[serde(default)]
    pub agent_id: String,

    #[serde(default = "default_min_minutes_between_calls")]
    pub min_minutes_between_calls: u32,

    #[serde(default = "default_external_call_timeout_secs")]
    pub external_call_timeout_secs: u64,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            reserve_soc: default_reserve_soc(),
            target_soc: default_target_soc(),
            cheap_price: default_cheap_price(),
            high_price: default_high_price(),
            peak_start: default_peak_start(),
            peak_end: default_peak_end(),
            ev_enabled: true,
            notify_on_change: true,
            advisor_interval_minutes: default_advisor_interval_minutes(),
            agent_id: String::new(),
            min_minutes_between_calls: default_min_minutes_between_calls(),
            external_call_timeout_secs: default_external_call_timeout_secs(),
        }
    }
}

impl EntryOptions {
    /// Delay between two scheduled ticks, never shorter than one minute
    pub fn advisor_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.advisor_interval_minutes.max(1)) * 60)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }

    /// Configured conversation agent, if AI insights are enabled
    pub fn external_agent(&self) -> Option<&str> {
        Some(self.agent_id.trim()).filter(|id| !id.is_empty())
    }

    /// Check option values. `prefix` is prepended to every field path.
    pub fn validate(&self, prefix: &str) -> ValidationResult {
        let mut result = ValidationResult::success();
        let field = |name: &str| format!("{prefix}{name}");

        if self.reserve_soc > 100 {
            result.add_error(field("reserve_soc"), "Must be between 0 and 100");
        }
        if self.target_soc > 100 {
            result.add_error(field("target_soc"), "Must be between 0 and 100");
        }
        if self.reserve_soc >= self.target_soc {
            result.add_warning(
                field("reserve_soc"),
                format!(
                    "Reserve SOC ({}%) is not below target SOC ({}%)",
                    self.reserve_soc, self.target_soc
                ),
            );
        }
        if self.cheap_price >= self.high_price {
            result.add_warning(
                field("cheap_price"),
                format!(
                    "Cheap price {:.2} is not below high price {:.2}",
                    self.cheap_price, self.high_price
                ),
            );
        }
        if parse_time_of_day(&self.peak_start).is_none() {
            result.add_error(
                field("peak_start"),
                format!("'{}' is not a valid HH:MM time", self.peak_start),
            );
        }
        if parse_time_of_day(&self.peak_end).is_none() {
            result.add_error(
                field("peak_end"),
                format!("'{}' is not a valid HH:MM time", self.peak_end),
            );
        }
        if self.advisor_interval_minutes == 0 {
            result.add_error(field("advisor_interval_minutes"), "Must be at least 1 minute");
        }
        if self.external_agent().is_some() && self.external_call_timeout_secs == 0 {
            result.add_error(field("external_call_timeout_secs"), "Must be at least 1 second");
        }

        result
    }
}

/// Decision thresholds handed to the advice engine for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub reserve_soc: u8,
    pub target_soc: u8,
    pub cheap_price: f64,
    pub high_price: f64,
    pub peak_start: NaiveTime,
    pub peak_end: NaiveTime,
    pub ev_enabled: bool,
}

/// One configured PowerMan instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Unique id, also used in entity ids and API paths
    pub id: String,

    #[serde(default = "default_entry_name")]
    pub name: String,

    #[serde(default)]
    pub entities: EntityMapping,

    #[serde(default)]
    pub options: EntryOptions,
}

fn default_entry_name() -> String {
    "PowerMan".to_owned()
}
