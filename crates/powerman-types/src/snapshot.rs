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

/// Logical inputs the advisor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    BatteryPct,
    SolarW,
    SolarKwhToday,
    LoadW,
    ImportW,
    ExportW,
    PriceNow,
    PriceNext,
    SolarKwhRemainingToday,
}

impl SnapshotField {
    pub fn all() -> &'static [SnapshotField] {
        &[
            Self::BatteryPct,
            Self::SolarW,
            Self::SolarKwhToday,
            Self::LoadW,
            Self::ImportW,
            Self::ExportW,
            Self::PriceNow,
            Self::PriceNext,
            Self::SolarKwhRemainingToday,
        ]
    }

    /// Label used in summaries and prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::BatteryPct => "Battery",
            Self::SolarW => "Solar power",
            Self::SolarKwhToday => "Solar today",
            Self::LoadW => "House load",
            Self::ImportW => "Grid import",
            Self::ExportW => "Grid export",
            Self::PriceNow => "Price now",
            Self::PriceNext => "Price next hour",
            Self::SolarKwhRemainingToday => "Solar remaining today",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::BatteryPct => "%",
            Self::SolarW | Self::LoadW | Self::ImportW | Self::ExportW => "W",
            Self::SolarKwhToday | Self::SolarKwhRemainingToday => "kWh",
            Self::PriceNow | Self::PriceNext => "",
        }
    }
}

/// One sampling of every configured input. Any reading may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub battery_pct: Option<f64>,
    pub solar_w: Option<f64>,
    pub solar_kwh_today: Option<f64>,
    pub load_w: Option<f64>,
    pub import_w: Option<f64>,
    pub export_w: Option<f64>,
    pub price_now: Option<f64>,
    pub price_next: Option<f64>,
    pub solar_kwh_remaining_today: Option<f64>,
}

impl Snapshot {
    pub fn get(&self, field: SnapshotField) -> Option<f64> {
        match field {
            SnapshotField::BatteryPct => self.battery_pct,
            SnapshotField::SolarW => self.solar_w,
            SnapshotField::SolarKwhToday => self.solar_kwh_today,
            SnapshotField::LoadW => self.load_w,
            SnapshotField::ImportW => self.import_w,
            SnapshotField::ExportW => self.export_w,
            SnapshotField::PriceNow => self.price_now,
            SnapshotField::PriceNext => self.price_next,
            SnapshotField::SolarKwhRemainingToday => self.solar_kwh_remaining_today,
        }
    }

    pub fn set(&mut self, field: SnapshotField, value: Option<f64>) {
        let slot = match field {
            SnapshotField::BatteryPct => &mut self.battery_pct,
            SnapshotField::SolarW => &mut self.solar_w,
            SnapshotField::SolarKwhToday => &mut self.solar_kwh_today,
            SnapshotField::LoadW => &mut self.load_w,
            SnapshotField::ImportW => &mut self.import_w,
            SnapshotField::ExportW => &mut self.export_w,
            SnapshotField::PriceNow => &mut self.price_now,
            SnapshotField::PriceNext => &mut self.price_next,
            SnapshotField::SolarKwhRemainingToday => &mut self.solar_kwh_remaining_today,
        };
        *slot = value;
    }

    /// Known readings in declaration order
    pub fn known(&self) -> impl Iterator<Item = (SnapshotField, f64)> + '_ {
        SnapshotField::all()
            .iter()
            .filter_map(|field| self.get(*field).map(|value| (*field, value)))
    }
}
