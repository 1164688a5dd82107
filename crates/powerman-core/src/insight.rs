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

//! Text for insight notifications and the external advisor prompt

use powerman_types::{Advice, Snapshot, SnapshotField, Thresholds};
use std::fmt::Write;

pub const INSIGHT_TITLE: &str = "PowerMan insight";
pub const AI_INSIGHT_TITLE: &str = "PowerMan AI insight";
pub const AI_INSIGHT_FAILED_TITLE: &str = "PowerMan AI insight failed";

fn format_reading(field: SnapshotField, value: f64) -> String {
    let precision = match field {
        SnapshotField::BatteryPct
        | SnapshotField::SolarW
        | SnapshotField::LoadW
        | SnapshotField::ImportW
        | SnapshotField::ExportW => 0,
        SnapshotField::SolarKwhToday | SnapshotField::SolarKwhRemainingToday => 1,
        SnapshotField::PriceNow | SnapshotField::PriceNext => 2,
    };
    let unit = field.unit();
    if unit.is_empty() {
        format!("{}: {value:.precision$}", field.label())
    } else if unit == "%" {
        format!("{}: {value:.precision$}%", field.label())
    } else {
        format!("{}: {value:.precision$} {unit}", field.label())
    }
}

/// Local summary listing every known reading and the current recommendation
pub fn local_summary(snapshot: &Snapshot, advice: Option<&Advice>) -> String {
    let mut out = String::new();

    if snapshot.known().next().is_none() {
        out.push_str("No readings available\n");
    }
    for (field, value) in snapshot.known() {
        let _ = writeln!(out, "• {}", format_reading(field, value));
    }

    match advice {
        Some(advice) => {
            let _ = write!(
                out,
                "\nRecommendation: {} ({:.0}% confidence)\n{}",
                advice.title,
                advice.confidence * 100.0,
                advice.formatted_reasons()
            );
        }
        None => out.push_str("\nRecommendation: unavailable"),
    }

    out
}

/// Prompt sent to the external conversation agent
pub fn advisor_prompt(
    snapshot: &Snapshot,
    thresholds: Option<&Thresholds>,
    advice: Option<&Advice>,
) -> String {
    let mut prompt = String::from(
        "You are a home energy advisor. Current readings from the house:\n",
    );

    if snapshot.known().next().is_none() {
        prompt.push_str("- no readings available\n");
    }
    for (field, value) in snapshot.known() {
        let _ = writeln!(prompt, "- {}", format_reading(field, value));
    }

    if let Some(t) = thresholds {
        let _ = writeln!(
            prompt,
            "\nSettings: battery reserve {}%, battery target {}%, cheap price {:.2}, high price {:.2}, peak {}-{}, EV charging {}",
            t.reserve_soc,
            t.target_soc,
            t.cheap_price,
            t.high_price,
            t.peak_start.format("%H:%M"),
            t.peak_end.format("%H:%M"),
            if t.ev_enabled { "enabled" } else { "disabled" },
        );
    }

    if let Some(advice) = advice {
        let _ = writeln!(
            prompt,
            "\nRule-based recommendation: {} ({})\nReasons: {}",
            advice.title,
            advice.code,
            advice.reasons.join("; ")
        );
    }

    prompt.push_str(
        "\nGive one short, actionable recommendation for the next hour in at most three sentences.",
    );
    prompt
}
