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

//! Rule-based advice engine
//!
//! Maps one [`Snapshot`] plus [`Thresholds`] to a single [`Advice`]. The rules
//! run in a fixed priority order and later rules may overwrite earlier ones.
//! Some rules replace the reasons list, others append to it; that distinction
//! is part of the output contract.

use chrono::NaiveTime;
use powerman_types::{Advice, AdviceCode, EntryOptions, Snapshot, Thresholds, parse_time_of_day};
use tracing::debug;

use crate::error::{AdvisorError, Result};

/// Minutes until the advice should be re-evaluated
pub const NEXT_REVIEW_MINUTES: u32 = 10;

/// Export above which excess solar is worth diverting to an EV (W)
pub const EV_EXPORT_THRESHOLD_W: f64 = 500.0;

/// Remaining solar below which the day is considered spent (kWh)
pub const LOW_REMAINING_SOLAR_KWH: f64 = 1.0;

/// Build engine thresholds from entry options
pub fn thresholds_from_options(options: &EntryOptions) -> Result<Thresholds> {
    let peak_start =
        parse_time_of_day(&options.peak_start).ok_or_else(|| AdvisorError::InvalidPeakWindow {
            field: "peak_start",
            value: options.peak_start.clone(),
        })?;
    let peak_end =
        parse_time_of_day(&options.peak_end).ok_or_else(|| AdvisorError::InvalidPeakWindow {
            field: "peak_end",
            value: options.peak_end.clone(),
        })?;

    Ok(Thresholds {
        reserve_soc: options.reserve_soc,
        target_soc: options.target_soc,
        cheap_price: options.cheap_price,
        high_price: options.high_price,
        peak_start,
        peak_end,
        ev_enabled: options.ev_enabled,
    })
}

/// Whether `now` falls in the half-open window `[start, end)`
///
/// `start == end` means the whole day is peak. `start > end` wraps past midnight.
pub fn is_within_peak(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// House load derived from the power balance when no load sensor is mapped
pub fn infer_load(snapshot: &Snapshot) -> Option<f64> {
    if let Some(load) = snapshot.load_w {
        return Some(load);
    }
    match (snapshot.solar_w, snapshot.import_w, snapshot.export_w) {
        (Some(solar), Some(import), Some(export)) => Some((solar - export + import).max(0.0)),
        _ => None,
    }
}

/// Evaluate every rule against one snapshot
pub fn evaluate(snapshot: &Snapshot, thresholds: &Thresholds, now: NaiveTime) -> Advice {
    let load = infer_load(snapshot);
    if snapshot.load_w.is_none() && load.is_some() {
        debug!("Inferred house load {:?} W from power balance", load);
    }

    let peak = is_within_peak(now, thresholds.peak_start, thresholds.peak_end);
    let reserve = f64::from(thresholds.reserve_soc);
    let target = f64::from(thresholds.target_soc);

    let mut code = AdviceCode::DoNothingNormalDay;
    let mut title = "Normal day — no action suggested";
    let mut confidence = 0.5;
    let mut reasons = vec!["No clear economic or energy constraint detected".to_owned()];

    // Below reserve: charge if cheap, or if the peak has not started yet
    if let Some(battery) = snapshot.battery_pct
        && battery < reserve
    {
        reasons = vec![format!(
            "Battery below reserve ({battery:.0}% < {}%)",
            thresholds.reserve_soc
        )];
        if snapshot
            .price_now
            .is_some_and(|price| price <= thresholds.cheap_price)
        {
            code = AdviceCode::ChargeBatteryFromGridNow;
            title = "Charge battery now (cheap price, below reserve)";
            confidence = 0.85;
        } else if !peak {
            code = AdviceCode::ChargeBatteryFromGridNow;
            title = "Charge battery now to reach reserve before peak";
            confidence = 0.7;
        }
    }

    // Full battery and exporting: send the surplus to the EV
    if thresholds.ev_enabled
        && let (Some(battery), Some(export)) = (snapshot.battery_pct, snapshot.export_w)
        && battery >= target
        && export > EV_EXPORT_THRESHOLD_W
    {
        code = AdviceCode::PlugInEvNow;
        title = "Excess solar — plug in EV";
        confidence = 0.8;
        reasons = vec![
            format!(
                "Battery at/above target ({battery:.0}% ≥ {}%)",
                thresholds.target_soc
            ),
            format!("Exporting {export:.0} W"),
        ];
    }

    // Never charge into a high price; keep the reasons that led here
    if let Some(price) = snapshot.price_now
        && price >= thresholds.high_price
        && code == AdviceCode::ChargeBatteryFromGridNow
    {
        code = AdviceCode::DoNothingNormalDay;
        title = "Hold — price is high";
        confidence = 0.6;
        reasons.push(format!(
            "Current price {price:.2} ≥ high threshold {:.2}",
            thresholds.high_price
        ));
    }

    // Little solar left before the peak: top up towards target.
    // Runs after the veto and may re-enable charging.
    if let (Some(remaining), Some(battery)) =
        (snapshot.solar_kwh_remaining_today, snapshot.battery_pct)
        && remaining < LOW_REMAINING_SOLAR_KWH
        && battery < target
        && !peak
    {
        code = AdviceCode::ChargeBatteryFromGridNow;
        title = "Low remaining solar — charge to reach target";
        confidence = f64::max(confidence, 0.75);
        reasons.push(format!("Low solar left today ({remaining:.1} kWh)"));
    }

    Advice {
        code,
        title: title.to_owned(),
        confidence: round_confidence(confidence),
        reasons,
        next_review_minutes: NEXT_REVIEW_MINUTES,
    }
}

fn round_confidence(confidence: f64) -> f64 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            reserve_soc: 30,
            target_soc: 80,
            cheap_price: 0.15,
            high_price: 0.30,
            peak_start: time(17, 0),
            peak_end: time(21, 0),
            ev_enabled: true,
        }
    }

    const MORNING: (u32, u32) = (9, 0);
    const EVENING_PEAK: (u32, u32) = (18, 0);

    fn at(t: (u32, u32)) -> NaiveTime {
        time(t.0, t.1)
    }

    #[test]
    fn test_default_advice_without_data() {
        let advice = evaluate(&Snapshot::default(), &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::DoNothingNormalDay);
        assert_eq!(advice.title, "Normal day — no action suggested");
        assert!((advice.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(
            advice.reasons,
            vec!["No clear economic or energy constraint detected"]
        );
        assert_eq!(advice.next_review_minutes, NEXT_REVIEW_MINUTES);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            solar_w: Some(1200.0),
            import_w: Some(300.0),
            export_w: Some(0.0),
            price_now: Some(0.35),
            solar_kwh_remaining_today: Some(0.4),
            ..Default::default()
        };

        for t in [at(MORNING), at(EVENING_PEAK), time(23, 59)] {
            assert_eq!(
                evaluate(&snapshot, &thresholds(), t),
                evaluate(&snapshot, &thresholds(), t)
            );
        }
    }

    #[test]
    fn test_reserve_with_cheap_price_charges() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: Some(0.10),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(EVENING_PEAK));

        assert_eq!(advice.code, AdviceCode::ChargeBatteryFromGridNow);
        assert!((advice.confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(advice.title, "Charge battery now (cheap price, below reserve)");
        assert_eq!(advice.reasons, vec!["Battery below reserve (25% < 30%)"]);
    }

    #[test]
    fn test_reserve_outside_peak_charges_without_price() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::ChargeBatteryFromGridNow);
        assert!((advice.confidence - 0.7).abs() < f64::EPSILON);
        assert_eq!(advice.title, "Charge battery now to reach reserve before peak");
    }

    #[test]
    fn test_reserve_in_peak_with_unknown_price_keeps_default_code() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: None,
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(EVENING_PEAK));

        assert_eq!(advice.code, AdviceCode::DoNothingNormalDay);
        assert!((advice.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(advice.reasons, vec!["Battery below reserve (25% < 30%)"]);
    }

    #[test]
    fn test_ev_override() {
        let snapshot = Snapshot {
            battery_pct: Some(85.0),
            export_w: Some(600.0),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::PlugInEvNow);
        assert!((advice.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(
            advice.reasons,
            vec!["Battery at/above target (85% ≥ 80%)", "Exporting 600 W"]
        );
    }

    #[test]
    fn test_ev_override_requires_flag_and_export_above_limit() {
        let snapshot = Snapshot {
            battery_pct: Some(85.0),
            export_w: Some(500.0),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&snapshot, &thresholds(), at(MORNING)).code,
            AdviceCode::DoNothingNormalDay
        );

        let snapshot = Snapshot {
            export_w: Some(2500.0),
            ..snapshot
        };
        let disabled = Thresholds {
            ev_enabled: false,
            ..thresholds()
        };
        assert_eq!(
            evaluate(&snapshot, &disabled, at(MORNING)).code,
            AdviceCode::DoNothingNormalDay
        );
    }

    #[test]
    fn test_ev_override_beats_reserve_branch() {
        // Reserve above target is a misconfiguration, but both rules can fire
        let thresholds = Thresholds {
            reserve_soc: 90,
            ..thresholds()
        };
        let snapshot = Snapshot {
            battery_pct: Some(85.0),
            export_w: Some(600.0),
            price_now: Some(0.10),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds, at(MORNING));

        assert_eq!(advice.code, AdviceCode::PlugInEvNow);
        assert_eq!(advice.reasons.len(), 2);
        assert!(!advice.reasons[0].contains("reserve"));
    }

    #[test]
    fn test_high_price_veto_appends_reason() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: Some(0.35),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::DoNothingNormalDay);
        assert_eq!(advice.title, "Hold — price is high");
        assert!((advice.confidence - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            advice.reasons,
            vec![
                "Battery below reserve (25% < 30%)",
                "Current price 0.35 ≥ high threshold 0.30",
            ]
        );
    }

    #[test]
    fn test_high_price_veto_fires_after_cheap_branch() {
        // cheap >= high is a misconfiguration; the veto still wins
        let thresholds = Thresholds {
            cheap_price: 0.40,
            ..thresholds()
        };
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: Some(0.35),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds, at(EVENING_PEAK));

        assert_eq!(advice.code, AdviceCode::DoNothingNormalDay);
        assert_eq!(advice.reasons.len(), 2);
    }

    #[test]
    fn test_high_price_without_charge_changes_nothing() {
        let snapshot = Snapshot {
            battery_pct: Some(60.0),
            price_now: Some(0.50),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.title, "Normal day — no action suggested");
        assert_eq!(advice.reasons.len(), 1);
    }

    #[test]
    fn test_low_remaining_solar_charges_towards_target() {
        let snapshot = Snapshot {
            battery_pct: Some(50.0),
            solar_kwh_remaining_today: Some(0.4),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::ChargeBatteryFromGridNow);
        assert!((advice.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(
            advice.reasons,
            vec![
                "No clear economic or energy constraint detected",
                "Low solar left today (0.4 kWh)",
            ]
        );
    }

    #[test]
    fn test_low_remaining_solar_re_enables_charge_after_veto() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: Some(0.35),
            solar_kwh_remaining_today: Some(0.2),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::ChargeBatteryFromGridNow);
        assert!((advice.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(advice.reasons.len(), 3);
        assert!(advice.reasons[1].starts_with("Current price"));
        assert!(advice.reasons[2].starts_with("Low solar left today"));
    }

    #[test]
    fn test_low_remaining_solar_keeps_higher_confidence() {
        let snapshot = Snapshot {
            battery_pct: Some(25.0),
            price_now: Some(0.10),
            solar_kwh_remaining_today: Some(0.2),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(MORNING));

        assert_eq!(advice.code, AdviceCode::ChargeBatteryFromGridNow);
        assert!((advice.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_low_remaining_solar_ignored_during_peak() {
        let snapshot = Snapshot {
            battery_pct: Some(50.0),
            solar_kwh_remaining_today: Some(0.4),
            ..Default::default()
        };

        let advice = evaluate(&snapshot, &thresholds(), at(EVENING_PEAK));

        assert_eq!(advice.code, AdviceCode::DoNothingNormalDay);
    }

    #[test]
    fn test_peak_window_regular() {
        let (start, end) = (time(17, 0), time(21, 0));
        assert!(is_within_peak(time(17, 0), start, end));
        assert!(is_within_peak(time(20, 59), start, end));
        assert!(!is_within_peak(time(21, 0), start, end));
        assert!(!is_within_peak(time(9, 0), start, end));
    }

    #[test]
    fn test_peak_window_wraps_midnight() {
        let (start, end) = (time(22, 0), time(6, 0));
        assert!(is_within_peak(time(23, 30), start, end));
        assert!(is_within_peak(time(2, 0), start, end));
        assert!(!is_within_peak(time(12, 0), start, end));
        assert!(!is_within_peak(time(6, 0), start, end));
    }

    #[test]
    fn test_peak_window_equal_bounds_is_always_active() {
        let bound = time(9, 0);
        for t in [time(0, 0), time(9, 0), time(12, 0), time(23, 59)] {
            assert!(is_within_peak(t, bound, bound));
        }
    }

    #[test]
    fn test_infer_load() {
        let snapshot = Snapshot {
            solar_w: Some(2000.0),
            import_w: Some(100.0),
            export_w: Some(600.0),
            ..Default::default()
        };
        assert_eq!(infer_load(&snapshot), Some(1500.0));

        let exporting_more = Snapshot {
            export_w: Some(3000.0),
            ..snapshot
        };
        assert_eq!(infer_load(&exporting_more), Some(0.0));

        let measured = Snapshot {
            load_w: Some(420.0),
            ..snapshot
        };
        assert_eq!(infer_load(&measured), Some(420.0));

        let partial = Snapshot {
            export_w: None,
            ..snapshot
        };
        assert_eq!(infer_load(&partial), None);
    }

    #[test]
    fn test_thresholds_from_options() {
        let options = EntryOptions {
            peak_start: "22:00".to_owned(),
            peak_end: "06:00".to_owned(),
            ..Default::default()
        };
        let thresholds = thresholds_from_options(&options).unwrap();
        assert_eq!(thresholds.peak_start, time(22, 0));
        assert_eq!(thresholds.peak_end, time(6, 0));
        assert_eq!(thresholds.reserve_soc, 30);

        let broken = EntryOptions {
            peak_end: "late".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            thresholds_from_options(&broken),
            Err(AdvisorError::InvalidPeakWindow {
                field: "peak_end",
                ..
            })
        ));
    }
}
