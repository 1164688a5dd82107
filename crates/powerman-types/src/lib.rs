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

pub mod advice;
pub mod config;
pub mod snapshot;
pub mod validation;

pub use advice::{Advice, AdviceCode, PublishedAdvice};
pub use config::{EntityMapping, EntryConfig, EntryOptions, Thresholds, parse_time_of_day};
pub use snapshot::{Snapshot, SnapshotField};
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
