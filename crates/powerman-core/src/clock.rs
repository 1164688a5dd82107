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

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::fmt::Debug;
use tracing::warn;

/// Wall clock used for the peak window and the rate gate
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Local wall-clock time the peak window is expressed in
    fn local_time(&self, at: DateTime<Utc>) -> NaiveDateTime;
}

/// System clock in a fixed IANA timezone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Parse a timezone name, falling back to UTC if it is unknown
    pub fn from_name(name: Option<&str>) -> Self {
        let timezone = match name {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!("⚠️ Unknown timezone '{}', using UTC", name);
                Tz::UTC
            }),
            None => Tz::UTC,
        };
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_time(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.timezone).naive_local()
    }
}

/// Manually driven clock, local time equals UTC
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn local_time(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc()
    }
}
