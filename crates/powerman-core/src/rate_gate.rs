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

//! Minimum-interval gate for expensive external calls

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    RateLimited { retry_after: Duration },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Outcome of [`RateLimitedCallGate::invoke`]
#[derive(Debug)]
pub enum GatedCall<T, E> {
    RateLimited { retry_after: Duration },
    Completed(T),
    Failed(E),
}

/// Remembers the last successful call per context
///
/// Only successes are recorded, so a failed call never consumes the window.
#[derive(Debug, Default)]
pub struct RateLimitedCallGate {
    last_success: HashMap<String, DateTime<Utc>>,
}

impl RateLimitedCallGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_invoke(
        &self,
        context: &str,
        min_elapsed_minutes: u32,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let Some(last) = self.last_success.get(context) else {
            return GateDecision::Allowed;
        };

        let min_elapsed = Duration::minutes(i64::from(min_elapsed_minutes));
        let elapsed = now - *last;
        if elapsed < min_elapsed {
            let retry_after = min_elapsed - elapsed;
            debug!(
                context = %context,
                retry_after_minutes = retry_after.num_minutes(),
                "⏳ External call rate limited"
            );
            GateDecision::RateLimited { retry_after }
        } else {
            GateDecision::Allowed
        }
    }

    pub fn record_success(&mut self, context: &str, now: DateTime<Utc>) {
        self.last_success.insert(context.to_owned(), now);
    }

    pub fn last_success(&self, context: &str) -> Option<DateTime<Utc>> {
        self.last_success.get(context).copied()
    }

    /// Consult the gate, run `call` if allowed and record only a success
    pub async fn invoke<T, E, F, Fut>(
        &mut self,
        context: &str,
        min_elapsed_minutes: u32,
        now: DateTime<Utc>,
        call: F,
    ) -> GatedCall<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let GateDecision::RateLimited { retry_after } =
            self.try_invoke(context, min_elapsed_minutes, now)
        {
            return GatedCall::RateLimited { retry_after };
        }

        match call().await {
            Ok(value) => {
                self.record_success(context, now);
                GatedCall::Completed(value)
            }
            Err(e) => GatedCall::Failed(e),
        }
    }
}
