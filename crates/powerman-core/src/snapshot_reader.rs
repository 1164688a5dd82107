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

use powerman_types::{EntityMapping, Snapshot, SnapshotField};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::traits::EntityStateSource;

/// Builds a [`Snapshot`] from whatever the state source can provide
///
/// Never fails: an unmapped, unavailable or non-numeric entity becomes an
/// absent field.
#[derive(Clone)]
pub struct SnapshotReader {
    source: Arc<dyn EntityStateSource>,
}

impl fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("source", &self.source.name())
            .finish()
    }
}

impl SnapshotReader {
    pub fn new(source: Arc<dyn EntityStateSource>) -> Self {
        Self { source }
    }

    pub async fn read(&self, mapping: &EntityMapping) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (field, entity_id) in mapping.mapped() {
            snapshot.set(field, self.read_value(field, entity_id).await);
        }

        // Keep the reader a suspension point even when nothing is mapped
        tokio::task::yield_now().await;

        trace!(
            known = snapshot.known().count(),
            "📸 Snapshot read from {}",
            self.source.name()
        );
        snapshot
    }

    /// Read and parse a single entity
    pub async fn read_value(&self, field: SnapshotField, entity_id: &str) -> Option<f64> {
        match self.source.raw_state(entity_id).await {
            Ok(raw) => {
                let value = parse_numeric(&raw);
                if value.is_none() {
                    debug!(
                        entity_id = %entity_id,
                        state = %raw,
                        "{} is not numeric, treating as absent",
                        field.label()
                    );
                }
                value
            }
            Err(e) => {
                debug!(
                    entity_id = %entity_id,
                    error = %e,
                    "Failed to read {}, treating as absent",
                    field.label()
                );
                None
            }
        }
    }
}

/// Parse an entity state as a finite real number
///
/// `unknown`, `unavailable`, empty strings, NaN and infinities are absent.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.eq_ignore_ascii_case("unavailable")
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}
