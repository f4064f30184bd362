//! Alias-aware "already processed" tracking.

use std::sync::Arc;

use crate::SyncError;
use crate::clock::Clock;
use crate::fields::{self, ID_FIELDS, PRESENCE_FIELDS};
use crate::store::DedupRepository;
use sojourn_types::{DedupRecord, Presence, RawReservation};

/// Why a raw record will not be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Check-in or check-out date missing or unparseable.
    MissingDates,
    /// No id-bearing field at all.
    NoIdentifier,
    /// Processed before and not eligible as a status update.
    Duplicate,
}

impl SkipReason {
    /// Short label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingDates => "missing dates",
            Self::NoIdentifier => "no identifier",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Result of [`DedupStore::should_process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessDecision {
    /// Never seen before.
    New,
    /// Seen before; presence moved to a new status-change value.
    StatusUpdate {
        /// Presence recorded at the previous dispatch.
        previous: Presence,
        /// Presence on the incoming record.
        current: Presence,
    },
    /// Do nothing.
    Skip(SkipReason),
}

/// Alias-keyed dedup over a [`DedupRepository`].
///
/// A reservation is "processed" when any of its alias ids is recorded, and
/// marking writes every alias so later lookups through any of them agree.
#[derive(Clone)]
pub struct DedupStore {
    repo: Arc<dyn DedupRepository>,
    clock: Arc<dyn Clock>,
    allow_status_updates: bool,
}

impl DedupStore {
    /// Wrap a repository.
    #[must_use]
    pub fn new(
        repo: Arc<dyn DedupRepository>,
        clock: Arc<dyn Clock>,
        allow_status_updates: bool,
    ) -> Self {
        Self {
            repo,
            clock,
            allow_status_updates,
        }
    }

    /// Every id-like value on the record, in field priority order, without duplicates.
    #[must_use]
    pub fn collect_alias_ids(raw: &RawReservation) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for key in ID_FIELDS {
            let Some(v) = raw.get_ci(key).and_then(fields::scalar_string) else {
                continue;
            };
            if v == "0" || v.eq_ignore_ascii_case("null") {
                continue;
            }
            if !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }

    /// Record stored under the first known alias, if any.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn find_record(&self, aliases: &[String]) -> Result<Option<DedupRecord>, SyncError> {
        for alias in aliases {
            if let Some(rec) = self.repo.get(alias).await? {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    /// Whether any alias has been processed.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn is_processed(&self, aliases: &[String]) -> Result<bool, SyncError> {
        Ok(self.find_record(aliases).await?.is_some())
    }

    /// First alias of `raw` already recorded.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn find_processed_alias(
        &self,
        raw: &RawReservation,
    ) -> Result<Option<String>, SyncError> {
        for alias in Self::collect_alias_ids(raw) {
            if self.repo.get(&alias).await?.is_some() {
                return Ok(Some(alias));
            }
        }
        Ok(None)
    }

    /// Record every alias as processed.
    ///
    /// When some alias is already known, its canonical id is kept so that the
    /// whole alias set converges on one key.
    ///
    /// # Errors
    /// Propagates repository failures. Aliases written before the failure stay written.
    pub async fn mark_processed(
        &self,
        aliases: &[String],
        canonical_id: &str,
        presence: &Presence,
    ) -> Result<(), SyncError> {
        let canonical_id = match self.find_record(aliases).await? {
            Some(existing) => existing.canonical_id,
            None => canonical_id.to_string(),
        };
        let record = DedupRecord {
            canonical_id,
            processed_at: self.clock.now(),
            last_presence: presence.clone(),
        };
        for alias in aliases {
            self.repo.put(alias, record.clone()).await?;
        }
        tracing::debug!(aliases = aliases.len(), canonical = %record.canonical_id, "marked processed");
        Ok(())
    }

    /// Decide whether `raw` should be dispatched.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn should_process(&self, raw: &RawReservation) -> Result<ProcessDecision, SyncError> {
        if !fields::has_stay_dates(raw) {
            return Ok(ProcessDecision::Skip(SkipReason::MissingDates));
        }
        let aliases = Self::collect_alias_ids(raw);
        if aliases.is_empty() {
            return Ok(ProcessDecision::Skip(SkipReason::NoIdentifier));
        }
        let Some(record) = self.find_record(&aliases).await? else {
            return Ok(ProcessDecision::New);
        };

        let current = fields::first_string(raw, PRESENCE_FIELDS)
            .map(|p| Presence::parse(&p))
            .unwrap_or_default();
        if self.allow_status_updates
            && current.is_status_change()
            && current != record.last_presence
        {
            return Ok(ProcessDecision::StatusUpdate {
                previous: record.last_presence,
                current,
            });
        }
        Ok(ProcessDecision::Skip(SkipReason::Duplicate))
    }
}
