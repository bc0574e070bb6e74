//! Licence enforcement engine.
//!
//! [`LicenceEngine::evaluate`] is the one read-modify-write operation of the
//! system: look the licence up, decide admit/deny, and commit the new state
//! with a compare-and-swap on the version that was read.
//!
//! Two layers keep admitted calls on one licence linearizable:
//! - a per-licence lock serializes evaluations inside this process;
//! - the compare-and-swap catches writers outside the lock (administrative
//!   updates, other processes on the same database). A conflict reruns the
//!   whole evaluation, up to `max_attempts` times, then reports `Contention`.

mod admission;
mod lock;

pub use admission::admit;
pub use lock::KeyedLocks;

use std::net::IpAddr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use thiserror::Error;

use crate::crypto::KeyHasher;
use crate::models::LicenceView;
use crate::store::{CasOutcome, LicenceStore, LookupKey, StoreError};

/// Attempts per evaluation before giving up with `Contention`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Why a call was not admitted, plus the storage fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// No licence matches both key and identifier.
    NotFound,
    Expired,
    QuotaExceeded,
    /// New IP and the registry is full.
    IpNotRegistered,
    /// Commit retries exhausted.
    Contention,
    /// The store could not be reached or returned garbage. Only ever
    /// reported through [`EngineError`], never as a denial.
    StorageUnavailable,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Admitted; carries the licence as committed.
    Admitted(LicenceView),
    Denied(ErrorKind),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            Decision::Admitted(_) => None,
            Decision::Denied(kind) => Some(*kind),
        }
    }

    pub fn licence(&self) -> Option<&LicenceView> {
        match self {
            Decision::Admitted(view) => Some(view),
            Decision::Denied(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request, rejected before touching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("licence store unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::InvalidInput(_) => None,
            EngineError::StorageUnavailable(_) => Some(ErrorKind::StorageUnavailable),
        }
    }
}

/// One licence-bearing call.
#[derive(Debug, Clone, Copy)]
pub struct EvaluateRequest<'a> {
    pub key: &'a str,
    pub identifier: &'a str,
    pub caller_ip: &'a str,
    /// Hardware identifier, recorded on admission but never enforced.
    pub hwid: Option<&'a str>,
}

impl<'a> EvaluateRequest<'a> {
    pub fn new(key: &'a str, identifier: &'a str, caller_ip: &'a str) -> Self {
        Self {
            key,
            identifier,
            caller_ip,
            hwid: None,
        }
    }

    pub fn with_hwid(mut self, hwid: Option<&'a str>) -> Self {
        self.hwid = hwid.filter(|h| !h.is_empty());
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.key.is_empty() {
            return Err(EngineError::InvalidInput("key is required".into()));
        }
        if self.identifier.is_empty() {
            return Err(EngineError::InvalidInput("identifier is required".into()));
        }
        if self.caller_ip.parse::<IpAddr>().is_err() {
            return Err(EngineError::InvalidInput(format!(
                "caller ip {:?} is not a valid IP address",
                self.caller_ip
            )));
        }
        Ok(())
    }
}

pub struct LicenceEngine<S> {
    store: S,
    hasher: KeyHasher,
    locks: KeyedLocks<LookupKey>,
    max_attempts: u32,
}

impl<S: LicenceStore> LicenceEngine<S> {
    pub fn new(store: S, hasher: KeyHasher) -> Self {
        Self {
            store,
            hasher,
            locks: KeyedLocks::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Bound the number of lookup/decide/commit rounds per evaluation (min 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Evaluate a call against the wall clock.
    pub fn validate_licence(
        &self,
        key: &str,
        identifier: &str,
        caller_ip: &str,
    ) -> Result<Decision, EngineError> {
        self.evaluate(
            &EvaluateRequest::new(key, identifier, caller_ip),
            Utc::now().timestamp(),
        )
    }

    /// Decide admit/deny for `request` at `now` and commit the consumption.
    ///
    /// Denials are `Ok(Decision::Denied(_))` and leave the record untouched.
    /// `Err` is reserved for malformed input and store faults; store faults
    /// are never retried here.
    pub fn evaluate(
        &self,
        request: &EvaluateRequest<'_>,
        now: i64,
    ) -> Result<Decision, EngineError> {
        request.validate()?;
        let key = LookupKey::new(self.hasher.hash(request.key), request.identifier);
        self.locks
            .with_lock(&key, || self.evaluate_locked(&key, request, now))
    }

    fn evaluate_locked(
        &self,
        key: &LookupKey,
        request: &EvaluateRequest<'_>,
        now: i64,
    ) -> Result<Decision, EngineError> {
        for attempt in 1..=self.max_attempts {
            let Some(current) = self.store.lookup(key)? else {
                tracing::debug!(identifier = %key.identifier, "Licence not found");
                return Ok(Decision::Denied(ErrorKind::NotFound));
            };

            let next = match admit(&current.value, request.caller_ip, request.hwid, now) {
                Ok(next) => next,
                Err(reason) => {
                    tracing::debug!(
                        licence_id = %current.value.id,
                        reason = reason.as_ref(),
                        "Licence call denied"
                    );
                    return Ok(Decision::Denied(reason));
                }
            };

            match self.store.compare_and_swap(current.version, &next)? {
                CasOutcome::Committed(saved) => {
                    tracing::debug!(
                        licence_id = %saved.value.id,
                        request_count = saved.value.request_count,
                        request_limit = saved.value.request_limit,
                        "Licence call admitted"
                    );
                    return Ok(Decision::Admitted(saved.into()));
                }
                CasOutcome::Conflict => {
                    tracing::debug!(
                        licence_id = %current.value.id,
                        attempt,
                        "Licence changed during evaluation, retrying"
                    );
                }
            }
        }

        tracing::warn!(
            identifier = %key.identifier,
            attempts = self.max_attempts,
            "Licence evaluation gave up after repeated conflicts"
        );
        Ok(Decision::Denied(ErrorKind::Contention))
    }
}
