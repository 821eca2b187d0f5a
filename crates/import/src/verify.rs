//! Delayed consistency verification.
//!
//! After the create/update passes complete, wait a settle delay, re-read
//! authoritative persisted state for every written company, and compare it
//! against the intended resolved links. Divergences get one corrective
//! upsert. This compensates for read-after-write/replication lag; it never
//! re-runs resolution, and its outcomes land in the report, never as a
//! run-level failure.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::config::ImportConfig;
use crate::report::VerificationSummary;
use crate::retry;
use crate::store::Stores;
use crate::writer::IntendedLinks;

/// Per-row verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyState {
    Pending,
    Verifying,
    /// Persisted state matches the intent.
    Confirmed,
    /// Diverged; the corrective upsert landed.
    Corrected,
    /// Diverged; the corrective upsert failed too.
    CorrectionFailed,
}

impl std::fmt::Display for VerifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verifying => write!(f, "verifying"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Corrected => write!(f, "corrected"),
            Self::CorrectionFailed => write!(f, "correction_failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub company_code: String,
    pub state: VerifyState,
}

/// Verify every written company and correct divergent links.
///
/// With verification disabled the phase degenerates to a no-op, which is
/// exactly right under a strongly consistent backing store.
pub fn verify_links(
    intended: &[IntendedLinks],
    stores: Stores<'_>,
    config: &ImportConfig,
    mut on_row: impl FnMut(&VerifyOutcome),
) -> VerificationSummary {
    let mut summary = VerificationSummary::default();
    if !config.verify.enabled || intended.is_empty() {
        return summary;
    }

    thread::sleep(Duration::from_millis(config.verify.settle_delay_ms));

    for intent in intended {
        let state = verify_one(intent, stores, config);
        match state {
            VerifyState::Confirmed => summary.confirmed += 1,
            VerifyState::Corrected => summary.corrected += 1,
            VerifyState::CorrectionFailed => summary.correction_failed += 1,
            // verify_one always reaches a terminal state
            VerifyState::Pending | VerifyState::Verifying => {}
        }
        on_row(&VerifyOutcome { company_code: intent.company_code.clone(), state });
    }

    summary
}

/// Drive one row from `Pending` through `Verifying` to a terminal state.
fn verify_one(
    intent: &IntendedLinks,
    stores: Stores<'_>,
    config: &ImportConfig,
) -> VerifyState {
    // Pending -> Verifying: re-read authoritative state
    let persisted = match retry::execute("link.list_by_company", &config.retry, || {
        stores.links.list_by_company(intent.company_id)
    }) {
        Ok(links) => links,
        Err(_) => return VerifyState::CorrectionFailed,
    };

    let diverged = intent.links.iter().any(|wanted| {
        let found = persisted
            .iter()
            .find(|p| p.department_id == wanted.department_id);
        found.map(|p| p.person_id) != Some(wanted.person_id)
    });

    if !diverged {
        return VerifyState::Confirmed;
    }

    // Verifying -> Corrected | CorrectionFailed: one corrective upsert
    match retry::execute("link.upsert_many", &config.retry, || {
        stores.links.upsert_many(&intent.links)
    }) {
        Ok(()) => VerifyState::Corrected,
        Err(_) => VerifyState::CorrectionFailed,
    }
}
