use serde::Serialize;

// ---------------------------------------------------------------------------
// Unresolved references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    DepartmentNotFound,
    PersonNotFound,
    AmbiguousFirstName,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepartmentNotFound => write!(f, "department not found"),
            Self::PersonNotFound => write!(f, "person not found"),
            Self::AmbiguousFirstName => write!(f, "ambiguous first name"),
        }
    }
}

/// A reference that could not be resolved, with enough context to chase it
/// down by hand.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedRef {
    pub company_code: String,
    pub department: String,
    pub raw_name: Option<String>,
    pub reason: UnresolvedReason,
}

// ---------------------------------------------------------------------------
// Verification summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationSummary {
    pub confirmed: usize,
    pub corrected: usize,
    pub correction_failed: usize,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub engine_version: String,
    pub run_at: String,
}

impl Default for ReportMeta {
    fn default() -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// The single object the calling layer renders. Counts, provisioned
/// entities, unresolved references, rejected variant columns, verification
/// outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub meta: ReportMeta,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Departments provisioned during this run.
    pub new_departments: Vec<String>,
    /// Persons provisioned during this run.
    pub new_persons: Vec<String>,
    pub unresolved: Vec<UnresolvedRef>,
    /// Header columns that looked like a department but were rejected
    /// (secondary/guide variants) — listed so nobody wonders where the
    /// data went.
    pub rejected_columns: Vec<String>,
    pub verification: VerificationSummary,
    /// Per-row failure context (business code + error), for follow-up.
    pub failures: Vec<RowFailure>,
    /// Entities that could not be provisioned; their links stay unset.
    pub provision_failures: Vec<ProvisionFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub company_code: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionFailure {
    pub name: String,
    pub error: String,
}

impl ImportReport {
    /// True when the caller should surface a "manual follow-up required"
    /// warning.
    pub fn needs_followup(&self) -> bool {
        self.failed > 0
            || !self.unresolved.is_empty()
            || self.verification.correction_failed > 0
    }

    pub fn record_unresolved(
        &mut self,
        company_code: &str,
        department: &str,
        raw_name: Option<&str>,
        reason: UnresolvedReason,
    ) {
        self.unresolved.push(UnresolvedRef {
            company_code: company_code.to_string(),
            department: department.to_string(),
            raw_name: raw_name.map(str::to_string),
            reason,
        });
    }

    pub fn record_failure(&mut self, company_code: &str, error: impl std::fmt::Display) {
        self.failed += 1;
        self.failures.push(RowFailure {
            company_code: company_code.to_string(),
            error: error.to_string(),
        });
    }
}
