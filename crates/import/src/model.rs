use std::collections::BTreeMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CompanyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DepartmentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PersonId(pub u64);

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A client company. Business key: `code`, unique and stable across imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub id: CompanyId,
    pub code: String,
    pub legal_name: String,
    pub trade_name: String,
    pub tax_id: String,
    pub state_registration: String,
    pub municipal_registration: String,
    pub tax_regime: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// A partial company record. `None` fields were not supplied by the source
/// and must never overwrite existing values (merge semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyPatch {
    pub code: String,
    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
    pub tax_id: Option<String>,
    pub state_registration: Option<String>,
    pub municipal_registration: Option<String>,
    pub tax_regime: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl CompanyPatch {
    pub fn apply_to(&self, company: &mut Company) {
        let fields = [
            (&self.legal_name, &mut company.legal_name),
            (&self.trade_name, &mut company.trade_name),
            (&self.tax_id, &mut company.tax_id),
            (&self.state_registration, &mut company.state_registration),
            (&self.municipal_registration, &mut company.municipal_registration),
            (&self.tax_regime, &mut company.tax_regime),
            (&self.street, &mut company.street),
            (&self.city, &mut company.city),
            (&self.state, &mut company.state),
            (&self.postal_code, &mut company.postal_code),
        ];
        for (patch, target) in fields {
            if let Some(value) = patch {
                *target = value.clone();
            }
        }
    }

    /// True when applying the patch would change nothing.
    pub fn matches(&self, company: &Company) -> bool {
        let mut copy = company.clone();
        self.apply_to(&mut copy);
        copy == *company
    }
}

/// Business key: normalized name. Create-only from this engine's viewpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

/// Business key: normalized full name.
#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub email: String,
}

/// Profile for a person being provisioned on demand.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    /// Synthesized placeholder, de-duplicated with a numeric suffix.
    pub email: String,
    /// Opaque random token; nobody logs in with this.
    pub password: String,
    /// Department the person appears under most often across the batch.
    pub default_department: Option<DepartmentId>,
}

/// At most one link per (company, department). `person_id: None` means
/// "known to have no responsible person"; absence of the row entirely means
/// "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponsibilityLink {
    pub company_id: CompanyId,
    pub department_id: DepartmentId,
    pub person_id: Option<PersonId>,
}

// ---------------------------------------------------------------------------
// Intermediate rows
// ---------------------------------------------------------------------------

/// One logical source row: company identity fields plus a department-name →
/// person-name map. Ephemeral — discarded once the writer consumes it.
///
/// A `Some(name)` value sets the link; an explicit `None` clears it (the
/// column was mapped but empty on this row). Departments absent from the
/// map are left untouched.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub company: CompanyPatch,
    pub responsibilities: BTreeMap<String, Option<String>>,
    /// 1-based line in the source, for report context.
    pub source_line: usize,
}

// ---------------------------------------------------------------------------
// Write outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(CompanyId),
    Updated(CompanyId),
    Unchanged(CompanyId),
}

impl UpsertOutcome {
    pub fn company_id(&self) -> CompanyId {
        match *self {
            Self::Created(id) | Self::Updated(id) | Self::Unchanged(id) => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provisioning,
    Reconciling,
    Verifying,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Verifying => write!(f, "verifying"),
        }
    }
}

/// Passed to the caller's progress callback between batches and phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub phase: Phase,
}
