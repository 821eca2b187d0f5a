//! Name-based entity resolution.
//!
//! Indices are built once per run from freshly-fetched snapshots and are
//! read-only during resolution; provisioning results are merged in before
//! the reconciliation phase, so no phase resolves against a stale index.

use std::collections::HashMap;

use officio_tabular::fold_name;

use crate::config::FallbackStrictness;
use crate::model::{Department, DepartmentId, Person, PersonId};
use crate::report::UnresolvedReason;

/// Case-fold, strip diacritics, collapse internal whitespace. Pure and
/// deterministic within a run.
pub fn normalize_name(raw: &str) -> String {
    fold_name(raw)
}

/// Outcome of resolving one textual reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    Unresolved(UnresolvedReason),
}

/// Normalized-name lookup tables for departments and persons.
pub struct NameIndex {
    departments: HashMap<String, DepartmentId>,
    persons: HashMap<String, PersonId>,
    /// First token of the full name → all persons sharing it.
    first_tokens: HashMap<String, Vec<PersonId>>,
}

impl NameIndex {
    pub fn build(departments: &[Department], persons: &[Person]) -> Self {
        let mut index = Self {
            departments: HashMap::new(),
            persons: HashMap::new(),
            first_tokens: HashMap::new(),
        };
        for dept in departments {
            index.insert_department(dept);
        }
        for person in persons {
            index.insert_person(person);
        }
        index
    }

    pub fn insert_department(&mut self, dept: &Department) {
        self.departments.insert(normalize_name(&dept.name), dept.id);
    }

    pub fn insert_person(&mut self, person: &Person) {
        let normalized = normalize_name(&person.name);
        if let Some(token) = normalized.split(' ').next() {
            if !token.is_empty() {
                let bucket = self.first_tokens.entry(token.to_string()).or_default();
                if !bucket.contains(&person.id) {
                    bucket.push(person.id);
                }
            }
        }
        self.persons.insert(normalized, person.id);
    }

    /// Departments resolve by exact normalized name only.
    pub fn resolve_department(&self, raw: &str) -> Resolution<DepartmentId> {
        match self.departments.get(&normalize_name(raw)) {
            Some(&id) => Resolution::Resolved(id),
            None => Resolution::Unresolved(UnresolvedReason::DepartmentNotFound),
        }
    }

    /// Exact normalized full name first; on a miss, the first token of the
    /// reference is tried against the first-token index, but only resolves
    /// when exactly one known person shares it. Ambiguity never guesses.
    pub fn resolve_person(
        &self,
        raw: &str,
        fallback: FallbackStrictness,
    ) -> Resolution<PersonId> {
        let normalized = normalize_name(raw);
        if let Some(&id) = self.persons.get(&normalized) {
            return Resolution::Resolved(id);
        }
        if fallback == FallbackStrictness::Off {
            return Resolution::Unresolved(UnresolvedReason::PersonNotFound);
        }
        let token = match normalized.split(' ').next() {
            Some(t) if !t.is_empty() => t,
            _ => return Resolution::Unresolved(UnresolvedReason::PersonNotFound),
        };
        match self.first_tokens.get(token).map(Vec::as_slice) {
            Some([only]) => Resolution::Resolved(*only),
            Some(_) => Resolution::Unresolved(UnresolvedReason::AmbiguousFirstName),
            None => Resolution::Unresolved(UnresolvedReason::PersonNotFound),
        }
    }

    pub fn has_department(&self, raw: &str) -> bool {
        self.departments.contains_key(&normalize_name(raw))
    }
}
