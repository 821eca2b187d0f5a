//! Reconciliation writer: idempotent company upserts and responsibility
//! link writes.
//!
//! A company's record upsert always completes before that company's link
//! writes are attempted; the links for one company go out as a single
//! multi-row upsert to shrink the conflict window between concurrent
//! imports.

use crate::config::ImportConfig;
use crate::error::StoreError;
use crate::model::{CompanyId, ParsedRow, ResponsibilityLink, UpsertOutcome};
use crate::report::UnresolvedRef;
use crate::resolve::{NameIndex, Resolution};
use crate::retry;
use crate::store::Stores;

/// What one parsed row produced.
#[derive(Debug)]
pub struct RowResult {
    pub outcome: RowOutcome,
    pub unresolved: Vec<UnresolvedRef>,
    /// The links this row intended to persist, kept for verification.
    pub intended: Option<IntendedLinks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

/// The resolved links the writer meant to land for one company.
#[derive(Debug, Clone)]
pub struct IntendedLinks {
    pub company_code: String,
    pub company_id: CompanyId,
    pub links: Vec<ResponsibilityLink>,
}

/// Reconcile one row: upsert the company by business code, then upsert its
/// responsibility links.
///
/// An unresolvable reference is recorded and its link left unset — never
/// cleared, never guessed. Only the row's own write failures mark the row
/// failed; the rest of the batch continues.
pub fn write_row(
    row: &ParsedRow,
    index: &NameIndex,
    stores: Stores<'_>,
    config: &ImportConfig,
) -> Result<RowResult, (String, StoreError)> {
    let code = row.company.code.clone();

    let outcome = retry::execute("company.upsert", &config.retry, || {
        stores.companies.upsert(&row.company)
    })
    .map_err(|e| (code.clone(), e))?;
    let company_id = outcome.company_id();

    let mut unresolved = Vec::new();
    let mut links = Vec::new();

    for (department, person_name) in &row.responsibilities {
        let department_id = match index.resolve_department(department) {
            Resolution::Resolved(id) => id,
            Resolution::Unresolved(reason) => {
                unresolved.push(UnresolvedRef {
                    company_code: code.clone(),
                    department: department.clone(),
                    raw_name: person_name.clone(),
                    reason,
                });
                continue;
            }
        };
        match person_name {
            // Mapped column, empty cell: known to have no responsible person
            None => links.push(ResponsibilityLink {
                company_id,
                department_id,
                person_id: None,
            }),
            Some(raw) => match index.resolve_person(raw, config.first_name_fallback) {
                Resolution::Resolved(person_id) => links.push(ResponsibilityLink {
                    company_id,
                    department_id,
                    person_id: Some(person_id),
                }),
                Resolution::Unresolved(reason) => {
                    // Link left unset; existing state stays untouched
                    unresolved.push(UnresolvedRef {
                        company_code: code.clone(),
                        department: department.clone(),
                        raw_name: Some(raw.clone()),
                        reason,
                    });
                }
            },
        }
    }

    if !links.is_empty() {
        retry::execute("link.upsert_many", &config.retry, || {
            stores.links.upsert_many(&links)
        })
        .map_err(|e| (code.clone(), e))?;
    }

    let row_outcome = match outcome {
        UpsertOutcome::Created(_) => RowOutcome::Created,
        UpsertOutcome::Updated(_) => RowOutcome::Updated,
        UpsertOutcome::Unchanged(_) => RowOutcome::Skipped,
    };

    Ok(RowResult {
        outcome: row_outcome,
        unresolved,
        intended: Some(IntendedLinks {
            company_code: code,
            company_id,
            links,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;
    use crate::model::ParsedRow;
    use crate::report::UnresolvedReason;
    use crate::store::memory::MemoryDirectory;
    use std::collections::BTreeMap;

    fn config() -> ImportConfig {
        let mut c = ImportConfig::default();
        c.retry.base_delay_ms = 0;
        c.retry.pause_between_rows_ms = 0;
        c
    }

    fn row(code: &str, entries: &[(&str, Option<&str>)]) -> ParsedRow {
        let mut responsibilities = BTreeMap::new();
        for (dept, person) in entries {
            responsibilities.insert(dept.to_string(), person.map(str::to_string));
        }
        ParsedRow {
            company: crate::model::CompanyPatch {
                code: code.into(),
                legal_name: Some(format!("Empresa {code}")),
                ..Default::default()
            },
            responsibilities,
            source_line: 1,
        }
    }

    fn index_for(dir: &MemoryDirectory) -> NameIndex {
        NameIndex::build(
            &crate::store::DepartmentDirectory::list(dir).unwrap(),
            &crate::store::PersonDirectory::list(dir).unwrap(),
        )
    }

    #[test]
    fn creates_company_and_link() {
        let dir = MemoryDirectory::new();
        dir.seed_department("Fiscal");
        let ana = dir.seed_person("Ana Souza", "ana@x");
        let index = index_for(&dir);

        let result = write_row(
            &row("1042", &[("fiscal", Some("Ana Souza"))]),
            &index,
            Stores::from(&dir),
            &config(),
        )
        .unwrap();

        assert_eq!(result.outcome, RowOutcome::Created);
        assert!(result.unresolved.is_empty());
        let links = dir.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].person_id, Some(ana.id));
    }

    #[test]
    fn second_identical_import_is_skipped() {
        let dir = MemoryDirectory::new();
        dir.seed_department("Fiscal");
        dir.seed_person("Ana Souza", "ana@x");
        let index = index_for(&dir);
        let r = row("1042", &[("fiscal", Some("Ana Souza"))]);

        let first = write_row(&r, &index, Stores::from(&dir), &config()).unwrap();
        assert_eq!(first.outcome, RowOutcome::Created);

        let second = write_row(&r, &index, Stores::from(&dir), &config()).unwrap();
        assert_eq!(second.outcome, RowOutcome::Skipped);
        assert_eq!(dir.companies().len(), 1);
        assert_eq!(dir.links().len(), 1);
    }

    #[test]
    fn unresolved_person_leaves_link_unset() {
        let dir = MemoryDirectory::new();
        dir.seed_department("Fiscal");
        dir.seed_person("Ana Souza", "ana@x");
        dir.seed_person("Ana Lima", "ana2@x");
        let index = index_for(&dir);

        let result = write_row(
            &row("7", &[("fiscal", Some("Ana"))]),
            &index,
            Stores::from(&dir),
            &config(),
        )
        .unwrap();

        assert_eq!(result.unresolved.len(), 1);
        assert_eq!(result.unresolved[0].reason, UnresolvedReason::AmbiguousFirstName);
        assert!(dir.links().is_empty());
        // Company itself still landed
        assert_eq!(dir.companies().len(), 1);
    }

    #[test]
    fn empty_mapped_cell_clears_existing_link() {
        let dir = MemoryDirectory::new();
        let dept = dir.seed_department("Fiscal");
        let ana = dir.seed_person("Ana Souza", "ana@x");
        let index = index_for(&dir);

        // First import sets the link
        write_row(
            &row("7", &[("fiscal", Some("Ana Souza"))]),
            &index,
            Stores::from(&dir),
            &config(),
        )
        .unwrap();
        assert_eq!(dir.links()[0].person_id, Some(ana.id));

        // Re-import with the column mapped but empty clears it
        write_row(&row("7", &[("fiscal", None)]), &index, Stores::from(&dir), &config()).unwrap();
        let links = dir.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].department_id, dept.id);
        assert_eq!(links[0].person_id, None);
    }

    #[test]
    fn transient_upsert_failure_recovers_as_updated() {
        let dir = MemoryDirectory::new();
        dir.seed_department("Fiscal");
        dir.seed_person("Ana Souza", "ana@x");
        let index = index_for(&dir);

        write_row(
            &row("7", &[("fiscal", Some("Ana Souza"))]),
            &index,
            Stores::from(&dir),
            &config(),
        )
        .unwrap();

        // Next upsert gets a 429 on its first attempt, succeeds on retry
        dir.fail_next("company.upsert", 1, StoreErrorKind::RateLimited);
        let mut changed = row("7", &[("fiscal", Some("Ana Souza"))]);
        changed.company.legal_name = Some("Empresa 7 Ltda".into());
        let result =
            write_row(&changed, &index, Stores::from(&dir), &config()).unwrap();
        assert_eq!(result.outcome, RowOutcome::Updated);
    }

    #[test]
    fn fatal_write_failure_fails_row_with_context() {
        let dir = MemoryDirectory::new();
        let index = index_for(&dir);
        dir.fail_next("company.upsert", 1, StoreErrorKind::Invalid);

        let err = write_row(&row("7", &[]), &index, Stores::from(&dir), &config()).unwrap_err();
        assert_eq!(err.0, "7");
        assert_eq!(err.1.kind, StoreErrorKind::Invalid);
    }
}
