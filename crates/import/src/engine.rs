//! Run orchestrator: provisioning, then reconciliation, then verification.
//!
//! Phases execute strictly in order because each phase's reads depend on
//! the previous phase's committed writes. Within reconciliation, rows fan
//! out in small fixed-size concurrent batches scoped across distinct
//! companies; a single company's record upsert always completes before its
//! responsibility-link writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use officio_tabular::Table;

use crate::config::ImportConfig;
use crate::error::{ImportError, StoreError};
use crate::model::{ParsedRow, Phase, Progress};
use crate::provision;
use crate::report::{ImportReport, ProvisionFailure};
use crate::resolve::NameIndex;
use crate::retry;
use crate::schema::{self, master, matrix};
use crate::store::Stores;
use crate::verify;
use crate::writer::{self, IntendedLinks, RowOutcome};

/// One entry for the standalone per-department bulk updater.
#[derive(Debug, Clone)]
pub struct BulkAssignment {
    pub company_code: String,
    pub person_name: String,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Import a full company-master export.
pub fn run_master_import(
    text: &str,
    config: &ImportConfig,
    stores: Stores<'_>,
    mut progress: impl FnMut(Progress),
) -> Result<ImportReport, ImportError> {
    config.validate()?;
    let table = Table::parse(text, &schema::header_keywords());
    let mapping = master::map_master(&table)?;

    let mut report = ImportReport::default();
    report.rejected_columns = mapping.rejected_columns;
    report.skipped += mapping.skipped_rows;

    run_pipeline(&mapping.rows, config, stores, &mut report, &mut progress, None)?;
    Ok(report)
}

/// Import a multi-block responsibility matrix targeting one department.
/// This narrow variant only ever sets that department's links.
pub fn run_matrix_import(
    text: &str,
    department: &str,
    config: &ImportConfig,
    stores: Stores<'_>,
    mut progress: impl FnMut(Progress),
) -> Result<ImportReport, ImportError> {
    config.validate()?;
    let table = Table::parse(text, &schema::header_keywords());
    if table.rows.is_empty() {
        return Err(ImportError::Parse("empty input: no rows to import".into()));
    }
    let blocks = matrix::map_matrix(&table);
    let rows = matrix::blocks_to_rows(&blocks, department);

    let mut report = ImportReport::default();
    run_pipeline(&rows, config, stores, &mut report, &mut progress, None)?;
    Ok(report)
}

/// Standalone per-department bulk update with a cooperative abort flag,
/// checked between batches. Aborted rows are counted as skipped.
pub fn assign_department_bulk(
    assignments: &[BulkAssignment],
    department: &str,
    config: &ImportConfig,
    stores: Stores<'_>,
    abort: &AtomicBool,
    mut progress: impl FnMut(Progress),
) -> Result<ImportReport, ImportError> {
    config.validate()?;
    let rows: Vec<ParsedRow> = assignments
        .iter()
        .map(|a| {
            let mut responsibilities = std::collections::BTreeMap::new();
            responsibilities
                .insert(department.to_string(), Some(a.person_name.clone()));
            ParsedRow {
                company: crate::model::CompanyPatch {
                    code: a.company_code.clone(),
                    ..Default::default()
                },
                responsibilities,
                source_line: 0,
            }
        })
        .collect();

    let mut report = ImportReport::default();
    run_pipeline(&rows, config, stores, &mut report, &mut progress, Some(abort))?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn run_pipeline(
    rows: &[ParsedRow],
    config: &ImportConfig,
    stores: Stores<'_>,
    report: &mut ImportReport,
    progress: &mut impl FnMut(Progress),
    abort: Option<&AtomicBool>,
) -> Result<(), ImportError> {
    // Fresh point-in-time snapshots; no phase resolves against stale state
    let departments = retry::execute("department.list", &config.retry, || {
        stores.departments.list()
    })
    .map_err(ImportError::Snapshot)?;
    let persons = retry::execute("person.list", &config.retry, || stores.persons.list())
        .map_err(ImportError::Snapshot)?;
    let mut index = NameIndex::build(&departments, &persons);

    // Phase 1: provisioning
    let plan = provision::plan(rows, &index, config.first_name_fallback);
    let provision_total = plan.departments.len() + plan.persons.len();
    progress(Progress { done: 0, total: provision_total, phase: Phase::Provisioning });
    let outcome = provision::provision(&plan, stores, config, &index);
    for dept in &outcome.departments {
        report.new_departments.push(dept.name.clone());
        index.insert_department(dept);
    }
    for person in &outcome.persons {
        report.new_persons.push(person.name.clone());
        index.insert_person(person);
    }
    for (name, error) in outcome.failed {
        report.failed += 1;
        report.provision_failures.push(ProvisionFailure { name, error });
    }
    progress(Progress { done: provision_total, total: provision_total, phase: Phase::Provisioning });

    // Phase 2: reconciliation
    let intended = reconcile(rows, &index, stores, config, report, progress, abort);

    // Phase 3: verification
    progress(Progress { done: 0, total: intended.len(), phase: Phase::Verifying });
    let mut done = 0usize;
    let total = intended.len();
    report.verification = verify::verify_links(&intended, stores, config, |_| {
        done += 1;
    });
    progress(Progress { done, total, phase: Phase::Verifying });

    Ok(())
}

/// Fan rows out in fixed-size concurrent batches. Concurrency is scoped
/// across distinct companies — rows sharing a business code stay on one
/// thread, in source order.
fn reconcile(
    rows: &[ParsedRow],
    index: &NameIndex,
    stores: Stores<'_>,
    config: &ImportConfig,
    report: &mut ImportReport,
    progress: &mut impl FnMut(Progress),
    abort: Option<&AtomicBool>,
) -> Vec<IntendedLinks> {
    // Group by company code, preserving first-seen order
    let mut units: Vec<Vec<&ParsedRow>> = Vec::new();
    let mut by_code: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        match by_code.get(row.company.code.as_str()) {
            Some(&i) => units[i].push(row),
            None => {
                by_code.insert(&row.company.code, units.len());
                units.push(vec![row]);
            }
        }
    }

    let total = units.len();
    let mut done = 0usize;
    let mut intended = Vec::new();
    progress(Progress { done, total, phase: Phase::Reconciling });

    for batch in units.chunks(config.batch_size.max(1)) {
        if let Some(flag) = abort {
            if flag.load(Ordering::Relaxed) {
                // Skipped counts source rows; a unit may hold several
                report.skipped += units[done..].iter().map(Vec::len).sum::<usize>();
                break;
            }
        }

        let results: Vec<Vec<Result<writer::RowResult, (String, StoreError)>>> =
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|unit| {
                        scope.spawn(move || {
                            let mut unit_results = Vec::new();
                            for row in unit.iter() {
                                unit_results.push(writer::write_row(row, index, stores, config));
                                retry::pause_between_rows(&config.retry);
                            }
                            unit_results
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

        for unit_results in results {
            for result in unit_results {
                match result {
                    Ok(row_result) => {
                        match row_result.outcome {
                            RowOutcome::Created => report.created += 1,
                            RowOutcome::Updated => report.updated += 1,
                            RowOutcome::Skipped => report.skipped += 1,
                        }
                        report.unresolved.extend(row_result.unresolved);
                        if let Some(links) = row_result.intended {
                            intended.push(links);
                        }
                    }
                    Err((code, err)) => report.record_failure(&code, err),
                }
            }
        }

        done = (done + batch.len()).min(total);
        progress(Progress { done, total, phase: Phase::Reconciling });
    }

    intended
}
