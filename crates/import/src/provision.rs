//! On-demand provisioning of departments and persons.
//!
//! Before any writes, the full set of referenced-but-unknown entities
//! across the batch is computed. Departments are created sequentially
//! (low volume). Persons go out as one batched creation call; if the batch
//! as a whole fails, the engine falls back to sequential creation with
//! bounded retries, then re-reads the whole person directory to recover
//! IDs for persons that were actually created server-side but whose
//! creation response was lost.

use std::collections::{BTreeMap, HashSet};

use crate::config::{FallbackStrictness, ImportConfig};
use crate::model::{Department, NewPerson, ParsedRow, Person};
use crate::report::UnresolvedReason;
use crate::resolve::{normalize_name, NameIndex, Resolution};
use crate::retry;
use crate::store::Stores;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything the batch references that the directories do not know yet.
#[derive(Debug, Default)]
pub struct ProvisionPlan {
    /// Unknown department names, deduped by normalized name, source order.
    pub departments: Vec<String>,
    /// Unknown persons, deduped by normalized name, source order.
    pub persons: Vec<PlannedPerson>,
}

#[derive(Debug, Clone)]
pub struct PlannedPerson {
    /// As written in the source (first occurrence wins).
    pub name: String,
    /// The department this person appears under most often across the
    /// whole batch; ties break on first occurrence.
    pub default_department: Option<String>,
}

/// Compute the provisioning plan for a batch. Pure: no writes.
///
/// A person reference counts as unknown only when it resolves to nothing
/// at all. An ambiguous first-token reference points at one of several
/// existing people — creating a new entity for it would be worse than
/// leaving it unresolved.
pub fn plan(
    rows: &[ParsedRow],
    index: &NameIndex,
    fallback: FallbackStrictness,
) -> ProvisionPlan {
    let mut plan = ProvisionPlan::default();
    let mut seen_departments: HashSet<String> = HashSet::new();
    // person normalized name -> (verbatim name, department -> count, order)
    let mut person_votes: BTreeMap<String, (String, Vec<(String, usize)>, usize)> =
        BTreeMap::new();
    let mut order = 0usize;

    for row in rows {
        for (department, person_name) in &row.responsibilities {
            let dept_norm = normalize_name(department);
            if !index.has_department(department) && seen_departments.insert(dept_norm) {
                plan.departments.push(department.clone());
            }

            let Some(raw) = person_name else { continue };
            if raw.is_empty() {
                continue;
            }
            match index.resolve_person(raw, fallback) {
                Resolution::Resolved(_) => continue,
                Resolution::Unresolved(UnresolvedReason::PersonNotFound) => {}
                Resolution::Unresolved(_) => continue,
            }
            let norm = normalize_name(raw);
            let entry = person_votes.entry(norm).or_insert_with(|| {
                order += 1;
                (raw.clone(), Vec::new(), order)
            });
            match entry.1.iter_mut().find(|(d, _)| d == department) {
                Some((_, count)) => *count += 1,
                None => entry.1.push((department.clone(), 1)),
            }
        }
    }

    let mut persons: Vec<(usize, PlannedPerson)> = person_votes
        .into_values()
        .map(|(name, votes, order)| {
            // Majority vote; earlier-seen department wins ties, so only a
            // strictly higher count displaces the current best
            let default_department = votes
                .iter()
                .fold(None::<(&String, usize)>, |best, (dept, count)| match best {
                    Some((_, best_count)) if *count <= best_count => best,
                    _ => Some((dept, *count)),
                })
                .map(|(dept, _)| dept.clone());
            (order, PlannedPerson { name, default_department })
        })
        .collect();
    persons.sort_by_key(|(order, _)| *order);
    plan.persons = persons.into_iter().map(|(_, p)| p).collect();
    plan
}

// ---------------------------------------------------------------------------
// Email synthesis
// ---------------------------------------------------------------------------

/// `slug(name)@domain`, de-duplicated with a numeric suffix on collision
/// against both the existing directory and the batch itself.
pub fn placeholder_email(name: &str, domain: &str, taken: &mut HashSet<String>) -> String {
    let slug = slug(name);
    let base = format!("{slug}@{domain}");
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{slug}.{n}@{domain}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn slug(name: &str) -> String {
    let folded = normalize_name(name);
    let slug: String = folded
        .chars()
        .map(|c| if c == ' ' { '.' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// What provisioning actually achieved.
#[derive(Debug, Default)]
pub struct ProvisionOutcome {
    pub departments: Vec<Department>,
    pub persons: Vec<Person>,
    /// `(name, error)` for entities that could not be created. Their links
    /// stay unset; the import continues.
    pub failed: Vec<(String, String)>,
}

/// Execute the plan against the directories. Results are for the caller to
/// merge into the name index before reconciliation begins.
pub fn provision(
    plan: &ProvisionPlan,
    stores: Stores<'_>,
    config: &ImportConfig,
    index: &NameIndex,
) -> ProvisionOutcome {
    let mut outcome = ProvisionOutcome::default();

    // Departments: sequential, low volume
    let mut created_departments: Vec<Department> = Vec::new();
    for name in &plan.departments {
        match retry::execute("department.create", &config.retry, || {
            stores.departments.create(name)
        }) {
            Ok(dept) => created_departments.push(dept),
            Err(e) => outcome.failed.push((name.clone(), e.to_string())),
        }
    }

    // Person profiles: emails deduped against the live directory and
    // within this batch
    let mut taken: HashSet<String> =
        match retry::execute("person.list", &config.retry, || stores.persons.list()) {
            Ok(existing) => existing.into_iter().map(|p| p.email).collect(),
            Err(e) => {
                eprintln!("warning: person.list failed ({e}); email dedup limited to this batch");
                HashSet::new()
            }
        };
    let profiles: Vec<NewPerson> = plan
        .persons
        .iter()
        .map(|planned| {
            let default_department = planned.default_department.as_deref().and_then(|d| {
                if let Resolution::Resolved(id) = index.resolve_department(d) {
                    return Some(id);
                }
                created_departments
                    .iter()
                    .find(|created| normalize_name(&created.name) == normalize_name(d))
                    .map(|created| created.id)
            });
            NewPerson {
                name: planned.name.clone(),
                email: placeholder_email(&planned.name, &config.placeholder_domain, &mut taken),
                password: uuid::Uuid::new_v4().simple().to_string(),
                default_department,
            }
        })
        .collect();

    if !profiles.is_empty() {
        match stores.persons.create_batch(&profiles) {
            Ok(results) => {
                for (profile, result) in profiles.iter().zip(results) {
                    match result {
                        Ok(person) => outcome.persons.push(person),
                        Err(e) => outcome.failed.push((profile.name.clone(), e.to_string())),
                    }
                }
            }
            Err(batch_err) => {
                eprintln!("warning: person batch creation failed ({batch_err}); falling back to sequential");
                sequential_with_recovery(&profiles, stores, config, &mut outcome);
            }
        }
    }

    outcome.departments = created_departments;
    outcome
}

/// Sequential per-person creation, then a fresh full re-read of the person
/// directory to recover IDs for persons created server-side whose response
/// was lost. Duplicate-key races never create true duplicates.
fn sequential_with_recovery(
    profiles: &[NewPerson],
    stores: Stores<'_>,
    config: &ImportConfig,
    outcome: &mut ProvisionOutcome,
) {
    let mut pending: Vec<&NewPerson> = Vec::new();
    for profile in profiles {
        match retry::execute("person.create", &config.retry, || {
            stores.persons.create(profile)
        }) {
            Ok(person) => outcome.persons.push(person),
            Err(_) => pending.push(profile),
        }
    }

    if pending.is_empty() {
        return;
    }

    let directory = match retry::execute("person.list", &config.retry, || stores.persons.list()) {
        Ok(d) => d,
        Err(e) => {
            for profile in pending {
                outcome.failed.push((profile.name.clone(), e.to_string()));
            }
            return;
        }
    };

    for profile in pending {
        let wanted = normalize_name(&profile.name);
        match directory.iter().find(|p| normalize_name(&p.name) == wanted) {
            Some(person) => outcome.persons.push(person.clone()),
            None => outcome
                .failed
                .push((profile.name.clone(), "creation exhausted retries".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;
    use crate::model::CompanyPatch;
    use crate::store::memory::MemoryDirectory;
    use std::collections::BTreeMap;

    fn config() -> ImportConfig {
        let mut c = ImportConfig::default();
        c.retry.base_delay_ms = 0;
        c.retry.pause_between_rows_ms = 0;
        c
    }

    fn row(code: &str, entries: &[(&str, &str)]) -> ParsedRow {
        let mut responsibilities = BTreeMap::new();
        for (dept, person) in entries {
            responsibilities.insert(dept.to_string(), Some(person.to_string()));
        }
        ParsedRow {
            company: CompanyPatch { code: code.into(), ..Default::default() },
            responsibilities,
            source_line: 1,
        }
    }

    #[test]
    fn plan_finds_unknown_entities_once() {
        let dir = MemoryDirectory::new();
        dir.seed_department("Fiscal");
        dir.seed_person("Ana Souza", "ana@x");
        let index = NameIndex::build(
            &crate::store::DepartmentDirectory::list(&dir).unwrap(),
            &crate::store::PersonDirectory::list(&dir).unwrap(),
        );

        let rows = vec![
            row("1", &[("fiscal", "Ana Souza"), ("contabil", "Rui Costa")]),
            row("2", &[("contabil", "Rui Costa")]),
        ];
        let plan = plan(&rows, &index, FallbackStrictness::UniqueOnly);
        assert_eq!(plan.departments, vec!["contabil".to_string()]);
        assert_eq!(plan.persons.len(), 1);
        assert_eq!(plan.persons[0].name, "Rui Costa");
    }

    #[test]
    fn majority_vote_default_department() {
        let index = NameIndex::build(&[], &[]);
        let rows = vec![
            row("1", &[("fiscal", "Rui Costa")]),
            row("2", &[("contabil", "Rui Costa")]),
            row("3", &[("contabil", "Rui Costa")]),
        ];
        let plan = plan(&rows, &index, FallbackStrictness::UniqueOnly);
        let rui = plan.persons.iter().find(|p| p.name == "Rui Costa").unwrap();
        assert_eq!(rui.default_department.as_deref(), Some("contabil"));
    }

    #[test]
    fn majority_tie_breaks_on_first_occurrence() {
        let index = NameIndex::build(&[], &[]);
        let rows = vec![
            row("1", &[("fiscal", "Rui Costa")]),
            row("2", &[("contabil", "Rui Costa")]),
        ];
        let plan = plan(&rows, &index, FallbackStrictness::UniqueOnly);
        assert_eq!(plan.persons[0].default_department.as_deref(), Some("fiscal"));
    }

    #[test]
    fn placeholder_email_dedup_suffix() {
        let mut taken = HashSet::new();
        assert_eq!(
            placeholder_email("Ana Souza", "import.invalid", &mut taken),
            "ana.souza@import.invalid"
        );
        assert_eq!(
            placeholder_email("Ana Souza", "import.invalid", &mut taken),
            "ana.souza.2@import.invalid"
        );
        assert_eq!(
            placeholder_email("Ana Souza", "import.invalid", &mut taken),
            "ana.souza.3@import.invalid"
        );
    }

    #[test]
    fn slug_strips_accents_and_punctuation() {
        let mut taken = HashSet::new();
        assert_eq!(
            placeholder_email("José D'Ávila", "x.invalid", &mut taken),
            "jose.davila@x.invalid"
        );
    }

    #[test]
    fn provision_creates_departments_and_batch_persons() {
        let dir = MemoryDirectory::new();
        let index = NameIndex::build(&[], &[]);
        let rows = vec![row("1", &[("fiscal", "Ana Souza")])];
        let plan = plan(&rows, &index, FallbackStrictness::UniqueOnly);

        let outcome = provision(&plan, Stores::from(&dir), &config(), &index);
        assert_eq!(outcome.departments.len(), 1);
        assert_eq!(outcome.persons.len(), 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(dir.persons()[0].email, "ana.souza@import.invalid");
    }

    #[test]
    fn email_dedup_survives_transient_directory_read() {
        let dir = MemoryDirectory::new();
        // The seeded address occupies the slug this batch would synthesize;
        // the directory read hiccups once, then the retry sees it
        dir.seed_person("Outra Pessoa", "ana.souza@import.invalid");
        dir.fail_next("person.list", 1, StoreErrorKind::Timeout);

        let index = NameIndex::build(&[], &[]);
        let mut planned = ProvisionPlan::default();
        planned.persons.push(PlannedPerson {
            name: "Ana Souza".into(),
            default_department: None,
        });

        let outcome = provision(&planned, Stores::from(&dir), &config(), &index);
        assert_eq!(outcome.persons.len(), 1);
        assert_eq!(outcome.persons[0].email, "ana.souza.2@import.invalid");
    }

    #[test]
    fn batch_failure_falls_back_to_sequential() {
        let dir = MemoryDirectory::new();
        dir.fail_next("person.create_batch", 1, StoreErrorKind::Unavailable);
        let index = NameIndex::build(&[], &[]);
        let rows = vec![row("1", &[("fiscal", "Ana Souza")])];
        let plan = plan(&rows, &index, FallbackStrictness::UniqueOnly);

        let outcome = provision(&plan, Stores::from(&dir), &config(), &index);
        assert_eq!(outcome.persons.len(), 1);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn lost_response_recovered_by_directory_reread() {
        let dir = MemoryDirectory::new();
        // Batch call fails, sequential creates exhaust their retries, yet the
        // person already exists server-side: the directory re-read must
        // recover their id instead of reporting a failure.
        dir.seed_person("Ana Souza", "ana.souza@elsewhere");
        dir.fail_next("person.create_batch", 1, StoreErrorKind::Unavailable);
        dir.fail_next("person.create", 3, StoreErrorKind::Timeout);

        let index = NameIndex::build(&[], &[]);
        let mut planned = ProvisionPlan::default();
        planned.persons.push(PlannedPerson {
            name: "Ana Souza".into(),
            default_department: None,
        });

        let outcome = provision(&planned, Stores::from(&dir), &config(), &index);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.persons.len(), 1);
        assert_eq!(outcome.persons[0].name, "Ana Souza");
    }

    #[test]
    fn uncreatable_person_recorded_as_failed() {
        let dir = MemoryDirectory::new();
        dir.fail_next("person.create_batch", 1, StoreErrorKind::Unavailable);
        dir.fail_next("person.create", 3, StoreErrorKind::Timeout);

        let index = NameIndex::build(&[], &[]);
        let mut planned = ProvisionPlan::default();
        planned.persons.push(PlannedPerson {
            name: "Rui Costa".into(),
            default_department: None,
        });

        let outcome = provision(&planned, Stores::from(&dir), &config(), &index);
        assert!(outcome.persons.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "Rui Costa");
    }
}
