//! Collaborator traits for the backing entity graph, plus an in-memory
//! implementation used by tests and local dry-runs.
//!
//! All calls are blocking; no async runtime is required. Implementations
//! must be `Send + Sync` so the reconciliation phase can fan rows out
//! across scoped threads.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{StoreError, StoreErrorKind};
use crate::model::{
    Company, CompanyId, CompanyPatch, Department, DepartmentId, NewPerson, Person, PersonId,
    ResponsibilityLink, UpsertOutcome,
};

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait CompanyDirectory: Send + Sync {
    fn list(&self) -> StoreResult<Vec<Company>>;
    fn get_by_code(&self, code: &str) -> StoreResult<Option<Company>>;
    /// Insert when the code is unseen, else merge-patch supplied fields.
    fn upsert(&self, patch: &CompanyPatch) -> StoreResult<UpsertOutcome>;
}

pub trait DepartmentDirectory: Send + Sync {
    fn list(&self) -> StoreResult<Vec<Department>>;
    fn create(&self, name: &str) -> StoreResult<Department>;
}

pub trait PersonDirectory: Send + Sync {
    fn list(&self) -> StoreResult<Vec<Person>>;
    fn create(&self, profile: &NewPerson) -> StoreResult<Person>;
    /// One round-trip for the whole batch. The outer `Result` is the call
    /// itself; inner results are per-profile.
    fn create_batch(&self, profiles: &[NewPerson]) -> StoreResult<Vec<StoreResult<Person>>>;
}

pub trait LinkStore: Send + Sync {
    /// Multi-row upsert on the (company, department) composite key.
    fn upsert_many(&self, links: &[ResponsibilityLink]) -> StoreResult<()>;
    fn list_by_company(&self, company: CompanyId) -> StoreResult<Vec<ResponsibilityLink>>;
}

/// The four collaborators an import run needs, bundled.
#[derive(Clone, Copy)]
pub struct Stores<'a> {
    pub companies: &'a dyn CompanyDirectory,
    pub departments: &'a dyn DepartmentDirectory,
    pub persons: &'a dyn PersonDirectory,
    pub links: &'a dyn LinkStore,
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub mod memory {
    use super::*;

    #[derive(Default)]
    struct State {
        companies: Vec<Company>,
        departments: Vec<Department>,
        persons: Vec<Person>,
        links: Vec<ResponsibilityLink>,
        /// Link writes held back while lag simulation is on.
        staged_links: Vec<ResponsibilityLink>,
        next_id: u64,
        /// Scripted failures per operation label, consumed FIFO.
        faults: HashMap<String, Vec<StoreError>>,
        lagged: bool,
    }

    /// In-memory backing store. Implements all four collaborator traits
    /// behind one `Mutex`, with scripted fault injection and a staged-write
    /// mode that models replication lag for the consistency verifier.
    #[derive(Default)]
    pub struct MemoryDirectory {
        state: Mutex<State>,
    }

    impl MemoryDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue `count` failures of `kind` for the named operation
        /// (`"company.upsert"`, `"person.create_batch"`, ...). Each failing
        /// call consumes one.
        pub fn fail_next(&self, op: &str, count: usize, kind: StoreErrorKind) {
            let mut state = self.state.lock().unwrap();
            let queue = state.faults.entry(op.to_string()).or_default();
            for _ in 0..count {
                queue.push(StoreError::new(kind, format!("injected failure for {op}")));
            }
        }

        /// While lagged, `upsert_many` acknowledges writes but holds them in
        /// a staging area invisible to `list_by_company` until [`settle`].
        pub fn set_lagged(&self, lagged: bool) {
            self.state.lock().unwrap().lagged = lagged;
        }

        /// Flush staged link writes into visible state.
        pub fn settle(&self) {
            let mut state = self.state.lock().unwrap();
            let staged = std::mem::take(&mut state.staged_links);
            for link in staged {
                apply_link(&mut state.links, link);
            }
        }

        /// Drop staged link writes entirely — a write that was acknowledged
        /// but never landed. The verifier must repair these.
        pub fn drop_staged(&self) {
            self.state.lock().unwrap().staged_links.clear();
        }

        pub fn seed_department(&self, name: &str) -> Department {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let dept = Department { id: DepartmentId(state.next_id), name: name.to_string() };
            state.departments.push(dept.clone());
            dept
        }

        pub fn seed_person(&self, name: &str, email: &str) -> Person {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let person = Person {
                id: PersonId(state.next_id),
                name: name.to_string(),
                email: email.to_string(),
            };
            state.persons.push(person.clone());
            person
        }

        pub fn companies(&self) -> Vec<Company> {
            self.state.lock().unwrap().companies.clone()
        }

        pub fn persons(&self) -> Vec<Person> {
            self.state.lock().unwrap().persons.clone()
        }

        pub fn links(&self) -> Vec<ResponsibilityLink> {
            self.state.lock().unwrap().links.clone()
        }

        fn take_fault(state: &mut State, op: &str) -> Option<StoreError> {
            let queue = state.faults.get_mut(op)?;
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        }
    }

    fn apply_link(links: &mut Vec<ResponsibilityLink>, link: ResponsibilityLink) {
        match links
            .iter_mut()
            .find(|l| l.company_id == link.company_id && l.department_id == link.department_id)
        {
            Some(existing) => existing.person_id = link.person_id,
            None => links.push(link),
        }
    }

    impl CompanyDirectory for MemoryDirectory {
        fn list(&self) -> StoreResult<Vec<Company>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "company.list") {
                return Err(err);
            }
            Ok(state.companies.clone())
        }

        fn get_by_code(&self, code: &str) -> StoreResult<Option<Company>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "company.get_by_code") {
                return Err(err);
            }
            Ok(state.companies.iter().find(|c| c.code == code).cloned())
        }

        fn upsert(&self, patch: &CompanyPatch) -> StoreResult<UpsertOutcome> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "company.upsert") {
                return Err(err);
            }
            if patch.code.is_empty() {
                return Err(StoreError::new(StoreErrorKind::Invalid, "empty company code"));
            }
            if let Some(pos) = state.companies.iter().position(|c| c.code == patch.code) {
                let unchanged = patch.matches(&state.companies[pos]);
                let id = state.companies[pos].id;
                if unchanged {
                    return Ok(UpsertOutcome::Unchanged(id));
                }
                let company = &mut state.companies[pos];
                patch.apply_to(company);
                return Ok(UpsertOutcome::Updated(id));
            }
            state.next_id += 1;
            let mut company = Company {
                id: CompanyId(state.next_id),
                code: patch.code.clone(),
                legal_name: String::new(),
                trade_name: String::new(),
                tax_id: String::new(),
                state_registration: String::new(),
                municipal_registration: String::new(),
                tax_regime: String::new(),
                street: String::new(),
                city: String::new(),
                state: String::new(),
                postal_code: String::new(),
            };
            patch.apply_to(&mut company);
            let id = company.id;
            state.companies.push(company);
            Ok(UpsertOutcome::Created(id))
        }
    }

    impl DepartmentDirectory for MemoryDirectory {
        fn list(&self) -> StoreResult<Vec<Department>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "department.list") {
                return Err(err);
            }
            Ok(state.departments.clone())
        }

        fn create(&self, name: &str) -> StoreResult<Department> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "department.create") {
                return Err(err);
            }
            if state.departments.iter().any(|d| d.name == name) {
                return Err(StoreError::new(StoreErrorKind::Conflict, format!("department exists: {name}")));
            }
            state.next_id += 1;
            let dept = Department { id: DepartmentId(state.next_id), name: name.to_string() };
            state.departments.push(dept.clone());
            Ok(dept)
        }
    }

    impl PersonDirectory for MemoryDirectory {
        fn list(&self) -> StoreResult<Vec<Person>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "person.list") {
                return Err(err);
            }
            Ok(state.persons.clone())
        }

        fn create(&self, profile: &NewPerson) -> StoreResult<Person> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "person.create") {
                return Err(err);
            }
            Self::create_locked(&mut state, profile)
        }

        fn create_batch(&self, profiles: &[NewPerson]) -> StoreResult<Vec<StoreResult<Person>>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "person.create_batch") {
                return Err(err);
            }
            Ok(profiles
                .iter()
                .map(|p| Self::create_locked(&mut state, p))
                .collect())
        }
    }

    impl MemoryDirectory {
        fn create_locked(state: &mut State, profile: &NewPerson) -> StoreResult<Person> {
            if state.persons.iter().any(|p| p.email == profile.email) {
                return Err(StoreError::new(
                    StoreErrorKind::Conflict,
                    format!("email exists: {}", profile.email),
                ));
            }
            state.next_id += 1;
            let person = Person {
                id: PersonId(state.next_id),
                name: profile.name.clone(),
                email: profile.email.clone(),
            };
            state.persons.push(person.clone());
            Ok(person)
        }
    }

    impl LinkStore for MemoryDirectory {
        fn upsert_many(&self, links: &[ResponsibilityLink]) -> StoreResult<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "link.upsert_many") {
                return Err(err);
            }
            if state.lagged {
                state.staged_links.extend_from_slice(links);
                return Ok(());
            }
            for link in links {
                apply_link(&mut state.links, *link);
            }
            Ok(())
        }

        fn list_by_company(&self, company: CompanyId) -> StoreResult<Vec<ResponsibilityLink>> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = Self::take_fault(&mut state, "link.list_by_company") {
                return Err(err);
            }
            Ok(state
                .links
                .iter()
                .filter(|l| l.company_id == company)
                .copied()
                .collect())
        }
    }

    impl<'a> From<&'a MemoryDirectory> for Stores<'a> {
        fn from(dir: &'a MemoryDirectory) -> Self {
            Stores {
                companies: dir,
                departments: dir,
                persons: dir,
                links: dir,
            }
        }
    }
}
