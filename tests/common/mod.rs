//! In-memory `CrmApi` used by the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use smartlead_twenty_bridge::errors::CrmError;
use smartlead_twenty_bridge::twenty::{
    CompanyFilter, CompanyInput, CrmApi, NoteInput, NoteTargetInput, OpportunityInput,
    PersonInput, TaskInput, TaskTargetInput,
};
use smartlead_twenty_bridge::webhook_models::SmartleadWebhookPayload;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FindCompany(CompanyFilter),
    CreateCompany(CompanyInput),
    FindPerson(String),
    CreatePerson(PersonInput),
    CreateOpportunity(OpportunityInput),
    CreateTask(TaskInput),
    CreateTaskTarget(TaskTargetInput),
    CreateNote(NoteInput),
    CreateNoteTarget(NoteTargetInput),
}

impl Call {
    pub fn op(&self) -> &'static str {
        match self {
            Call::FindCompany(_) => "find_company",
            Call::CreateCompany(_) => "create_company",
            Call::FindPerson(_) => "find_person",
            Call::CreatePerson(_) => "create_person",
            Call::CreateOpportunity(_) => "create_opportunity",
            Call::CreateTask(_) => "create_task",
            Call::CreateTaskTarget(_) => "create_task_target",
            Call::CreateNote(_) => "create_note",
            Call::CreateNoteTarget(_) => "create_note_target",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::FindCompany(_) | Call::FindPerson(_))
    }
}

#[derive(Default)]
struct FakeState {
    companies_by_domain: HashMap<String, String>,
    companies_by_name: HashMap<String, String>,
    people_by_email: HashMap<String, String>,
    failing: HashSet<&'static str>,
    failing_calls: Vec<fn(&Call) -> bool>,
    without_id: HashSet<&'static str>,
    calls: Vec<Call>,
    next_id: u32,
}

/// Records every call; ops can be made to fail or to return no id.
#[derive(Default)]
pub struct FakeCrm {
    state: Mutex<FakeState>,
}

impl FakeCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company_domain(self, domain: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .companies_by_domain
            .insert(domain.to_string(), id.to_string());
        self
    }

    pub fn with_company_name(self, name: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .companies_by_name
            .insert(name.to_string(), id.to_string());
        self
    }

    pub fn with_person(self, email: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .people_by_email
            .insert(email.to_string(), id.to_string());
        self
    }

    pub fn failing(self, op: &'static str) -> Self {
        self.state.lock().unwrap().failing.insert(op);
        self
    }

    /// Fails only the calls matching `predicate`, e.g. one target kind.
    pub fn failing_when(self, predicate: fn(&Call) -> bool) -> Self {
        self.state.lock().unwrap().failing_calls.push(predicate);
        self
    }

    pub fn without_id(self, op: &'static str) -> Self {
        self.state.lock().unwrap().without_id.insert(op);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutation()).count()
    }

    fn lookup(&self, call: Call, found: Option<String>) -> Result<Option<String>, CrmError> {
        let mut state = self.state.lock().unwrap();
        let op = call.op();
        let fails = state.failing.contains(op) || state.failing_calls.iter().any(|p| p(&call));
        state.calls.push(call);
        if fails {
            return Err(failure());
        }
        Ok(found)
    }

    fn create(&self, call: Call, prefix: &str) -> Result<Option<String>, CrmError> {
        let mut state = self.state.lock().unwrap();
        let op = call.op();
        let fails = state.failing.contains(op) || state.failing_calls.iter().any(|p| p(&call));
        state.calls.push(call);
        if fails {
            return Err(failure());
        }
        if state.without_id.contains(op) {
            return Ok(None);
        }
        state.next_id += 1;
        Ok(Some(format!("{}-{}", prefix, state.next_id)))
    }
}

fn failure() -> CrmError {
    CrmError::Exhausted {
        attempts: 3,
        last: Box::new(CrmError::Server { status: 503 }),
    }
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn find_company(&self, filter: &CompanyFilter) -> Result<Option<String>, CrmError> {
        let found = {
            let state = self.state.lock().unwrap();
            match filter {
                CompanyFilter::Domain(d) => state.companies_by_domain.get(d).cloned(),
                CompanyFilter::Name(n) => state.companies_by_name.get(n).cloned(),
            }
        };
        self.lookup(Call::FindCompany(filter.clone()), found)
    }

    async fn create_company(&self, input: &CompanyInput) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateCompany(input.clone()), "company")
    }

    async fn find_person_by_email(&self, email: &str) -> Result<Option<String>, CrmError> {
        let found = self.state.lock().unwrap().people_by_email.get(email).cloned();
        self.lookup(Call::FindPerson(email.to_string()), found)
    }

    async fn create_person(&self, input: &PersonInput) -> Result<Option<String>, CrmError> {
        self.create(Call::CreatePerson(input.clone()), "person")
    }

    async fn create_opportunity(
        &self,
        input: &OpportunityInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateOpportunity(input.clone()), "opportunity")
    }

    async fn create_task(&self, input: &TaskInput) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateTask(input.clone()), "task")
    }

    async fn create_task_target(
        &self,
        input: &TaskTargetInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateTaskTarget(input.clone()), "task-target")
    }

    async fn create_note(&self, input: &NoteInput) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateNote(input.clone()), "note")
    }

    async fn create_note_target(
        &self,
        input: &NoteTargetInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(Call::CreateNoteTarget(input.clone()), "note-target")
    }
}

pub fn payload(value: serde_json::Value) -> SmartleadWebhookPayload {
    serde_json::from_value(value).expect("payload should deserialize")
}
