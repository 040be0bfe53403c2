//! Twenty CRM operations over GraphQL.
//!
//! Each operation is a fixed document plus typed `input` variables. The
//! [`CrmApi`] trait is the seam the sync pipeline depends on; [`TwentyCrm`]
//! implements it on top of the retrying [`GraphqlClient`].

use crate::errors::CrmError;
use crate::graphql_client::GraphqlClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FIND_COMPANY_QUERY: &str = r#"
  query FindCompany($filter: CompanyFilterInput!) {
    companies(filter: $filter, first: 1) {
      edges {
        node { id name }
      }
    }
  }
"#;

pub const CREATE_COMPANY_MUTATION: &str = r#"
  mutation CreateCompany($input: CompanyCreateInput!) {
    createCompanies(data: [$input]) {
      id
      name
    }
  }
"#;

pub const FIND_PERSON_QUERY: &str = r#"
  query FindPersonByEmail($email: String!) {
    people(filter: { emails: { primaryEmail: { eq: $email } } }, first: 1) {
      edges {
        node { id }
      }
    }
  }
"#;

pub const CREATE_PERSON_MUTATION: &str = r#"
  mutation CreatePerson($input: PersonCreateInput!) {
    createPerson(data: $input) {
      id
    }
  }
"#;

pub const CREATE_OPPORTUNITY_MUTATION: &str = r#"
  mutation CreateOpportunity($input: OpportunityCreateInput!) {
    createOpportunity(data: $input) {
      id
      stage
    }
  }
"#;

pub const CREATE_TASK_MUTATION: &str = r#"
  mutation CreateTask($input: TaskCreateInput!) {
    createTask(data: $input) {
      id
    }
  }
"#;

pub const CREATE_TASK_TARGET_MUTATION: &str = r#"
  mutation CreateTaskTarget($input: TaskTargetCreateInput!) {
    createTaskTarget(data: $input) {
      id
    }
  }
"#;

pub const CREATE_NOTE_MUTATION: &str = r#"
  mutation CreateNote($input: NoteCreateInput!) {
    createNote(data: $input) {
      id
    }
  }
"#;

pub const CREATE_NOTE_TARGET_MUTATION: &str = r#"
  mutation CreateNoteTarget($input: NoteTargetCreateInput!) {
    createNoteTarget(data: $input) {
      id
    }
  }
"#;

/// How an existing company is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyFilter {
    Domain(String),
    Name(String),
}

impl CompanyFilter {
    pub fn to_variables(&self) -> Value {
        match self {
            CompanyFilter::Domain(domain) => {
                json!({ "domainName": { "primaryLinkUrl": { "eq": domain } } })
            }
            CompanyFilter::Name(name) => json!({ "name": { "eq": name } }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInput {
    pub primary_link_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<LinkInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Emails {
    pub primary_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInput {
    pub name: FullName,
    pub emails: Emails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityInput {
    pub stage: String,
    pub company_id: String,
    pub point_of_contact_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInput {
    pub title: String,
    pub status: String,
}

/// Rich text body: a BlockNote JSON document plus its markdown rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RichTextInput {
    pub blocknote: String,
    pub markdown: String,
}

impl RichTextInput {
    /// Single-paragraph body carrying the same text in both representations.
    pub fn paragraph(text: &str) -> Self {
        Self {
            blocknote: json!([{ "type": "paragraph", "content": text }]).to_string(),
            markdown: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    pub title: String,
    pub body_v2: RichTextInput,
}

/// The single record a Note target points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Person(String),
    Company(String),
    Opportunity(String),
}

impl TargetRef {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetRef::Person(_) => "person",
            TargetRef::Company(_) => "company",
            TargetRef::Opportunity(_) => "opportunity",
        }
    }

    fn split(&self) -> (Option<String>, Option<String>, Option<String>) {
        match self {
            TargetRef::Person(id) => (Some(id.clone()), None, None),
            TargetRef::Company(id) => (None, Some(id.clone()), None),
            TargetRef::Opportunity(id) => (None, None, Some(id.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTargetInput {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}

/// Tasks link to people and companies only.
impl TaskTargetInput {
    pub fn person(task_id: &str, person_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            person_id: Some(person_id.to_string()),
            company_id: None,
        }
    }

    pub fn company(task_id: &str, company_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            person_id: None,
            company_id: Some(company_id.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        if self.person_id.is_some() {
            "person"
        } else {
            "company"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTargetInput {
    pub note_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
}

impl NoteTargetInput {
    pub fn new(note_id: &str, target: &TargetRef) -> Self {
        let (person_id, company_id, opportunity_id) = target.split();
        Self {
            note_id: note_id.to_string(),
            person_id,
            company_id,
            opportunity_id,
        }
    }
}

/// CRM record operations used by the sync pipeline.
///
/// Lookups return `Ok(None)` when nothing matches. Creations return `Ok(None)`
/// when the response carried no id.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn find_company(&self, filter: &CompanyFilter) -> Result<Option<String>, CrmError>;
    async fn create_company(&self, input: &CompanyInput) -> Result<Option<String>, CrmError>;
    async fn find_person_by_email(&self, email: &str) -> Result<Option<String>, CrmError>;
    async fn create_person(&self, input: &PersonInput) -> Result<Option<String>, CrmError>;
    async fn create_opportunity(
        &self,
        input: &OpportunityInput,
    ) -> Result<Option<String>, CrmError>;
    async fn create_task(&self, input: &TaskInput) -> Result<Option<String>, CrmError>;
    async fn create_task_target(
        &self,
        input: &TaskTargetInput,
    ) -> Result<Option<String>, CrmError>;
    async fn create_note(&self, input: &NoteInput) -> Result<Option<String>, CrmError>;
    async fn create_note_target(
        &self,
        input: &NoteTargetInput,
    ) -> Result<Option<String>, CrmError>;
}

#[derive(Debug, Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    id: String,
}

/// Id of the first node of a `{ edges: [{ node: { id } }] }` connection.
fn first_node_id(data: &Value, field: &str) -> Result<Option<String>, CrmError> {
    let Some(connection) = data.get(field).filter(|v| !v.is_null()) else {
        return Ok(None);
    };

    let connection: Connection = serde_json::from_value(connection.clone()).map_err(|e| {
        CrmError::InvalidResponse(format!("malformed '{}' connection: {}", field, e))
    })?;

    Ok(connection.edges.into_iter().next().map(|edge| edge.node.id))
}

/// Id of a created record; batch mutations return an array, take the first.
fn created_id(data: &Value, field: &str) -> Option<String> {
    let record = match data.get(field)? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    record.get("id")?.as_str().map(str::to_string)
}

/// [`CrmApi`] backed by the Twenty GraphQL endpoint.
#[derive(Clone)]
pub struct TwentyCrm {
    client: GraphqlClient,
}

impl TwentyCrm {
    pub fn new(client: GraphqlClient) -> Self {
        Self { client }
    }

    async fn create(
        &self,
        document: &str,
        field: &str,
        input: Value,
    ) -> Result<Option<String>, CrmError> {
        let data = self.client.call(document, json!({ "input": input })).await?;
        let id = created_id(&data, field);
        if id.is_none() {
            tracing::warn!("Twenty response for '{}' carried no id: {}", field, data);
        }
        Ok(id)
    }
}

fn to_input<T: Serialize>(input: &T) -> Result<Value, CrmError> {
    serde_json::to_value(input)
        .map_err(|e| CrmError::InvalidResponse(format!("Failed to serialize input: {}", e)))
}

#[async_trait]
impl CrmApi for TwentyCrm {
    async fn find_company(&self, filter: &CompanyFilter) -> Result<Option<String>, CrmError> {
        let data = self
            .client
            .call(FIND_COMPANY_QUERY, json!({ "filter": filter.to_variables() }))
            .await?;
        first_node_id(&data, "companies")
    }

    async fn create_company(&self, input: &CompanyInput) -> Result<Option<String>, CrmError> {
        self.create(CREATE_COMPANY_MUTATION, "createCompanies", to_input(input)?)
            .await
    }

    async fn find_person_by_email(&self, email: &str) -> Result<Option<String>, CrmError> {
        let data = self
            .client
            .call(FIND_PERSON_QUERY, json!({ "email": email }))
            .await?;
        first_node_id(&data, "people")
    }

    async fn create_person(&self, input: &PersonInput) -> Result<Option<String>, CrmError> {
        self.create(CREATE_PERSON_MUTATION, "createPerson", to_input(input)?)
            .await
    }

    async fn create_opportunity(
        &self,
        input: &OpportunityInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(
            CREATE_OPPORTUNITY_MUTATION,
            "createOpportunity",
            to_input(input)?,
        )
        .await
    }

    async fn create_task(&self, input: &TaskInput) -> Result<Option<String>, CrmError> {
        self.create(CREATE_TASK_MUTATION, "createTask", to_input(input)?)
            .await
    }

    async fn create_task_target(
        &self,
        input: &TaskTargetInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(
            CREATE_TASK_TARGET_MUTATION,
            "createTaskTarget",
            to_input(input)?,
        )
        .await
    }

    async fn create_note(&self, input: &NoteInput) -> Result<Option<String>, CrmError> {
        self.create(CREATE_NOTE_MUTATION, "createNote", to_input(input)?)
            .await
    }

    async fn create_note_target(
        &self,
        input: &NoteTargetInput,
    ) -> Result<Option<String>, CrmError> {
        self.create(
            CREATE_NOTE_TARGET_MUTATION,
            "createNoteTarget",
            to_input(input)?,
        )
        .await
    }
}
