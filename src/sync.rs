//! Event classification and CRM outcome building for one webhook delivery.
//!
//! The flow is strictly sequential: company, person, then either an
//! Opportunity or a review Task, then an activity Note. Every step after
//! the two lookups is best-effort and only recorded in the [`SyncReport`].

use crate::errors::CrmError;
use crate::resolver::{resolve_company, resolve_person};
use crate::twenty::{
    CrmApi, NoteInput, NoteTargetInput, OpportunityInput, RichTextInput, TargetRef, TaskInput,
    TaskTargetInput,
};
use crate::webhook_models::{LeadFields, SmartleadWebhookPayload, LEAD_CATEGORY_UPDATED};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Status given to every review task on creation.
pub const TASK_INITIAL_STATUS: &str = "TODO";

/// What the event asks for once entities are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Opportunity { stage: String },
    Review,
}

/// Positive-category set and category → stage table.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    trigger_event: String,
    positive_categories: Vec<String>,
    stage_map: HashMap<String, String>,
    default_stage: String,
}

impl Default for EventClassifier {
    fn default() -> Self {
        let stages = [
            ("Interested", "INTERESTED"),
            ("Information Request", "INFORMATIONREQUEST"),
            ("Meeting Request", "MEETINGREQUEST"),
        ];

        Self {
            trigger_event: LEAD_CATEGORY_UPDATED.to_string(),
            positive_categories: stages.iter().map(|(c, _)| c.to_string()).collect(),
            stage_map: stages
                .iter()
                .map(|(c, s)| (c.to_string(), s.to_string()))
                .collect(),
            default_stage: "INTERESTED".to_string(),
        }
    }
}

impl EventClassifier {
    pub fn new(
        positive_categories: Vec<String>,
        stage_map: HashMap<String, String>,
        default_stage: impl Into<String>,
    ) -> Self {
        Self {
            trigger_event: LEAD_CATEGORY_UPDATED.to_string(),
            positive_categories,
            stage_map,
            default_stage: default_stage.into(),
        }
    }

    pub fn is_positive(&self, category: &str) -> bool {
        self.positive_categories.iter().any(|c| c == category)
    }

    /// CRM stage for a positive category; unmapped ones get the default stage.
    pub fn stage_for(&self, category: &str) -> &str {
        self.stage_map
            .get(category)
            .map(String::as_str)
            .unwrap_or(&self.default_stage)
    }

    pub fn classify(&self, event_type: Option<&str>, category: Option<&str>) -> Classification {
        match (event_type, category) {
            (Some(event), Some(category))
                if event == self.trigger_event && self.is_positive(category) =>
            {
                Classification::Opportunity {
                    stage: self.stage_for(category).to_string(),
                }
            }
            _ => Classification::Review,
        }
    }
}

pub fn opportunity_name(lead: &LeadFields, category: &str) -> String {
    format!(
        "Deal for {} {} ({})",
        lead.first_name, lead.last_name, category
    )
}

pub fn task_title(event_type: Option<&str>, category: Option<&str>) -> String {
    format!(
        "SmartLead: Review {}",
        category.or(event_type).unwrap_or("Interaction")
    )
}

pub fn note_title(event_type: Option<&str>, category: Option<&str>) -> String {
    format!(
        "SmartLead: {}",
        category.or(event_type).unwrap_or("Interaction Event")
    )
}

pub fn note_body(
    event_type: Option<&str>,
    category: Option<&str>,
    email: &str,
    subject: Option<&str>,
) -> String {
    let mut body = format!(
        "SmartLead webhook received. Event: '{}'.",
        event_type.unwrap_or("unknown")
    );
    if let Some(category) = category {
        body.push_str(&format!(" Category: '{}'.", category));
    }
    body.push_str(&format!(" Lead: {}.", email));
    if let Some(subject) = subject {
        body.push_str(&format!(" Subject: \"{}\"", subject));
    }
    body
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    ResolveCompany,
    ResolvePerson,
    CreateOpportunity,
    CreateTask,
    LinkTask(&'static str),
    CreateNote,
    LinkNote(&'static str),
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStep::ResolveCompany => write!(f, "resolve_company"),
            SyncStep::ResolvePerson => write!(f, "resolve_person"),
            SyncStep::CreateOpportunity => write!(f, "create_opportunity"),
            SyncStep::CreateTask => write!(f, "create_task"),
            SyncStep::LinkTask(kind) => write!(f, "link_task_{}", kind),
            SyncStep::CreateNote => write!(f, "create_note"),
            SyncStep::LinkNote(kind) => write!(f, "link_note_{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Found(String),
    Created(String),
    Skipped(String),
    Failed(String),
}

impl StepStatus {
    pub fn id(&self) -> Option<&str> {
        match self {
            StepStatus::Found(id) | StepStatus::Created(id) => Some(id),
            StepStatus::Skipped(_) | StepStatus::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }

    fn from_creation(label: &str, result: Result<Option<String>, CrmError>) -> Self {
        match result {
            Ok(Some(id)) => StepStatus::Created(id),
            Ok(None) => {
                tracing::warn!("Failed to {}: no id returned", label);
                StepStatus::Failed(format!("{} returned no id", label))
            }
            Err(e) => {
                tracing::warn!("Failed to {}: {}", label, e);
                StepStatus::Failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: SyncStep,
    pub status: StepStatus,
}

/// Ids produced for one delivery plus the ordered log of every step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub company_id: Option<String>,
    pub person_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub task_id: Option<String>,
    pub note_id: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl SyncReport {
    fn record(&mut self, step: SyncStep, status: StepStatus) -> Option<String> {
        let id = status.id().map(str::to_string);
        self.steps.push(StepRecord { step, status });
        id
    }

    pub fn status_of(&self, step: SyncStep) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }

    pub fn failures(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|r| r.status.is_failure()).collect()
    }

    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|r| {
                let outcome = match &r.status {
                    StepStatus::Found(_) => "found",
                    StepStatus::Created(_) => "created",
                    StepStatus::Skipped(_) => "skipped",
                    StepStatus::Failed(_) => "failed",
                };
                format!("{}={}", r.step, outcome)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Mirrors one SmartLead event into the CRM.
#[derive(Clone)]
pub struct LeadSync {
    crm: Arc<dyn CrmApi>,
    classifier: EventClassifier,
}

impl LeadSync {
    pub fn new(crm: Arc<dyn CrmApi>, classifier: EventClassifier) -> Self {
        Self { crm, classifier }
    }

    /// Runs the whole sync. Only a failed company or person lookup returns `Err`.
    pub async fn process(
        &self,
        payload: &SmartleadWebhookPayload,
        lead: &LeadFields,
    ) -> Result<SyncReport, CrmError> {
        let crm = self.crm.as_ref();
        let event_type = payload.event_type();
        let category = payload.category();
        let mut report = SyncReport::default();

        tracing::info!(
            event_type = event_type.unwrap_or("unknown"),
            category = category.unwrap_or("none"),
            lead = %lead.email,
            "Processing SmartLead webhook"
        );

        let status = resolve_company(
            crm,
            lead.company_name.as_deref(),
            lead.website.as_deref(),
        )
        .await?;
        report.company_id = report.record(SyncStep::ResolveCompany, status);

        let status = resolve_person(crm, lead, report.company_id.as_deref()).await?;
        report.person_id = report.record(SyncStep::ResolvePerson, status);

        let classification = self.classifier.classify(event_type, category);
        let company_id = report.company_id.clone();
        let person_id = report.person_id.clone();

        match (&classification, company_id.as_deref(), person_id.as_deref()) {
            (Classification::Opportunity { stage }, Some(company_id), Some(person_id)) => {
                let input = OpportunityInput {
                    stage: stage.clone(),
                    company_id: company_id.to_string(),
                    point_of_contact_id: person_id.to_string(),
                    name: opportunity_name(lead, category.unwrap_or_default()),
                };
                tracing::info!(stage = %stage, "Positive category, creating opportunity");
                let status = StepStatus::from_creation(
                    "create opportunity",
                    crm.create_opportunity(&input).await,
                );
                report.opportunity_id = report.record(SyncStep::CreateOpportunity, status);
            }
            (_, _, person) => {
                if matches!(classification, Classification::Opportunity { .. }) {
                    tracing::warn!(
                        "Skipping opportunity: requires both company and person (company={:?}, person={:?})",
                        company_id,
                        person_id
                    );
                    report.record(
                        SyncStep::CreateOpportunity,
                        StepStatus::Skipped("requires both company and person".to_string()),
                    );
                }

                if let Some(person_id) = person {
                    self.create_review_task(
                        &mut report,
                        event_type,
                        category,
                        person_id,
                        company_id.as_deref(),
                    )
                    .await;
                } else {
                    tracing::info!(
                        "No opportunity or task for category {:?} / event {:?}: no person resolved",
                        category,
                        event_type
                    );
                }
            }
        }

        if report.person_id.is_some() || report.company_id.is_some() {
            self.create_activity_note(&mut report, payload, lead).await;
        } else {
            report.record(
                SyncStep::CreateNote,
                StepStatus::Skipped("no person or company resolved".to_string()),
            );
        }

        tracing::info!("SmartLead sync finished: {}", report.summary());
        Ok(report)
    }

    async fn create_review_task(
        &self,
        report: &mut SyncReport,
        event_type: Option<&str>,
        category: Option<&str>,
        person_id: &str,
        company_id: Option<&str>,
    ) {
        let input = TaskInput {
            title: task_title(event_type, category),
            status: TASK_INITIAL_STATUS.to_string(),
        };
        tracing::info!("Creating review task: \"{}\"", input.title);

        let status = StepStatus::from_creation("create task", self.crm.create_task(&input).await);
        report.task_id = report.record(SyncStep::CreateTask, status);
        let Some(task_id) = report.task_id.clone() else {
            return;
        };

        let mut targets = vec![TaskTargetInput::person(&task_id, person_id)];
        if let Some(company_id) = company_id {
            targets.push(TaskTargetInput::company(&task_id, company_id));
        }

        for input in targets {
            let status = StepStatus::from_creation(
                "create task target",
                self.crm.create_task_target(&input).await,
            );
            report.record(SyncStep::LinkTask(input.kind()), status);
        }
    }

    async fn create_activity_note(
        &self,
        report: &mut SyncReport,
        payload: &SmartleadWebhookPayload,
        lead: &LeadFields,
    ) {
        let event_type = payload.event_type();
        let category = payload.category();
        let body = note_body(event_type, category, &lead.email, payload.email_subject());
        let input = NoteInput {
            title: note_title(event_type, category),
            body_v2: RichTextInput::paragraph(&body),
        };
        tracing::info!("Creating activity log note: \"{}\"", input.title);

        let status = StepStatus::from_creation("create note", self.crm.create_note(&input).await);
        report.note_id = report.record(SyncStep::CreateNote, status);
        let Some(note_id) = report.note_id.clone() else {
            return;
        };

        let targets: Vec<TargetRef> = [
            report.person_id.clone().map(TargetRef::Person),
            report.company_id.clone().map(TargetRef::Company),
            report.opportunity_id.clone().map(TargetRef::Opportunity),
        ]
        .into_iter()
        .flatten()
        .collect();

        for target in targets {
            let input = NoteTargetInput::new(&note_id, &target);
            let status = StepStatus::from_creation(
                "create note target",
                self.crm.create_note_target(&input).await,
            );
            report.record(SyncStep::LinkNote(target.kind()), status);
        }
    }
}
