use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Event type that can trigger an Opportunity.
pub const LEAD_CATEGORY_UPDATED: &str = "LEAD_CATEGORY_UPDATED";

/// A field of the wrong type reads as absent instead of failing the payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// SmartLead webhook payload. Every field is optional so incomplete events
/// still deserialize and can be acknowledged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SmartleadWebhookPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub event_type: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub lead_category: Option<LeadCategory>,

    #[serde(default, deserialize_with = "lenient")]
    pub lead_data: Option<LeadData>,

    #[serde(default, deserialize_with = "lenient")]
    pub email_content: Option<EmailContent>,

    /// Raw data for any additional fields
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeadCategory {
    #[serde(default, deserialize_with = "lenient")]
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeadData {
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub website: Option<String>,
    #[serde(rename = "jobTitle", default, deserialize_with = "lenient")]
    pub job_title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmailContent {
    #[serde(default, deserialize_with = "lenient")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub body_text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub body_html: Option<String>,
}

/// Lead fields after normalization; blank strings count as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFields {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub website: Option<String>,
    pub job_title: Option<String>,
    pub city: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl SmartleadWebhookPayload {
    /// Parses a raw request body.
    ///
    /// An empty body reads as `{}`. Any JSON value that is not an object
    /// yields an empty payload. Only a syntactically invalid body is an error.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_slice(body)?;
        Ok(match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Unexpected webhook payload shape: {}", e);
                Self::default()
            }),
            other => {
                tracing::warn!("Webhook payload is not a JSON object: {}", other);
                Self::default()
            }
        })
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref().filter(|s| !s.is_empty())
    }

    pub fn category(&self) -> Option<&str> {
        self.lead_category
            .as_ref()
            .and_then(|c| c.new_name.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn email_subject(&self) -> Option<&str> {
        self.email_content
            .as_ref()
            .and_then(|c| c.subject.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Extracts the lead, or `None` when `lead_data` or its email is missing.
    pub fn lead_fields(&self) -> Option<LeadFields> {
        let lead = self.lead_data.as_ref()?;
        let email = present(&lead.email)?;

        Some(LeadFields {
            email,
            first_name: present(&lead.first_name).unwrap_or_default(),
            last_name: present(&lead.last_name).unwrap_or_default(),
            company_name: present(&lead.company_name),
            website: present(&lead.website),
            job_title: present(&lead.job_title),
            city: present(&lead.city),
        })
    }
}

/// Response sent back to SmartLead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_update() {
        let json = r#"
        {
            "event_type": "LEAD_CATEGORY_UPDATED",
            "lead_category": { "new_name": "Interested", "old_name": "Contacted" },
            "lead_data": {
                "email": "a@b.com",
                "first_name": "A",
                "last_name": "B",
                "company_name": "Acme",
                "website": "https://www.acme.com",
                "jobTitle": "CTO"
            },
            "email_content": { "subject": "Re: hello" },
            "campaign_id": 42
        }
        "#;

        let payload: SmartleadWebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.event_type(), Some(LEAD_CATEGORY_UPDATED));
        assert_eq!(payload.category(), Some("Interested"));
        assert_eq!(payload.email_subject(), Some("Re: hello"));
        assert_eq!(payload.raw.get("campaign_id"), Some(&serde_json::json!(42)));

        let lead = payload.lead_fields().unwrap();
        assert_eq!(lead.email, "a@b.com");
        assert_eq!(lead.job_title.as_deref(), Some("CTO"));
        assert_eq!(lead.city, None);
    }

    #[test]
    fn test_missing_email_yields_no_lead() {
        let payload: SmartleadWebhookPayload =
            serde_json::from_str(r#"{"event_type":"EMAIL_REPLY","lead_data":{"first_name":"A"}}"#)
                .unwrap();
        assert!(payload.lead_fields().is_none());

        let blank: SmartleadWebhookPayload =
            serde_json::from_str(r#"{"lead_data":{"email":"  "}}"#).unwrap();
        assert!(blank.lead_fields().is_none());

        let empty: SmartleadWebhookPayload = serde_json::from_str("{}").unwrap();
        assert!(empty.lead_fields().is_none());
        assert_eq!(empty.event_type(), None);
    }

    #[test]
    fn test_wrong_types_read_as_absent() {
        let payload = SmartleadWebhookPayload::from_body(
            br#"{
                "event_type": 7,
                "lead_category": "Interested",
                "lead_data": { "email": "a@b.com", "first_name": 42, "jobTitle": ["x"] },
                "email_content": { "subject": { "nested": true } }
            }"#,
        )
        .unwrap();

        assert_eq!(payload.event_type(), None);
        assert_eq!(payload.category(), None);
        assert_eq!(payload.email_subject(), None);
        let lead = payload.lead_fields().unwrap();
        assert_eq!(lead.email, "a@b.com");
        assert_eq!(lead.first_name, "");
        assert_eq!(lead.job_title, None);
    }

    #[test]
    fn test_non_object_bodies_yield_no_lead() {
        let bodies: [&[u8]; 7] = [
            br#"{"lead_data":"oops"}"#,
            br#"{"lead_data":{"email":42}}"#,
            b"[]",
            b"\"text\"",
            b"null",
            b"",
            b"  \n",
        ];
        for body in bodies {
            let payload = SmartleadWebhookPayload::from_body(body).unwrap();
            assert!(payload.lead_fields().is_none());
        }
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(SmartleadWebhookPayload::from_body(b"{not json").is_err());
        assert!(SmartleadWebhookPayload::from_body(b"{\"lead_data\":").is_err());
    }

    #[test]
    fn test_blank_names_default_to_empty() {
        let payload: SmartleadWebhookPayload = serde_json::from_str(
            r#"{"lead_data":{"email":"x@y.com","first_name":null,"company_name":""}}"#,
        )
        .unwrap();
        let lead = payload.lead_fields().unwrap();
        assert_eq!(lead.first_name, "");
        assert_eq!(lead.last_name, "");
        assert_eq!(lead.company_name, None);
    }
}
