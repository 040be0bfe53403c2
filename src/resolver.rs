use crate::errors::CrmError;
use crate::sync::StepStatus;
use crate::twenty::{CompanyFilter, CompanyInput, CrmApi, Emails, FullName, LinkInput, PersonInput};
use crate::webhook_models::LeadFields;

/// Hostname of a website URL with a leading `www.` removed.
///
/// Returns `None` when the URL does not parse or has no host.
pub fn derive_domain(website: &str) -> Option<String> {
    let url = match url::Url::parse(website.trim()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Could not parse website URL '{}': {}", website, e);
            return None;
        }
    };

    let host = url.host_str().filter(|h| !h.is_empty())?;
    let domain = host.strip_prefix("www.").unwrap_or(host);
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

/// Lookup filter for a company: domain when known, else exact name.
pub fn company_filter(name: Option<&str>, domain: Option<&str>) -> Option<CompanyFilter> {
    match (domain, name) {
        (Some(domain), _) => Some(CompanyFilter::Domain(domain.to_string())),
        (None, Some(name)) => Some(CompanyFilter::Name(name.to_string())),
        (None, None) => None,
    }
}

/// Finds or creates the lead's company.
///
/// Lookup failures propagate. Creation failures are returned as
/// [`StepStatus::Failed`] so the rest of the sync can continue.
pub async fn resolve_company(
    crm: &dyn CrmApi,
    name: Option<&str>,
    website: Option<&str>,
) -> Result<StepStatus, CrmError> {
    let domain = website.and_then(derive_domain);
    if let Some(ref domain) = domain {
        tracing::debug!("Derived company domain: {}", domain);
    }

    let Some(filter) = company_filter(name, domain.as_deref()) else {
        tracing::debug!("No company name or domain, cannot find/create company");
        return Ok(StepStatus::Skipped("no company name or domain".to_string()));
    };

    tracing::debug!("Searching company with filter: {:?}", filter);
    if let Some(id) = crm.find_company(&filter).await? {
        tracing::info!(company_id = %id, "Found existing company");
        return Ok(StepStatus::Found(id));
    }

    let Some(name) = name else {
        tracing::debug!("Company not found and no name available to create it");
        return Ok(StepStatus::Skipped(
            "company not found and no name to create it".to_string(),
        ));
    };

    let input = CompanyInput {
        name: name.to_string(),
        domain_name: domain.map(|d| LinkInput {
            primary_link_url: format!("https://{}", d),
        }),
    };

    tracing::info!("Company not found. Creating: {}", name);
    Ok(match crm.create_company(&input).await {
        Ok(Some(id)) => {
            tracing::info!(company_id = %id, "Created company");
            StepStatus::Created(id)
        }
        Ok(None) => {
            tracing::error!("Failed to create company '{}': no id returned", name);
            StepStatus::Failed("create company returned no id".to_string())
        }
        Err(e) => {
            tracing::error!("Failed to create company '{}': {}", name, e);
            StepStatus::Failed(e.to_string())
        }
    })
}

/// Finds the lead by primary email or creates it, linked to `company_id` when known.
///
/// An existing person is returned as-is; its fields are never refreshed.
pub async fn resolve_person(
    crm: &dyn CrmApi,
    lead: &LeadFields,
    company_id: Option<&str>,
) -> Result<StepStatus, CrmError> {
    tracing::debug!("Searching person by email: {}", lead.email);
    if let Some(id) = crm.find_person_by_email(&lead.email).await? {
        tracing::info!(person_id = %id, "Found existing person");
        return Ok(StepStatus::Found(id));
    }

    let input = PersonInput {
        name: FullName {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
        },
        emails: Emails {
            primary_email: lead.email.clone(),
        },
        company_id: company_id.map(str::to_string),
        job_title: lead.job_title.clone(),
        city: lead.city.clone(),
    };

    tracing::info!(
        "Person not found. Creating: {} {}",
        lead.first_name,
        lead.last_name
    );
    Ok(match crm.create_person(&input).await {
        Ok(Some(id)) => {
            tracing::info!(person_id = %id, "Created person");
            StepStatus::Created(id)
        }
        Ok(None) => {
            tracing::error!("Failed to create person {}: no id returned", lead.email);
            StepStatus::Failed("create person returned no id".to_string())
        }
        Err(e) => {
            tracing::error!("Failed to create person {}: {}", lead.email, e);
            StepStatus::Failed(e.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_domain_strips_www() {
        assert_eq!(
            derive_domain("https://www.acme.com"),
            Some("acme.com".to_string())
        );
        assert_eq!(
            derive_domain("http://shop.acme.co.uk/path?q=1"),
            Some("shop.acme.co.uk".to_string())
        );
        assert_eq!(
            derive_domain("https://WWW.Acme.COM"),
            Some("acme.com".to_string())
        );
    }

    #[test]
    fn test_derive_domain_rejects_unparseable() {
        assert_eq!(derive_domain("acme.com"), None);
        assert_eq!(derive_domain("not a url"), None);
        assert_eq!(derive_domain(""), None);
    }

    #[test]
    fn test_company_filter_prefers_domain() {
        assert_eq!(
            company_filter(Some("Acme"), Some("acme.com")),
            Some(CompanyFilter::Domain("acme.com".to_string()))
        );
        assert_eq!(
            company_filter(Some("Acme"), None),
            Some(CompanyFilter::Name("Acme".to_string()))
        );
        assert_eq!(company_filter(None, None), None);
    }
}
