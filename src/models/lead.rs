use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadQuality {
    Good,
    Ok,
    Spam,
}

impl fmt::Display for LeadQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeadQuality::Good => "good",
            LeadQuality::Ok => "ok",
            LeadQuality::Spam => "spam",
        };
        write!(f, "{}", s)
    }
}

/// Customer details extracted from a conversation.
///
/// Replaced wholesale on every analysis run; only webhook enrichment
/// overrides individual fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_industry: Option<String>,
    pub customer_problem: Option<String>,
    pub customer_availability: Option<String>,
    #[serde(default)]
    pub customer_consultation: bool,
    pub special_notes: Option<String>,
    pub lead_quality: LeadQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_processed: Option<bool>,
}

impl LeadRecord {
    /// Record used when the model output cannot be turned into a lead.
    pub fn degraded(reason: &str) -> Self {
        Self {
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            customer_industry: None,
            customer_problem: None,
            customer_availability: None,
            customer_consultation: false,
            special_notes: Some(format!("Analysis failed - {}", reason)),
            lead_quality: LeadQuality::Ok,
            webhook_notes: None,
            webhook_status: None,
            webhook_processed: None,
        }
    }

    pub fn has_contact_details(&self) -> bool {
        self.customer_email.is_some() || self.customer_phone.is_some()
    }

    /// Applies overrides returned by the webhook receiver.
    ///
    /// Empty strings and values of the wrong type are ignored. Returns whether
    /// anything changed.
    pub fn merge_webhook_response(&mut self, response: &JsonValue) -> bool {
        let Some(obj) = response.as_object() else {
            return false;
        };
        let mut changed = false;

        let text = |key: &str| -> Option<String> {
            obj.get(key)
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let fields: [(&str, &mut Option<String>); 9] = [
            ("customerName", &mut self.customer_name),
            ("customerEmail", &mut self.customer_email),
            ("customerPhone", &mut self.customer_phone),
            ("customerIndustry", &mut self.customer_industry),
            ("customerProblem", &mut self.customer_problem),
            ("customerAvailability", &mut self.customer_availability),
            ("specialNotes", &mut self.special_notes),
            ("webhookNotes", &mut self.webhook_notes),
            ("webhookStatus", &mut self.webhook_status),
        ];
        for (key, slot) in fields {
            if let Some(value) = text(key) {
                *slot = Some(value);
                changed = true;
            }
        }

        if let Some(flag) = obj.get("customerConsultation").and_then(JsonValue::as_bool) {
            self.customer_consultation = flag;
            changed = true;
        }
        if let Some(flag) = obj.get("webhookProcessed").and_then(JsonValue::as_bool) {
            self.webhook_processed = Some(flag);
            changed = true;
        }
        if let Some(quality) = obj
            .get("leadQuality")
            .and_then(|v| serde_json::from_value::<LeadQuality>(v.clone()).ok())
        {
            self.lead_quality = quality;
            changed = true;
        }

        changed
    }
}

/// Shape the extraction model is asked to return. Field types are enforced
/// by deserialization; anything else is a parse failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedLead {
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_phone: Option<String>,
    #[serde(default)]
    customer_industry: Option<String>,
    #[serde(default)]
    customer_problem: Option<String>,
    #[serde(default)]
    customer_availability: Option<String>,
    #[serde(default)]
    customer_consultation: Option<bool>,
    #[serde(default)]
    special_notes: Option<String>,
    lead_quality: LeadQuality,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl From<ExtractedLead> for LeadRecord {
    fn from(raw: ExtractedLead) -> Self {
        Self {
            customer_name: non_blank(raw.customer_name),
            customer_email: non_blank(raw.customer_email),
            customer_phone: non_blank(raw.customer_phone),
            customer_industry: non_blank(raw.customer_industry),
            customer_problem: non_blank(raw.customer_problem),
            customer_availability: non_blank(raw.customer_availability),
            customer_consultation: raw.customer_consultation.unwrap_or(false),
            special_notes: non_blank(raw.special_notes),
            lead_quality: raw.lead_quality,
            webhook_notes: None,
            webhook_status: None,
            webhook_processed: None,
        }
    }
}

/// Span from the first `{` to the last `}`, if any.
fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses a model reply into a `LeadRecord`.
///
/// Tries the outermost `{...}` span first, then the raw text.
pub fn parse_lead_response(text: &str) -> Result<LeadRecord, serde_json::Error> {
    let trimmed = text.trim();
    if let Some(candidate) = outermost_braces(trimmed) {
        if let Ok(lead) = serde_json::from_str::<ExtractedLead>(candidate) {
            return Ok(lead.into());
        }
    }
    serde_json::from_str::<ExtractedLead>(trimmed).map(LeadRecord::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = "Here you go:\n```json\n{\"customerName\": \"Lan\", \"customerEmail\": \"lan@example.com\", \
            \"customerConsultation\": true, \"leadQuality\": \"good\"}\n```";
        let lead = parse_lead_response(reply).unwrap();
        assert_eq!(lead.customer_name.as_deref(), Some("Lan"));
        assert_eq!(lead.customer_email.as_deref(), Some("lan@example.com"));
        assert!(lead.customer_consultation);
        assert_eq!(lead.lead_quality, LeadQuality::Good);
        assert_eq!(lead.customer_phone, None);
    }

    #[test]
    fn blank_strings_become_null() {
        let lead = parse_lead_response(
            r#"{"customerName": "  ", "customerPhone": "", "customerConsultation": null, "leadQuality": "spam"}"#
        ).unwrap();
        assert_eq!(lead.customer_name, None);
        assert_eq!(lead.customer_phone, None);
        assert!(!lead.customer_consultation);
    }

    #[test]
    fn rejects_fourth_quality_value() {
        assert!(parse_lead_response(r#"{"leadQuality": "excellent"}"#).is_err());
    }

    #[test]
    fn rejects_wrong_field_types() {
        assert!(parse_lead_response(r#"{"customerPhone": 84901234567, "leadQuality": "ok"}"#).is_err());
        assert!(parse_lead_response(r#"{"customerConsultation": "yes", "leadQuality": "ok"}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_lead_response("I could not find any customer details.").is_err());
        assert!(parse_lead_response("").is_err());
    }

    #[test]
    fn degraded_record_is_ok_without_contacts() {
        let lead = LeadRecord::degraded("could not parse response");
        assert_eq!(lead.lead_quality, LeadQuality::Ok);
        assert!(!lead.has_contact_details());
        assert!(!lead.customer_consultation);
        assert_eq!(
            lead.special_notes.as_deref(),
            Some("Analysis failed - could not parse response")
        );
    }

    #[test]
    fn webhook_merge_overrides_only_valid_fields() {
        let mut lead = LeadRecord::degraded("x");
        let changed = lead.merge_webhook_response(
            &json!({
                "customerName": "Minh",
                "customerEmail": "",
                "customerConsultation": true,
                "leadQuality": "premium",
                "webhookStatus": "queued",
                "webhookProcessed": true
            })
        );
        assert!(changed);
        assert_eq!(lead.customer_name.as_deref(), Some("Minh"));
        assert_eq!(lead.customer_email, None);
        assert!(lead.customer_consultation);
        assert_eq!(lead.lead_quality, LeadQuality::Ok);
        assert_eq!(lead.webhook_status.as_deref(), Some("queued"));
        assert_eq!(lead.webhook_processed, Some(true));
    }

    #[test]
    fn webhook_merge_ignores_non_objects() {
        let mut lead = LeadRecord::degraded("x");
        assert!(!lead.merge_webhook_response(&json!("accepted")));
        assert!(!lead.merge_webhook_response(&JsonValue::Null));
    }
}
