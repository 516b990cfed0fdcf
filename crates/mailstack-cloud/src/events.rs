//! Delivery-event normalization
//!
//! The event processor deployed by the history group receives SES event
//! notifications wrapped in SNS envelopes and writes one [`HistoryRecord`]
//! per event. This module is the reference for that normalization: the
//! bundled function mirrors [`normalize_sns`] and [`normalize_event`], and
//! the wire-up builder takes the table layout from the constants below.
//! The lifecycle commands themselves never call the normalizers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Partition key of the history table
pub const PARTITION_KEY: &str = "messageId";
/// Sort key of the history table, `<timestamp>#<eventType>`
pub const SORT_KEY: &str = "sk";
/// TTL attribute of the history table (epoch seconds)
pub const TTL_ATTRIBUTE: &str = "expiresAt";
pub const RETENTION_DAYS: i64 = 90;

/// Event types the configuration set publishes
pub const PUBLISHED_EVENT_TYPES: [&str; 8] = [
    "SEND",
    "DELIVERY",
    "BOUNCE",
    "COMPLAINT",
    "REJECT",
    "OPEN",
    "CLICK",
    "DELIVERY_DELAY",
];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed notification: {0}")]
    Malformed(String),

    #[error("Unsupported event type: {0}")]
    Unsupported(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Send,
    Delivery,
    Bounce,
    Complaint,
    Reject,
    Open,
    Click,
    DeliveryDelay,
}

impl EventType {
    fn parse(raw: &str) -> Result<Self, EventError> {
        match raw.to_ascii_uppercase().replace(' ', "_").as_str() {
            "SEND" => Ok(EventType::Send),
            "DELIVERY" => Ok(EventType::Delivery),
            "BOUNCE" => Ok(EventType::Bounce),
            "COMPLAINT" => Ok(EventType::Complaint),
            "REJECT" => Ok(EventType::Reject),
            "OPEN" => Ok(EventType::Open),
            "CLICK" => Ok(EventType::Click),
            "DELIVERYDELAY" | "DELIVERY_DELAY" => Ok(EventType::DeliveryDelay),
            other => Err(EventError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Send => "send",
            EventType::Delivery => "delivery",
            EventType::Bounce => "bounce",
            EventType::Complaint => "complaint",
            EventType::Reject => "reject",
            EventType::Open => "open",
            EventType::Click => "click",
            EventType::DeliveryDelay => "deliveryDelay",
        };
        f.write_str(s)
    }
}

/// Event-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventDetails {
    None,
    Bounce {
        bounce_type: String,
        bounce_sub_type: Option<String>,
        recipients: Vec<String>,
        diagnostic: Option<String>,
    },
    Complaint {
        recipients: Vec<String>,
        feedback_type: Option<String>,
    },
    Delivery {
        recipients: Vec<String>,
        smtp_response: Option<String>,
        processing_time_ms: Option<u64>,
    },
    Open {
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
    Click {
        link: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
    Reject {
        reason: Option<String>,
    },
    DeliveryDelay {
        delay_type: Option<String>,
        recipients: Vec<String>,
        expiration_time: Option<String>,
    },
}

/// One row of the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub message_id: String,
    pub sk: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub destination: Vec<String>,
    pub subject: Option<String>,
    pub details: EventDetails,
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesEvent {
    #[serde(alias = "notificationType")]
    event_type: String,
    mail: SesMail,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesMail {
    message_id: String,
    timestamp: DateTime<Utc>,
    source: String,
    #[serde(default)]
    destination: Vec<String>,
    #[serde(default)]
    common_headers: Option<CommonHeaders>,
}

#[derive(Deserialize)]
struct CommonHeaders {
    subject: Option<String>,
}

/// Normalize an SNS-delivered notification body
pub fn normalize_sns(body: &str) -> Result<HistoryRecord, EventError> {
    let envelope: SnsEnvelope = serde_json::from_str(body)?;
    normalize_event(&envelope.message)
}

/// Normalize a bare SES event notification
pub fn normalize_event(message: &str) -> Result<HistoryRecord, EventError> {
    let event: SesEvent = serde_json::from_str(message)?;
    let event_type = EventType::parse(&event.event_type)?;
    let details = details_for(event_type, &event.rest)?;

    // per-event timestamps are more precise than the send time
    let timestamp = event_timestamp(event_type, &event.rest).unwrap_or(event.mail.timestamp);
    let expires_at = (timestamp + Duration::days(RETENTION_DAYS)).timestamp();

    Ok(HistoryRecord {
        sk: format!("{}#{}", timestamp.to_rfc3339(), event_type),
        message_id: event.mail.message_id,
        event_type,
        timestamp,
        source: event.mail.source,
        destination: event.mail.destination,
        subject: event.mail.common_headers.and_then(|h| h.subject),
        details,
        expires_at,
    })
}

fn section<'a>(
    rest: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a Value, EventError> {
    rest.get(key)
        .ok_or_else(|| EventError::Malformed(format!("missing {} section", key)))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn recipients(value: &Value, key: &str, field: Option<&str>) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match field {
                    Some(field) => item.get(field).and_then(Value::as_str),
                    None => item.as_str(),
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn details_for(
    event_type: EventType,
    rest: &serde_json::Map<String, Value>,
) -> Result<EventDetails, EventError> {
    let details = match event_type {
        EventType::Send => EventDetails::None,
        EventType::Bounce => {
            let bounce = section(rest, "bounce")?;
            let diagnostic = bounce
                .get("bouncedRecipients")
                .and_then(Value::as_array)
                .and_then(|r| r.first())
                .and_then(|r| str_field(r, "diagnosticCode"));
            EventDetails::Bounce {
                bounce_type: str_field(bounce, "bounceType")
                    .ok_or_else(|| EventError::Malformed("bounce without bounceType".into()))?,
                bounce_sub_type: str_field(bounce, "bounceSubType"),
                recipients: recipients(bounce, "bouncedRecipients", Some("emailAddress")),
                diagnostic,
            }
        }
        EventType::Complaint => {
            let complaint = section(rest, "complaint")?;
            EventDetails::Complaint {
                recipients: recipients(complaint, "complainedRecipients", Some("emailAddress")),
                feedback_type: str_field(complaint, "complaintFeedbackType"),
            }
        }
        EventType::Delivery => {
            let delivery = section(rest, "delivery")?;
            EventDetails::Delivery {
                recipients: recipients(delivery, "recipients", None),
                smtp_response: str_field(delivery, "smtpResponse"),
                processing_time_ms: delivery.get("processingTimeMillis").and_then(Value::as_u64),
            }
        }
        EventType::Open => {
            let open = section(rest, "open")?;
            EventDetails::Open {
                ip_address: str_field(open, "ipAddress"),
                user_agent: str_field(open, "userAgent"),
            }
        }
        EventType::Click => {
            let click = section(rest, "click")?;
            EventDetails::Click {
                link: str_field(click, "link")
                    .ok_or_else(|| EventError::Malformed("click without link".into()))?,
                ip_address: str_field(click, "ipAddress"),
                user_agent: str_field(click, "userAgent"),
            }
        }
        EventType::Reject => EventDetails::Reject {
            reason: rest.get("reject").and_then(|r| str_field(r, "reason")),
        },
        EventType::DeliveryDelay => {
            let delay = section(rest, "deliveryDelay")?;
            EventDetails::DeliveryDelay {
                delay_type: str_field(delay, "delayType"),
                recipients: recipients(delay, "delayedRecipients", Some("emailAddress")),
                expiration_time: str_field(delay, "expirationTime"),
            }
        }
    };
    Ok(details)
}

fn event_timestamp(
    event_type: EventType,
    rest: &serde_json::Map<String, Value>,
) -> Option<DateTime<Utc>> {
    let key = match event_type {
        EventType::Bounce => "bounce",
        EventType::Complaint => "complaint",
        EventType::Delivery => "delivery",
        EventType::Open => "open",
        EventType::Click => "click",
        EventType::DeliveryDelay => "deliveryDelay",
        EventType::Send | EventType::Reject => return None,
    };
    rest.get(key)
        .and_then(|s| s.get("timestamp"))
        .and_then(Value::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mail() -> Value {
        json!({
            "messageId": "0100018c-abc",
            "timestamp": "2024-03-01T10:00:00.000Z",
            "source": "hello@example.com",
            "destination": ["user@example.org"],
            "commonHeaders": { "subject": "Welcome" }
        })
    }

    fn wrap(event: Value) -> String {
        json!({ "Type": "Notification", "Message": event.to_string() }).to_string()
    }

    #[test]
    fn test_bounce_normalization() {
        let body = wrap(json!({
            "eventType": "Bounce",
            "mail": mail(),
            "bounce": {
                "bounceType": "Permanent",
                "bounceSubType": "General",
                "timestamp": "2024-03-01T10:00:05.000Z",
                "bouncedRecipients": [
                    { "emailAddress": "user@example.org", "diagnosticCode": "smtp; 550 5.1.1 user unknown" }
                ]
            }
        }));

        let record = normalize_sns(&body).unwrap();
        assert_eq!(record.message_id, "0100018c-abc");
        assert_eq!(record.event_type, EventType::Bounce);
        assert_eq!(record.subject.as_deref(), Some("Welcome"));
        assert!(record.sk.starts_with("2024-03-01T10:00:05"));
        assert!(record.sk.ends_with("#bounce"));
        assert_eq!(
            record.expires_at - record.timestamp.timestamp(),
            RETENTION_DAYS * 24 * 3600
        );
        match record.details {
            EventDetails::Bounce {
                bounce_type,
                recipients,
                diagnostic,
                ..
            } => {
                assert_eq!(bounce_type, "Permanent");
                assert_eq!(recipients, vec!["user@example.org"]);
                assert!(diagnostic.unwrap().contains("550"));
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_click_and_delay() {
        let click = normalize_event(
            &json!({
                "eventType": "Click",
                "mail": mail(),
                "click": { "link": "https://example.com/pricing", "ipAddress": "192.0.2.1" }
            })
            .to_string(),
        )
        .unwrap();
        assert!(matches!(click.details, EventDetails::Click { ref link, .. } if link == "https://example.com/pricing"));
        // no per-event timestamp: falls back to the send time
        assert!(click.sk.starts_with("2024-03-01T10:00:00"));

        let delay = normalize_event(
            &json!({
                "eventType": "DeliveryDelay",
                "mail": mail(),
                "deliveryDelay": { "delayType": "MailboxFull", "delayedRecipients": [{ "emailAddress": "user@example.org" }] }
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(delay.event_type, EventType::DeliveryDelay);
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        let unknown = json!({ "eventType": "Subscription", "mail": mail() }).to_string();
        assert!(matches!(normalize_event(&unknown), Err(EventError::Unsupported(_))));

        let malformed = json!({ "eventType": "Click", "mail": mail() }).to_string();
        assert!(matches!(normalize_event(&malformed), Err(EventError::Malformed(_))));
    }
}
