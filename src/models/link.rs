use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::parse_validity;

/// One recorded redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub timestamp: DateTime<Utc>,
    pub referrer: Option<String>,
    pub source_address: String,
}

/// Stored state behind a short code.
///
/// Only the registry constructs and mutates records; the click counter and
/// the event list always move together.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    original_url: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    click_count: u64,
    click_events: Vec<ClickEvent>,
}

impl LinkRecord {
    pub(crate) fn new(
        original_url: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            original_url,
            created_at,
            expires_at,
            click_count: 0,
            click_events: Vec::new(),
        }
    }

    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn click_count(&self) -> u64 {
        self.click_count
    }

    pub fn click_events(&self) -> &[ClickEvent] {
        &self.click_events
    }

    /// Active up to and including the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub(crate) fn record_click(&mut self, event: ClickEvent) {
        self.click_events.push(event);
        self.click_count += 1;
    }

    pub(crate) fn snapshot(&self, code: &str) -> LinkStats {
        LinkStats {
            code: code.to_string(),
            original_url: self.original_url.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            click_count: self.click_count,
            click_events: self.click_events.clone(),
        }
    }
}

/// Input to `Registry::create`.
#[derive(Debug, Clone, Default)]
pub struct NewLink {
    pub url: String,
    pub validity_minutes: Option<i64>,
    pub shortcode: Option<String>,
}

impl NewLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn validity_minutes(mut self, minutes: i64) -> Self {
        self.validity_minutes = Some(minutes);
        self
    }

    pub fn shortcode(mut self, code: impl Into<String>) -> Self {
        self.shortcode = Some(code.into());
        self
    }
}

/// Caller context attached to a redirect.
#[derive(Debug, Clone, Default)]
pub struct Visit {
    pub referrer: Option<String>,
    pub source_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLink {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Point-in-time copy of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStats {
    pub code: String,
    pub original_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub click_count: u64,
    pub click_events: Vec<ClickEvent>,
}

/// Create payload. Fields are read loosely so that a wrongly typed value is
/// judged by the registry rather than rejected as a malformed body.
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub url: Option<Value>,
    /// Minutes; accepted as a number or a numeric string
    #[serde(default)]
    pub validity: Option<Value>,
    #[serde(default)]
    pub shortcode: Option<Value>,
}

impl CreateLinkRequest {
    pub fn into_new_link(self) -> NewLink {
        NewLink {
            // Anything but a string can never be a URL.
            url: match self.url {
                Some(Value::String(url)) => url,
                _ => String::new(),
            },
            validity_minutes: self.validity.as_ref().and_then(parse_validity),
            // Numeric codes are kept in their decimal form.
            shortcode: match self.shortcode {
                Some(Value::String(code)) => Some(code),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    pub short_link: String,
    #[serde(serialize_with = "iso8601")]
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ClickDetail {
    #[serde(serialize_with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub referrer: Option<String>,
    pub location: String,
}

impl From<ClickEvent> for ClickDetail {
    fn from(event: ClickEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            referrer: event.referrer,
            location: event.source_address,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatsResponse {
    pub shortcode: String,
    pub original_url: String,
    #[serde(serialize_with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "iso8601")]
    pub expiry: DateTime<Utc>,
    pub total_clicks: u64,
    pub click_details: Vec<ClickDetail>,
}

impl From<LinkStats> for LinkStatsResponse {
    fn from(stats: LinkStats) -> Self {
        Self {
            shortcode: stats.code,
            original_url: stats.original_url,
            created_at: stats.created_at,
            expiry: stats.expires_at,
            total_clicks: stats.click_count,
            click_details: stats.click_events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Millisecond precision, `Z` suffix.
fn iso8601<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}
