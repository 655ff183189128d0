//! In-memory shortcode registry
//!
//! Owns the code → record map and every rule about it: URL validation, code
//! minting, expiry and click accounting. All operations are synchronous and
//! never suspend, so they can be called straight from async handlers.
//!
//! Locking is per key (`DashMap` shards). Create reserves a code through the
//! vacant-entry API and Resolve mutates a record under its write guard, which
//! makes both check-then-act sequences atomic.

pub mod clock;
pub mod error;
pub mod generator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RegistryError, RegistryResult};
pub use generator::{CodeGenerator, RandomCodeGenerator};

use chrono::TimeDelta;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use url::Url;

use crate::models::{ClickEvent, CreatedLink, LinkRecord, LinkStats, NewLink, Visit};
use crate::telemetry::Telemetry;

const CATEGORY: &str = "registry";
const GENERATOR_CATEGORY: &str = "generator";

/// Ten years; keeps `created_at + validity` far from the chrono range limit.
pub const MAX_VALIDITY_MINUTES: i64 = 10 * 365 * 24 * 60;

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub default_validity_minutes: i64,
    pub max_generation_attempts: usize,
    pub max_code_length: usize,
}

impl RegistrySettings {
    const fn default_validity_minutes() -> i64 {
        30
    }

    const fn default_max_generation_attempts() -> usize {
        1000
    }

    const fn default_max_code_length() -> usize {
        64
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_validity_minutes: Self::default_validity_minutes(),
            max_generation_attempts: Self::default_max_generation_attempts(),
            max_code_length: Self::default_max_code_length(),
        }
    }
}

pub struct Registry {
    links: DashMap<String, LinkRecord>,
    settings: RegistrySettings,
    generator: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl Registry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            links: DashMap::new(),
            settings,
            generator: Arc::new(RandomCodeGenerator::default()),
            clock: Arc::new(SystemClock),
            telemetry: Telemetry::local(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Register a new link under a requested or freshly minted code.
    pub fn create(&self, link: NewLink) -> RegistryResult<CreatedLink> {
        if !is_valid_url(&link.url) {
            self.telemetry
                .warn(CATEGORY, format!("rejected invalid url '{}'", link.url));
            return Err(RegistryError::InvalidUrl(link.url));
        }

        let minutes = self.effective_validity(link.validity_minutes);
        let requested = link.shortcode.filter(|code| !code.is_empty());

        let created = match requested {
            Some(code) => self.insert_requested(code, link.url, minutes)?,
            None => self.insert_generated(link.url, minutes)?,
        };

        self.telemetry.info(
            CATEGORY,
            format!(
                "created short code '{}' expiring at {}",
                created.code,
                created.expires_at.to_rfc3339()
            ),
        );
        Ok(created)
    }

    /// Look up a live link and record the click. Returns the target URL.
    pub fn resolve(&self, code: &str, visit: Visit) -> RegistryResult<String> {
        let outcome = match self.links.get_mut(code) {
            None => Err(RegistryError::NotFound(code.to_string())),
            Some(mut record) => {
                let now = self.clock.now();
                if record.is_expired_at(now) {
                    Err(RegistryError::Expired(code.to_string()))
                } else {
                    record.record_click(ClickEvent {
                        timestamp: now,
                        referrer: visit.referrer,
                        source_address: visit.source_address,
                    });
                    Ok((record.original_url().to_string(), record.click_count()))
                }
            }
        };

        match outcome {
            Ok((url, clicks)) => {
                self.telemetry.info(
                    CATEGORY,
                    format!("redirecting '{code}' to {url} (click {clicks})"),
                );
                Ok(url)
            }
            Err(e) => {
                self.report_lookup_failure(&e);
                Err(e)
            }
        }
    }

    /// Snapshot of a record, expired or not. Does not count as a click.
    pub fn stats(&self, code: &str) -> RegistryResult<LinkStats> {
        let snapshot = self.links.get(code).map(|record| record.snapshot(code));

        match snapshot {
            Some(stats) => {
                self.telemetry.info(
                    CATEGORY,
                    format!(
                        "stats requested for '{code}' ({} clicks)",
                        stats.click_count
                    ),
                );
                Ok(stats)
            }
            None => {
                let e = RegistryError::NotFound(code.to_string());
                self.report_lookup_failure(&e);
                Err(e)
            }
        }
    }

    pub fn exists(&self, code: &str) -> bool {
        self.links.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn effective_validity(&self, requested: Option<i64>) -> i64 {
        requested
            .filter(|m| *m > 0)
            .unwrap_or(self.settings.default_validity_minutes)
            .clamp(1, MAX_VALIDITY_MINUTES)
    }

    fn new_record(&self, url: String, minutes: i64) -> LinkRecord {
        let created_at = self.clock.now();
        let expires_at = created_at + TimeDelta::minutes(minutes);
        LinkRecord::new(url, created_at, expires_at)
    }

    fn insert_requested(&self, code: String, url: String, minutes: i64) -> RegistryResult<CreatedLink> {
        if let Err(reason) = self.check_requested_code(&code) {
            self.telemetry.warn(
                CATEGORY,
                format!("rejected requested short code '{code}': {reason}"),
            );
            return Err(RegistryError::InvalidCode(code));
        }

        match self.links.entry(code) {
            Entry::Occupied(entry) => {
                let code = entry.key().clone();
                drop(entry);
                self.telemetry
                    .warn(CATEGORY, format!("short code '{code}' already in use"));
                Err(RegistryError::CodeConflict(code))
            }
            Entry::Vacant(entry) => {
                let record = self.new_record(url, minutes);
                let created = CreatedLink {
                    code: entry.key().clone(),
                    expires_at: record.expires_at(),
                };
                entry.insert(record);
                Ok(created)
            }
        }
    }

    fn insert_generated(&self, url: String, minutes: i64) -> RegistryResult<CreatedLink> {
        for attempt in 1..=self.settings.max_generation_attempts {
            let candidate = self.generator.generate();
            if candidate.is_empty() || has_reserved_chars(&candidate) {
                let message = format!("generator produced unusable code '{candidate}'");
                self.telemetry.error(GENERATOR_CATEGORY, message.clone());
                return Err(RegistryError::Internal(message));
            }

            match self.links.entry(candidate) {
                Entry::Occupied(entry) => {
                    tracing::debug!(short_code = %entry.key(), attempt, "generated code collided, retrying");
                }
                Entry::Vacant(entry) => {
                    let record = self.new_record(url, minutes);
                    let created = CreatedLink {
                        code: entry.key().clone(),
                        expires_at: record.expires_at(),
                    };
                    entry.insert(record);
                    if attempt > 1 {
                        self.telemetry.debug(
                            GENERATOR_CATEGORY,
                            format!("found free code '{}' after {attempt} attempts", created.code),
                        );
                    }
                    return Ok(created);
                }
            }
        }

        let message = format!(
            "no free short code after {} attempts",
            self.settings.max_generation_attempts
        );
        self.telemetry.error(GENERATOR_CATEGORY, message.clone());
        Err(RegistryError::Internal(message))
    }

    fn check_requested_code(&self, code: &str) -> Result<(), &'static str> {
        if code.is_empty() {
            return Err("empty");
        }
        if code.chars().count() > self.settings.max_code_length {
            return Err("too long");
        }
        if has_reserved_chars(code) {
            return Err("contains reserved characters");
        }
        Ok(())
    }

    fn report_lookup_failure(&self, error: &RegistryError) {
        match error {
            RegistryError::NotFound(code) => {
                self.telemetry
                    .warn(CATEGORY, format!("short code '{code}' not found"));
            }
            RegistryError::Expired(code) => {
                self.telemetry
                    .warn(CATEGORY, format!("short code '{code}' has expired"));
            }
            other => {
                self.telemetry.error(CATEGORY, other.to_string());
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

/// Characters that would break `/shorturls/{code}` routing.
fn has_reserved_chars(code: &str) -> bool {
    code.chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '%'))
}

/// Absolute URL with both a scheme and a host.
pub fn is_valid_url(input: &str) -> bool {
    Url::parse(input).map(|url| url.has_host()).unwrap_or(false)
}
