use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::{RandomCodeGenerator, RegistrySettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Overrides the scheme and host used when composing short links
    pub public_base_url: Option<String>,
    pub short_codes: ShortCodeConfig,
    pub telemetry: TelemetryConfig,
    pub client_ip: ClientIpConfig,
    pub redirect_status: RedirectMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeConfig {
    pub default_validity_minutes: i64,
    pub random_bytes: usize,
    pub max_generation_attempts: usize,
    pub max_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Remote collector; events only go to local tracing when unset
    pub endpoint: Option<String>,
    pub stack: String,
    pub buffer_size: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Standard,
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIpConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RedirectMode {
    MovedPermanently,
    #[default]
    Found,
    TemporaryRedirect,
    PermanentRedirect,
}

impl RedirectMode {
    pub fn status_code(self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            RedirectMode::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
            RedirectMode::Found => StatusCode::FOUND,
            RedirectMode::TemporaryRedirect => StatusCode::TEMPORARY_REDIRECT,
            RedirectMode::PermanentRedirect => StatusCode::PERMANENT_REDIRECT,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "301" => Some(RedirectMode::MovedPermanently),
            "302" => Some(RedirectMode::Found),
            "307" => Some(RedirectMode::TemporaryRedirect),
            "308" => Some(RedirectMode::PermanentRedirect),
            _ => None,
        }
    }
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

impl Default for ShortCodeConfig {
    fn default() -> Self {
        let settings = RegistrySettings::default();
        Self {
            default_validity_minutes: settings.default_validity_minutes,
            random_bytes: RandomCodeGenerator::DEFAULT_BYTES,
            max_generation_attempts: settings.max_generation_attempts,
            max_length: settings.max_code_length,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            stack: "backend".to_string(),
            buffer_size: Self::default_buffer_size(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl TelemetryConfig {
    const fn default_buffer_size() -> usize {
        1024
    }

    const fn default_timeout_ms() -> u64 {
        3000
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ShortCodeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_validity_minutes <= 0 {
            anyhow::bail!("DEFAULT_VALIDITY_MINUTES must be positive");
        }
        if self.random_bytes == 0 {
            anyhow::bail!("SHORT_CODE_BYTES must be at least 1");
        }
        if self.max_generation_attempts == 0 {
            anyhow::bail!("SHORT_CODE_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            default_validity_minutes: self.default_validity_minutes,
            max_generation_attempts: self.max_generation_attempts,
            max_code_length: self.max_length,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            public_base_url: None,
            short_codes: ShortCodeConfig::default(),
            telemetry: TelemetryConfig::default(),
            client_ip: ClientIpConfig::default(),
            redirect_status: RedirectMode::default(),
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let host = std::env::var("HOST").unwrap_or(defaults.server.host);
        let port = env_parse("PORT", defaults.server.port)?;

        let public_base_url =
            non_empty_var("PUBLIC_BASE_URL").map(|v| v.trim_end_matches('/').to_string());

        let short_codes = ShortCodeConfig {
            default_validity_minutes: env_parse(
                "DEFAULT_VALIDITY_MINUTES",
                defaults.short_codes.default_validity_minutes,
            )?,
            random_bytes: env_parse("SHORT_CODE_BYTES", defaults.short_codes.random_bytes)?,
            max_generation_attempts: env_parse(
                "SHORT_CODE_MAX_ATTEMPTS",
                defaults.short_codes.max_generation_attempts,
            )?,
            max_length: env_parse("SHORT_CODE_MAX_LENGTH", defaults.short_codes.max_length)?,
        };

        short_codes.validate()?;

        let telemetry = TelemetryConfig {
            endpoint: non_empty_var("TELEMETRY_ENDPOINT"),
            stack: non_empty_var("TELEMETRY_STACK").unwrap_or(defaults.telemetry.stack),
            buffer_size: env_parse("TELEMETRY_BUFFER_SIZE", defaults.telemetry.buffer_size)?,
            timeout_ms: env_parse("TELEMETRY_TIMEOUT_MS", defaults.telemetry.timeout_ms)?,
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<IpNet>()
                    .with_context(|| format!("TRUSTED_PROXIES entry '{s}' is not a CIDR"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let redirect_status = match std::env::var("REDIRECT_STATUS") {
            Ok(raw) => RedirectMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    "Unknown REDIRECT_STATUS '{raw}', falling back to 302. Supported values: 301, 302, 307, 308"
                );
                RedirectMode::Found
            }),
            Err(_) => RedirectMode::default(),
        };

        Ok(Config {
            server: ServerConfig { host, port },
            public_base_url,
            short_codes,
            telemetry,
            client_ip: ClientIpConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            redirect_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_mode_parse() {
        assert_eq!(RedirectMode::parse("301"), Some(RedirectMode::MovedPermanently));
        assert_eq!(RedirectMode::parse(" 307 "), Some(RedirectMode::TemporaryRedirect));
        assert_eq!(RedirectMode::parse("200"), None);
        assert_eq!(RedirectMode::default().status_code().as_u16(), 302);
    }

    #[test]
    fn test_short_code_config_validation() {
        assert!(ShortCodeConfig::default().validate().is_ok());

        let zero_attempts = ShortCodeConfig {
            max_generation_attempts: 0,
            ..ShortCodeConfig::default()
        };
        let err = zero_attempts.validate().unwrap_err();
        assert!(err.to_string().contains("SHORT_CODE_MAX_ATTEMPTS"));

        let zero_bytes = ShortCodeConfig {
            random_bytes: 0,
            ..ShortCodeConfig::default()
        };
        assert!(zero_bytes.validate().is_err());

        let no_validity = ShortCodeConfig {
            default_validity_minutes: 0,
            ..ShortCodeConfig::default()
        };
        assert!(no_validity.validate().is_err());
    }

    #[test]
    fn test_defaults_match_registry() {
        let config = Config::default();
        let settings = config.short_codes.registry_settings();
        assert_eq!(settings.default_validity_minutes, 30);
        assert_eq!(config.short_codes.random_bytes, 3);
        assert_eq!(config.server.port, 3000);
        assert!(config.telemetry.endpoint.is_none());
    }
}
