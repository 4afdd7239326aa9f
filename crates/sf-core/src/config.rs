//! # Startup Configuration
//!
//! Environment-provided settings, read once at startup: the optional
//! allowed e-mail domain, the admin e-mail set, and the backend project
//! credentials. Layered `showfest.toml` + `SHOWFEST_*` environment
//! variables via the `config` crate; admin e-mails from the two sources
//! are unioned rather than overridden.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::policies::AccessPolicy;

/// Backend project credentials. All three are required; their absence is a
/// startup error surfaced inline, never a panic.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub project_id: String,
    pub api_key: String,
    pub auth_domain: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub allowed_domain: Option<String>,
    pub admin_emails: Vec<String>,
    pub backend: BackendConfig,
}

/// Raw deserialization target before validation and normalization.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    allowed_domain: Option<String>,
    /// Comma/newline-separated list, typically from `SHOWFEST_ADMIN_EMAILS`.
    admin_emails: Option<String>,
    /// Admin list from the static config file.
    #[serde(default)]
    admins: Vec<String>,
    project_id: Option<String>,
    api_key: Option<String>,
    auth_domain: Option<String>,
}

impl AppConfig {
    /// Loads `showfest.toml` (optional) overlaid with `SHOWFEST_*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .add_source(File::new("showfest", FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SHOWFEST"))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|err| AppError::Configuration(err.to_string()))?;

        let config = Self::from_raw(raw)?;
        tracing::debug!(
            admins = config.admin_emails.len(),
            domain_gated = config.allowed_domain.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str, value: Option<String>| match value
            .filter(|value| !value.trim().is_empty())
        {
            Some(value) => value,
            None => {
                missing.push(name);
                String::new()
            }
        };

        let backend = BackendConfig {
            project_id: required("PROJECT_ID", raw.project_id),
            api_key: required("API_KEY", raw.api_key),
            auth_domain: required("AUTH_DOMAIN", raw.auth_domain),
        };

        if !missing.is_empty() {
            return Err(AppError::Configuration(format!(
                "backend credentials are required: {}",
                missing.join(", ")
            )));
        }

        // Union of the file list and the environment list.
        let mut admin_emails: Vec<String> = raw
            .admins
            .iter()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect();
        if let Some(env_list) = &raw.admin_emails {
            for email in AccessPolicy::parse_email_list(env_list) {
                if !admin_emails.contains(&email) {
                    admin_emails.push(email);
                }
            }
        }

        Ok(Self {
            allowed_domain: raw
                .allowed_domain
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty()),
            admin_emails,
            backend,
        })
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.allowed_domain.as_deref(), &self.admin_emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_backend() -> RawConfig {
        RawConfig {
            project_id: Some("showfest-prod".into()),
            api_key: Some("key".into()),
            auth_domain: Some("showfest.example".into()),
            ..RawConfig::default()
        }
    }

    #[test]
    fn missing_credentials_name_every_absent_key() {
        let err = AppConfig::from_raw(RawConfig::default()).unwrap_err();
        match err {
            AppError::Configuration(message) => {
                assert!(message.contains("PROJECT_ID"));
                assert!(message.contains("API_KEY"));
                assert!(message.contains("AUTH_DOMAIN"));
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let raw = RawConfig { api_key: Some("  ".into()), ..raw_with_backend() };
        assert!(AppConfig::from_raw(raw).is_err());
    }

    #[test]
    fn admin_lists_are_unioned_without_duplicates() {
        let raw = RawConfig {
            admins: vec!["Lead@x.example".into()],
            admin_emails: Some("lead@x.example, crew@x.example".into()),
            ..raw_with_backend()
        };
        let cfg = AppConfig::from_raw(raw).expect("valid");
        assert_eq!(cfg.admin_emails, vec!["lead@x.example", "crew@x.example"]);
    }

    #[test]
    fn blank_allowed_domain_is_dropped() {
        let raw = RawConfig { allowed_domain: Some("  ".into()), ..raw_with_backend() };
        let cfg = AppConfig::from_raw(raw).expect("valid");
        assert_eq!(cfg.allowed_domain, None);
        assert!(!cfg.policy().enforces_domain());
    }
}
