//! # Access Policies
//!
//! Pure allow/deny logic shared by every widget: the optional e-mail
//! domain allow-list, the static admin set, and the user-facing wording
//! for rejections. No I/O here: the block-list lookup itself lives with
//! the identity gate.

use std::collections::HashSet;

/// Base message shown to a blocked principal; a stored reason is appended.
pub const BLOCK_MESSAGE: &str = "This account has been blocked. Contact an administrator.";

/// Reason written when an admin leaves the free-text field blank.
pub const DEFAULT_BLOCK_REASON: &str = "Blocked by a moderator";

/// Shown when a principal fails the domain check on a widget without its
/// own tailored wording.
pub const GENERIC_REJECT_MESSAGE: &str = "This account is not allowed here.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

/// Statically configured access rules, normalized once at startup.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_domain: Option<String>,
    admin_emails: HashSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(allowed_domain: Option<&str>, admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_domain = allowed_domain
            .map(|raw| raw.trim().to_lowercase())
            .filter(|domain| !domain.is_empty());

        let admin_emails = admin_emails
            .into_iter()
            .map(|email| email.as_ref().trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();

        Self { allowed_domain, admin_emails }
    }

    /// Splits a raw admin list on commas and newlines, the format both the
    /// environment variable and the config file use.
    pub fn parse_email_list(raw: &str) -> Vec<String> {
        raw.split(['\n', ','])
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect()
    }

    pub fn enforces_domain(&self) -> bool {
        self.allowed_domain.is_some()
    }

    /// With no configured domain every e-mail passes; otherwise the e-mail
    /// must end with the domain, case-insensitively. A missing e-mail
    /// fails a configured check.
    pub fn email_allowed(&self, email: Option<&str>) -> bool {
        match &self.allowed_domain {
            None => true,
            Some(domain) => email
                .map(|value| value.to_lowercase().ends_with(domain.as_str()))
                .unwrap_or(false),
        }
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        email
            .map(|value| self.admin_emails.contains(&value.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn role_for(&self, email: Option<&str>) -> Role {
        if self.is_admin(email) {
            Role::Admin
        } else {
            Role::Member
        }
    }

    /// Domain-rejection wording, naming the expected domain when one is set.
    pub fn domain_reject_message(&self) -> String {
        match &self.allowed_domain {
            Some(domain) => format!("Please sign in with an allowed e-mail domain ({domain})."),
            None => "Please sign in with an allowed e-mail domain.".to_string(),
        }
    }
}

/// Block wording: the base phrase, plus "Reason: …" when one was recorded.
pub fn format_block_message(reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|value| !value.is_empty()) {
        Some(reason) => format!("{BLOCK_MESSAGE} Reason: {reason}"),
        None => BLOCK_MESSAGE.to_string(),
    }
}
