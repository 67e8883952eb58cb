//! Process configuration.
//!
//! All settings are resolved once at startup into an explicit [`AppConfig`]
//! and passed by reference to the components that need them. Nothing in the
//! crate reads the environment after construction.

use std::time::Duration;

/// Deployment profile. Selects defaults; `Testing` keeps pagination small so
/// integration tests can exercise `next_url`/`prev_url` without bulk data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Testing,
    Production,
}

impl Profile {
    pub fn parse(s: &str) -> Option<Profile> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Profile::Development),
            "testing" | "test" => Some(Profile::Testing),
            "production" | "prod" => Some(Profile::Production),
            _ => None,
        }
    }
}

/// Outbound mail settings. Carried as configuration only; the service does
/// not deliver mail itself.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub sender: String,
    pub subject_prefix: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: "smtp.example.com".to_string(),
            port: 465,
            sender: "Inkpost <noreply@example.com>".to_string(),
            subject_prefix: "[INKPOST]".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile: Profile,
    pub http_port: u16,
    /// Page sizes for the list endpoints.
    pub posts_per_page: usize,
    pub comments_per_page: usize,
    /// Validity window for issued API tokens.
    pub token_ttl: Duration,
    /// Account registered with this email becomes the administrator.
    pub admin_email: Option<String>,
    pub mail: MailConfig,
}

impl AppConfig {
    /// Defaults for a profile, before environment overrides.
    pub fn for_profile(profile: Profile) -> Self {
        let posts_per_page = match profile {
            Profile::Testing => 5,
            _ => 20,
        };
        Self {
            profile,
            http_port: 7880,
            posts_per_page,
            comments_per_page: 30,
            token_ttl: Duration::from_secs(3600),
            admin_email: None,
            mail: MailConfig::default(),
        }
    }

    /// Build the configuration from the environment. Unset or unparseable
    /// variables fall back to the profile defaults.
    pub fn from_env() -> Self {
        let profile = std::env::var("INKPOST_PROFILE")
            .ok()
            .and_then(|s| Profile::parse(&s))
            .unwrap_or(Profile::Development);
        let mut cfg = Self::for_profile(profile);
        if let Some(p) = env_parse::<u16>("INKPOST_HTTP_PORT") {
            cfg.http_port = p;
        }
        if let Some(n) = env_parse::<usize>("INKPOST_POSTS_PER_PAGE") {
            cfg.posts_per_page = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("INKPOST_COMMENTS_PER_PAGE") {
            cfg.comments_per_page = n.max(1);
        }
        if let Some(secs) = env_parse::<u64>("INKPOST_TOKEN_TTL_SECS") {
            cfg.token_ttl = Duration::from_secs(secs);
        }
        cfg.admin_email = std::env::var("INKPOST_ADMIN").ok().filter(|s| !s.is_empty());
        if let Ok(s) = std::env::var("INKPOST_MAIL_SERVER") {
            cfg.mail.server = s;
        }
        if let Some(p) = env_parse::<u16>("INKPOST_MAIL_PORT") {
            cfg.mail.port = p;
        }
        if let Ok(s) = std::env::var("INKPOST_MAIL_SENDER") {
            cfg.mail.sender = s;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parsing() {
        assert_eq!(Profile::parse("development"), Some(Profile::Development));
        assert_eq!(Profile::parse("TEST"), Some(Profile::Testing));
        assert_eq!(Profile::parse("prod"), Some(Profile::Production));
        assert_eq!(Profile::parse("staging"), None);
    }

    #[test]
    fn testing_profile_uses_small_pages() {
        let cfg = AppConfig::for_profile(Profile::Testing);
        assert_eq!(cfg.posts_per_page, 5);
        let cfg = AppConfig::for_profile(Profile::Production);
        assert_eq!(cfg.posts_per_page, 20);
    }
}
