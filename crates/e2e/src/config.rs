//! Suite configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Shared TOTP secret enrolled on every two-factor test account.
pub const TOTP_USER_SECRET: &str = "JBSWY3DPEHPK3PXP";

/// Password every provisioned account uses.
pub const TEST_PASSWORD: &str = "Password123!";

/// An address no fixture ever registers.
pub const NONEXISTENT_TESTER_EMAIL: &str = "nonexistent-tester@gmail.com";

/// Configuration for a suite run. Defaults mirror the local docker compose
/// stack; URLs can be overridden through `ACCOUNTS_E2E_*` variables.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Frontend origin serving the auth pages.
    pub app_base_url: String,

    /// Origin the app redirects to after a completed login.
    pub home_url: String,

    /// Backend API origin (test-setup endpoints).
    pub api_base_url: String,

    /// Mail-capture service origin.
    pub mail_base_url: String,

    /// Directory for cached worker auth state.
    pub auth_dir: PathBuf,

    /// Directory of YAML flow specs.
    pub specs_dir: PathBuf,

    /// Output directory for results and screenshots.
    pub output_dir: PathBuf,

    /// Per-spec retries after a failure.
    pub retries: u32,

    /// Whether this run is on CI.
    pub ci: bool,

    /// How long to wait for the app before the first spec runs.
    pub ready_timeout: Duration,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            app_base_url: "http://localhost:5002".to_string(),
            home_url: "http://localhost:5000/".to_string(),
            api_base_url: "http://localhost:8000".to_string(),
            mail_base_url: "http://localhost:1080".to_string(),
            auth_dir: PathBuf::from("test-results/.auth"),
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            retries: 0,
            ci: false,
            ready_timeout: Duration::from_secs(30),
        }
    }
}

impl SuiteConfig {
    /// Build from the environment. CI runs get one retry per spec, matching
    /// how the suite is scheduled there.
    pub fn from_env() -> Self {
        let ci = env::var("CI").map(|v| !v.is_empty()).unwrap_or(false);
        let mut config = Self {
            ci,
            retries: if ci { 1 } else { 0 },
            ..Self::default()
        };

        if let Ok(url) = env::var("ACCOUNTS_E2E_APP_URL") {
            config.app_base_url = url;
        }
        if let Ok(url) = env::var("ACCOUNTS_E2E_HOME_URL") {
            config.home_url = url;
        }
        if let Ok(url) = env::var("ACCOUNTS_E2E_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = env::var("ACCOUNTS_E2E_MAIL_URL") {
            config.mail_base_url = url;
        }

        config
    }

    /// Hostname of the app origin, used as the cookie domain for cached
    /// browser sessions.
    pub fn app_host(&self) -> &str {
        url_host(&self.app_base_url)
    }
}

/// Extract the host portion of an origin string.
pub fn url_host(url: &str) -> &str {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    without_scheme
        .split(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_stack() {
        let config = SuiteConfig::default();
        assert_eq!(config.app_base_url, "http://localhost:5002");
        assert_eq!(config.retries, 0);
        assert!(!config.ci);
    }

    #[test]
    fn host_extraction() {
        assert_eq!(url_host("http://localhost:5002"), "localhost");
        assert_eq!(url_host("https://accounts.example.com/auth"), "accounts.example.com");
        assert_eq!(url_host("localhost:1080"), "localhost");
    }
}
