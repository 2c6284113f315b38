//! Worker-scoped authenticated-session fixtures
//!
//! Accounts are provisioned once per worker and cached on disk, so repeated
//! specs (and reruns against a live stack) reuse the same session instead of
//! creating a fresh account every time.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::{AccountClient, AuthProvider, CreateAccount, TestAccount};
use crate::config::{TEST_PASSWORD, TOTP_USER_SECRET};
use crate::error::E2eResult;

/// The standing account profiles the suite provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProfile {
    Password,
    Webauthn,
    TwoFactor,
    PasswordSudo,
    WebauthnSudo,
    TwoFactorSudo,
}

impl AuthProfile {
    /// Stable file-name stem for cached state.
    pub fn stem(self) -> &'static str {
        match self {
            AuthProfile::Password => "password",
            AuthProfile::Webauthn => "webauthn",
            AuthProfile::TwoFactor => "2fa",
            AuthProfile::PasswordSudo => "password-sudo",
            AuthProfile::WebauthnSudo => "webauthn-sudo",
            AuthProfile::TwoFactorSudo => "2fa-sudo",
        }
    }

    pub fn sudo(self) -> bool {
        matches!(
            self,
            AuthProfile::PasswordSudo | AuthProfile::WebauthnSudo | AuthProfile::TwoFactorSudo
        )
    }

    fn webauthn(self) -> bool {
        matches!(self, AuthProfile::Webauthn | AuthProfile::WebauthnSudo)
    }

    fn two_factor(self) -> bool {
        matches!(self, AuthProfile::TwoFactor | AuthProfile::TwoFactorSudo)
    }

    /// Deterministic per-worker address, so parallel workers never collide.
    pub fn email(self, worker: usize) -> String {
        match self {
            AuthProfile::Password => format!("tester-{worker}@gmail.com"),
            AuthProfile::Webauthn => format!("tester-webauthn-{worker}@gmail.com"),
            AuthProfile::TwoFactor => format!("two-factor-{worker}@gmail.com"),
            AuthProfile::PasswordSudo => format!("tester-sudo-{worker}@gmail.com"),
            AuthProfile::WebauthnSudo => format!("tester-webauthn-sudo-{worker}@gmail.com"),
            AuthProfile::TwoFactorSudo => format!("two-factor-sudo-{worker}@gmail.com"),
        }
    }

    fn create_request(self, worker: usize) -> CreateAccount {
        CreateAccount {
            full_name: format!("Tester {worker}"),
            password: if self.webauthn() {
                None
            } else {
                Some(TEST_PASSWORD.to_string())
            },
            email: self.email(worker),
            two_factor_secret: self.two_factor().then(|| TOTP_USER_SECRET.to_string()),
            enable_sudo_mode: self.sudo(),
            auth_providers: if self.webauthn() {
                vec![AuthProvider::WebauthnCredential]
            } else {
                vec![AuthProvider::Password]
            },
        }
    }
}

/// An account plus the storage-state file backing its browser session.
#[derive(Debug, Clone)]
pub struct WorkerAuth {
    pub account: TestAccount,
    pub storage_state: PathBuf,
}

/// Playwright storage-state document: cookies harvested from the
/// provisioning response, no origin storage.
#[derive(Debug, Serialize, Deserialize)]
struct StorageState {
    cookies: Vec<StorageCookie>,
    origins: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    expires: f64,
    http_only: bool,
    secure: bool,
    same_site: String,
}

fn parse_set_cookie(header: &str, default_domain: &str) -> Option<StorageCookie> {
    let mut parts = header.split(';').map(str::trim);
    let (name, value) = parts.next()?.split_once('=')?;
    if name.is_empty() {
        return None;
    }

    let mut cookie = StorageCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: default_domain.to_string(),
        path: "/".to_string(),
        expires: -1.0,
        http_only: false,
        secure: false,
        same_site: "Lax".to_string(),
    };

    for attr in parts {
        match attr.split_once('=') {
            Some((key, val)) if key.eq_ignore_ascii_case("domain") => {
                cookie.domain = val.trim_start_matches('.').to_string();
            }
            Some((key, val)) if key.eq_ignore_ascii_case("path") => {
                cookie.path = val.to_string();
            }
            Some((key, val)) if key.eq_ignore_ascii_case("samesite") => {
                cookie.same_site = val.to_string();
            }
            Some(_) => {}
            None => {
                if attr.eq_ignore_ascii_case("httponly") {
                    cookie.http_only = true;
                } else if attr.eq_ignore_ascii_case("secure") {
                    cookie.secure = true;
                }
            }
        }
    }

    Some(cookie)
}

/// Creates worker accounts on demand and caches them under the auth dir.
pub struct FixtureStore {
    client: AccountClient,
    auth_dir: PathBuf,
    cookie_domain: String,
}

impl FixtureStore {
    pub fn new(
        client: AccountClient,
        auth_dir: impl Into<PathBuf>,
        cookie_domain: impl Into<String>,
    ) -> E2eResult<Self> {
        let auth_dir = auth_dir.into();
        fs::create_dir_all(&auth_dir)?;
        Ok(Self {
            client,
            auth_dir,
            cookie_domain: cookie_domain.into(),
        })
    }

    /// Provision (or reuse) the account and session for `profile` on this
    /// worker. Both cache files must exist for reuse; a missing storage
    /// state forces re-provisioning so the session is never stale.
    pub async fn worker_auth(&self, profile: AuthProfile, worker: usize) -> E2eResult<WorkerAuth> {
        let stem = format!("{}-{worker}", profile.stem());
        let storage_state = self.auth_dir.join(format!("{stem}.json"));
        let account_file = self.auth_dir.join(format!("{stem}.user.json"));

        if storage_state.exists() && account_file.exists() {
            debug!(profile = profile.stem(), worker, "reusing cached auth state");
            let account = serde_json::from_str(&fs::read_to_string(&account_file)?)?;
            return Ok(WorkerAuth {
                account,
                storage_state,
            });
        }

        info!(profile = profile.stem(), worker, "provisioning worker account");
        let provisioned = self
            .client
            .create_account(&profile.create_request(worker))
            .await?;

        let cookies = provisioned
            .set_cookies
            .iter()
            .filter_map(|header| parse_set_cookie(header, &self.cookie_domain))
            .collect();
        let state = StorageState {
            cookies,
            origins: Vec::new(),
        };
        fs::write(&storage_state, serde_json::to_string_pretty(&state)?)?;
        fs::write(
            &account_file,
            serde_json::to_string_pretty(&provisioned.account)?,
        )?;

        Ok(WorkerAuth {
            account: provisioned.account,
            storage_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_emails_are_worker_scoped() {
        assert_eq!(AuthProfile::Password.email(0), "tester-0@gmail.com");
        assert_eq!(AuthProfile::Webauthn.email(2), "tester-webauthn-2@gmail.com");
        assert_eq!(AuthProfile::TwoFactor.email(1), "two-factor-1@gmail.com");
        assert_eq!(
            AuthProfile::TwoFactorSudo.email(3),
            "two-factor-sudo-3@gmail.com"
        );
    }

    #[test]
    fn webauthn_profiles_have_no_password() {
        let request = AuthProfile::WebauthnSudo.create_request(0);
        assert!(request.password.is_none());
        assert!(request.enable_sudo_mode);
        assert_eq!(
            request.auth_providers,
            vec![AuthProvider::WebauthnCredential]
        );
    }

    #[test]
    fn two_factor_profiles_share_the_suite_secret() {
        let request = AuthProfile::TwoFactor.create_request(0);
        assert_eq!(request.two_factor_secret.as_deref(), Some(TOTP_USER_SECRET));
        assert!(!request.enable_sudo_mode);
    }

    #[test]
    fn set_cookie_parsing_keeps_attributes() {
        let cookie = parse_set_cookie(
            "session=abc123; Path=/auth; Domain=.localhost; HttpOnly; Secure; SameSite=Strict",
            "localhost",
        )
        .unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.path, "/auth");
        assert_eq!(cookie.domain, "localhost");
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.same_site, "Strict");
    }

    #[test]
    fn set_cookie_parsing_applies_defaults() {
        let cookie = parse_set_cookie("session=abc123", "localhost").unwrap();
        assert_eq!(cookie.domain, "localhost");
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.expires, -1.0);
        assert!(!cookie.http_only);
        assert_eq!(cookie.same_site, "Lax");
    }

    #[test]
    fn malformed_set_cookie_is_skipped() {
        assert!(parse_set_cookie("no-equals-sign", "localhost").is_none());
        assert!(parse_set_cookie("=value-only", "localhost").is_none());
    }
}
