//! Test-account provisioning against the backend's test-setup endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    WebauthnCredential,
    OauthGoogle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorProvider {
    Authenticator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebauthnCredential {
    pub credential_id: String,
    pub public_key: String,
    pub sign_count: u64,
    pub device_type: String,
    pub backed_up: bool,
    pub nickname: String,
    pub transports: Option<Vec<String>>,
    pub last_used_at: DateTime<Utc>,
}

/// An account record as the test-setup endpoint returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAccount {
    pub id: String,
    pub full_name: String,
    pub password: Option<String>,
    pub email: String,
    pub two_factor_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub webauthn_credentials: Vec<WebauthnCredential>,
    pub recovery_codes: Vec<String>,
    pub auth_providers: Vec<AuthProvider>,
    #[serde(rename = "has2faEnabled")]
    pub has_2fa_enabled: bool,
    pub two_factor_providers: Vec<TwoFactorProvider>,
}

/// Payload for the account-creation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    pub full_name: String,
    pub password: Option<String>,
    pub email: String,
    pub two_factor_secret: Option<String>,
    pub enable_sudo_mode: bool,
    pub auth_providers: Vec<AuthProvider>,
}

/// The created account plus the session cookies the endpoint set. The
/// cookies become the browser context's storage state.
#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub account: TestAccount,
    pub set_cookies: Vec<String>,
}

/// HTTP client over the backend's test-setup surface.
pub struct AccountClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccountClient {
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// POST the account payload. Non-2xx surfaces as
    /// [`E2eError::AccountCreation`] with the response status text and is
    /// never retried.
    pub async fn create_account(&self, data: &CreateAccount) -> E2eResult<ProvisionedAccount> {
        let url = format!("{}/test-setup/create-account", self.base_url);
        info!(email = %data.email, "creating test account");

        let response = self.http.post(&url).json(data).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = status.canonical_reason().unwrap_or_else(|| status.as_str());
            return Err(E2eError::AccountCreation(reason.to_string()));
        }

        let set_cookies = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(String::from))
            .collect();

        let account = response.json().await?;
        Ok(ProvisionedAccount {
            account,
            set_cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_use_the_wire_names() {
        assert_eq!(
            serde_json::to_string(&AuthProvider::WebauthnCredential).unwrap(),
            "\"webauthn_credential\""
        );
        assert_eq!(
            serde_json::to_string(&AuthProvider::OauthGoogle).unwrap(),
            "\"oauth_google\""
        );
        assert_eq!(
            serde_json::to_string(&TwoFactorProvider::Authenticator).unwrap(),
            "\"authenticator\""
        );
    }

    #[test]
    fn create_payload_is_camel_case() {
        let payload = CreateAccount {
            full_name: "Tester 0".into(),
            password: None,
            email: "tester-0@gmail.com".into(),
            two_factor_secret: None,
            enable_sudo_mode: true,
            auth_providers: vec![AuthProvider::Password],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["fullName"], "Tester 0");
        assert_eq!(json["enableSudoMode"], true);
        assert!(json["password"].is_null());
    }

    #[test]
    fn account_round_trips_through_json() {
        let raw = serde_json::json!({
            "id": "acc_1",
            "fullName": "Tester 0",
            "password": "Password123!",
            "email": "tester-0@gmail.com",
            "twoFactorSecret": null,
            "createdAt": "2025-06-01T12:00:00Z",
            "updatedAt": null,
            "webauthnCredentials": [],
            "recoveryCodes": ["AAAA-BBBB"],
            "authProviders": ["password"],
            "has2faEnabled": false,
            "twoFactorProviders": []
        });
        let account: TestAccount = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(account.email, "tester-0@gmail.com");
        assert_eq!(account.auth_providers, vec![AuthProvider::Password]);

        let back = serde_json::to_value(&account).unwrap();
        assert_eq!(back["has2faEnabled"], raw["has2faEnabled"]);
        assert_eq!(back["recoveryCodes"], raw["recoveryCodes"]);
    }
}
