//! Suite orchestration: seed, readiness, fixtures, flows, results

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::browser::{BrowserConfig, BrowserDriver};
use crate::config::{SuiteConfig, TEST_PASSWORD, TOTP_USER_SECRET};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{FixtureStore, WorkerAuth};
use crate::mailbox::{MailFilter, MailboxClient, DEFAULT_MAIL_TIMEOUT};
use crate::seed::{seed_test_data, teardown_test_data, wait_for_app, SeedConfig};
use crate::spec::{EmailExpectation, TestSpec};
use crate::totp::{generate_valid, TotpConfig};
use crate::account::AccountClient;

/// Result of running a single flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Result of running the whole suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

/// Main suite runner.
pub struct SuiteRunner {
    config: SuiteConfig,
    seed: SeedConfig,
    driver: BrowserDriver,
    fixtures: FixtureStore,
    mailbox: MailboxClient,
    /// Worker index, used to key fixture accounts.
    worker: usize,
    /// Skip seeding/teardown (e.g. reruns against an already-seeded stack).
    skip_seed: bool,
    seeded: bool,
}

impl SuiteRunner {
    pub fn new(
        config: SuiteConfig,
        browser_config: BrowserConfig,
        worker: usize,
        skip_seed: bool,
    ) -> E2eResult<Self> {
        let driver = BrowserDriver::new(browser_config)?;
        let account_client = AccountClient::new(config.api_base_url.clone())?;
        let cookie_domain = config.app_host().to_string();
        let fixtures = FixtureStore::new(account_client, config.auth_dir.clone(), cookie_domain)?;
        let mailbox = MailboxClient::new(config.mail_base_url.clone())?;

        Ok(Self {
            config,
            seed: SeedConfig::default(),
            driver,
            fixtures,
            mailbox,
            worker,
            skip_seed,
            seeded: false,
        })
    }

    /// Seed backend data and wait for the app to answer.
    pub async fn prepare(&mut self) -> E2eResult<()> {
        if self.skip_seed {
            info!("skipping seed step");
        } else if !self.seeded {
            seed_test_data(&self.seed)?;
            self.seeded = true;
        }

        wait_for_app(&self.config.app_base_url, self.config.ready_timeout).await
    }

    /// Tear down seeded data. Failures are logged, not propagated: results
    /// are already collected by the time this runs.
    pub fn cleanup(&mut self) {
        if self.seeded {
            self.seeded = false;
            if let Err(err) = teardown_test_data(&self.seed) {
                warn!("teardown failed: {err}");
            }
        }
    }

    /// Run every flow in the specs directory.
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run flows carrying a tag.
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let filtered: Vec<TestSpec> = specs.into_iter().filter(|s| s.has_tag(tag)).collect();
        self.run_specs(&filtered).await
    }

    /// Run a single flow by name.
    pub async fn run_named(&mut self, name: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("flow not found: {name}")))?;
        self.run_specs(&[spec]).await
    }

    /// Run a list of flows, with per-flow retries, and tear down afterwards.
    pub async fn run_specs(&mut self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();

        self.prepare().await?;

        info!("running {} flow(s)...", specs.len());

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for spec in specs {
            let result = self.run_spec_with_retries(spec).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        self.cleanup();

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("");
        info!(
            "Flow results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    async fn run_spec_with_retries(&mut self, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        let max_attempts = self.config.retries + 1;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.run_spec_once(spec).await {
                Ok(()) => {
                    return TestResult {
                        name: spec.name.clone(),
                        success: true,
                        duration_ms: start.elapsed().as_millis() as u64,
                        attempts: attempt,
                        error: None,
                    };
                }
                Err(err) => {
                    if attempt < max_attempts {
                        warn!("flow '{}' failed (attempt {attempt}), retrying: {err}", spec.name);
                    }
                    last_error = Some(err.to_string());
                }
            }
        }

        TestResult {
            name: spec.name.clone(),
            success: false,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts: max_attempts,
            error: last_error,
        }
    }

    /// One attempt at a flow: resolve its account, substitute placeholders,
    /// drive the browser, then check the inbox expectation.
    async fn run_spec_once(&mut self, spec: &TestSpec) -> E2eResult<()> {
        let auth = match spec.profile() {
            Some(profile) => Some(self.fixtures.worker_auth(profile, self.worker).await?),
            None => None,
        };

        let resolved = self.resolve_spec(spec, auth.as_ref()).await?;

        // Only flows declaring `auth:` start from the cached session;
        // `account:` flows authenticate themselves.
        let storage_state = spec
            .auth
            .and(auth.as_ref().map(|a| a.storage_state.clone()));

        self.driver
            .run(&resolved.steps, storage_state.as_deref())
            .await?;

        if let Some(expectation) = &resolved.expect_email {
            self.check_email(&resolved.name, expectation).await?;
        }

        Ok(())
    }

    /// Substitute `$`-placeholders against the flow's account. The OTP is
    /// generated fresh per attempt, right before the browser starts, so it
    /// cannot expire mid-flow.
    async fn resolve_spec(
        &self,
        spec: &TestSpec,
        auth: Option<&WorkerAuth>,
    ) -> E2eResult<TestSpec> {
        let mut vars: Vec<(&str, String)> = vec![
            ("$APP_URL", self.config.app_base_url.clone()),
            ("$HOME_URL", self.config.home_url.clone()),
        ];

        if let Some(auth) = auth {
            let account = &auth.account;
            vars.push(("$ACCOUNT_EMAIL", account.email.clone()));
            vars.push((
                "$ACCOUNT_PASSWORD",
                account
                    .password
                    .clone()
                    .unwrap_or_else(|| TEST_PASSWORD.to_string()),
            ));
            vars.push((
                "$ACCOUNT_FULL_NAME",
                account.full_name.clone(),
            ));
            if let Some(code) = account.recovery_codes.first() {
                vars.push(("$RECOVERY_CODE", code.clone()));
            }
        }

        if serde_json::to_string(spec)?.contains("$OTP") {
            let secret = auth
                .and_then(|a| a.account.two_factor_secret.clone())
                .unwrap_or_else(|| TOTP_USER_SECRET.to_string());
            let otp = generate_valid(&secret, &TotpConfig::default()).await?;
            vars.push(("$OTP", otp));
        }

        let borrowed: Vec<(&str, &str)> = vars
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        spec.resolve_placeholders(&borrowed)
    }

    async fn check_email(&self, flow: &str, expectation: &EmailExpectation) -> E2eResult<()> {
        let mut filter = MailFilter::new();
        if let Some(recipient) = &expectation.recipient_contains {
            filter = filter.recipient_contains(recipient.clone());
        }
        if let Some(subject) = &expectation.subject_contains {
            filter = filter.subject_contains(subject.clone());
        }

        let timeout = expectation
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAIL_TIMEOUT);

        match self
            .mailbox
            .find_last_message(|m| filter.matches(m), timeout)
            .await?
        {
            Some(message) => {
                info!(id = message.id, subject = %message.subject, "expected email arrived");
                Ok(())
            }
            None => Err(E2eError::StepFailed {
                step: format!("{flow}:expect_email"),
                reason: format!("no matching email within {}ms", timeout.as_millis()),
            }),
        }
    }

    /// Write suite results as pretty JSON under the output directory.
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("flow-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("results written to: {}", path.display());
        Ok(path)
    }
}
