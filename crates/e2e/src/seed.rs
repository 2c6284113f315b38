//! Global environment setup and teardown
//!
//! The backend owns its seed scripts; the suite only shells out to them and
//! waits for the stack to answer before the first spec runs.

use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::poll::poll_until;

/// Commands that seed and tear down backend test data, as argv vectors.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub setup: Vec<String>,
    pub teardown: Vec<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        let argv = |script: &str| {
            vec![
                "docker".to_string(),
                "compose".to_string(),
                "exec".to_string(),
                "test-server".to_string(),
                "python".to_string(),
                format!("scripts/{script}"),
            ]
        };
        Self {
            setup: argv("setup_e2e.py"),
            teardown: argv("teardown_e2e.py"),
        }
    }
}

fn run_command(argv: &[String], what: &str) -> E2eResult<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| E2eError::Seed(format!("empty {what} command")))?;

    info!("{what}: {}", argv.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| E2eError::Seed(format!("failed to run {program}: {e}")))?;

    if !status.success() {
        return Err(E2eError::Seed(format!("{what} exited with {status}")));
    }
    Ok(())
}

/// Seed backend test data before the suite runs.
pub fn seed_test_data(config: &SeedConfig) -> E2eResult<()> {
    run_command(&config.setup, "seed")
}

/// Drop seeded data after the suite.
pub fn teardown_test_data(config: &SeedConfig) -> E2eResult<()> {
    run_command(&config.teardown, "teardown")
}

/// Wait until `url` answers with a success status, so a cold stack does not
/// fail the first spec. Connection refusals are expected while containers
/// come up and are not logged.
pub async fn wait_for_app(url: &str, timeout: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let check = || {
        let client = &client;
        async move {
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => Some(()),
                Ok(resp) => {
                    warn!("readiness probe returned {}", resp.status());
                    None
                }
                Err(err) => {
                    if !err.is_connect() {
                        warn!("readiness probe error: {err}");
                    }
                    None
                }
            }
        }
    };

    match poll_until(check, timeout).await {
        Some(()) => {
            info!("app is ready at {url}");
            Ok(())
        }
        None => Err(E2eError::AppNotReady {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}
