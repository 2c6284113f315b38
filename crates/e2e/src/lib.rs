//! Accounts E2E Test Harness
//!
//! Rust-controlled browser test suite for the Accounts authentication
//! service. The suite:
//! - Seeds the backend stack and waits for it to answer
//! - Provisions worker-scoped test accounts and caches their sessions
//! - Parses declarative YAML flow specs and renders them to Playwright
//!   scripts
//! - Waits on the mail-capture inbox for flow-produced emails
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SuiteRunner                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  seed        -> seed_test_data() / wait_for_app()           │
//! │  fixtures    -> FixtureStore::worker_auth(profile, worker)  │
//! │  spec        -> TestSpec (YAML) + placeholder resolution    │
//! │  browser     -> BrowserDriver::run(steps, storage_state)    │
//! │  mailbox     -> MailboxClient::find_last_message(...)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Core utilities                                             │
//! │    poll::poll_until(check, timeout)   bounded retry loop    │
//! │    totp::generate_valid(secret, cfg)  rollover-safe codes   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The web app, its backend, the mail-capture service, and the browser
//! itself are external collaborators; the harness only drives them.

pub mod account;
pub mod browser;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod gravatar;
pub mod mailbox;
pub mod poll;
pub mod runner;
pub mod seed;
pub mod spec;
pub mod totp;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use runner::SuiteRunner;
pub use spec::{TestSpec, TestStep};
