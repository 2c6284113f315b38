//! Inbox client for the mail-capture service
//!
//! The capture service exposes every email the backend sent as a JSON
//! listing. Specs wait on it to assert that a flow produced an email
//! (password reset, signup verification) before the message is readable.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::E2eResult;
use crate::poll::poll_until;

/// How long to wait for an email before giving up.
pub const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(5);

/// A captured email. Fetched, never owned; the id is opaque and the body is
/// not part of the listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MailMessage {
    pub id: u64,
    pub recipients: Vec<String>,
    pub subject: String,
}

/// Reusable predicate over captured emails.
///
/// Recipients arrive angle-bracketed (`<tester-0@gmail.com>`), so matching
/// is substring-based throughout.
#[derive(Debug, Clone, Default)]
pub struct MailFilter {
    recipient_contains: Option<String>,
    subject_contains: Option<String>,
    subject_pattern: Option<Regex>,
}

impl MailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipient_contains(mut self, needle: impl Into<String>) -> Self {
        self.recipient_contains = Some(needle.into());
        self
    }

    pub fn subject_contains(mut self, needle: impl Into<String>) -> Self {
        self.subject_contains = Some(needle.into());
        self
    }

    pub fn subject_pattern(mut self, pattern: Regex) -> Self {
        self.subject_pattern = Some(pattern);
        self
    }

    pub fn matches(&self, message: &MailMessage) -> bool {
        if let Some(needle) = &self.recipient_contains {
            if !message.recipients.iter().any(|r| r.contains(needle)) {
                return false;
            }
        }
        if let Some(needle) = &self.subject_contains {
            if !message.subject.contains(needle) {
                return false;
            }
        }
        if let Some(pattern) = &self.subject_pattern {
            if !pattern.is_match(&message.subject) {
                return false;
            }
        }
        true
    }
}

/// HTTP client over the capture service's listing endpoint.
pub struct MailboxClient {
    http: reqwest::Client,
    base_url: String,
}

impl MailboxClient {
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch the full message listing.
    pub async fn messages(&self) -> E2eResult<Vec<MailMessage>> {
        let url = format!("{}/messages", self.base_url);
        let messages = self.http.get(&url).send().await?.json().await?;
        Ok(messages)
    }

    /// Fetch and filter, returning the last matching message if any.
    pub async fn find_message<F>(&self, filter: F) -> E2eResult<Option<MailMessage>>
    where
        F: Fn(&MailMessage) -> bool,
    {
        let messages = self.messages().await?;
        Ok(messages.into_iter().filter(|m| filter(m)).last())
    }

    /// Poll the inbox until a matching message arrives or `timeout` elapses.
    ///
    /// An empty inbox at the deadline is `Ok(None)`; transport or decode
    /// failures abort the poll and propagate.
    pub async fn find_last_message<F>(
        &self,
        filter: F,
        timeout: Duration,
    ) -> E2eResult<Option<MailMessage>>
    where
        F: Fn(&MailMessage) -> bool,
    {
        let check = || {
            let filter = &filter;
            async move {
                match self.find_message(filter).await {
                    Ok(Some(message)) => Some(Ok(message)),
                    Ok(None) => None,
                    Err(err) => Some(Err(err)),
                }
            }
        };

        match poll_until(check, timeout).await {
            Some(Ok(message)) => {
                debug!(id = message.id, subject = %message.subject, "matched email");
                Ok(Some(message))
            }
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}
