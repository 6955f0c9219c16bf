//! Run summary notifications.
//!
//! Delivery is best effort: the orchestrator logs a failed send and moves on.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::types::{NotifierKind, NotifierSettings};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid notifier URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Notifier rejected message with status {0}")]
    Rejected(u16),

    #[error("Notifier misconfigured: {0}")]
    Misconfigured(String),
}

/// A rendered run summary ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipient: String,
}

pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes the notification to the log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        log::info!(
            "Notification to {}: {}\n{}",
            notification.recipient,
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

/// POSTs the notification as JSON to a relay that handles mail delivery.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: url::Url,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let url = url::Url::parse(url)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        log::info!("Notification delivered to {}", notification.recipient);
        Ok(())
    }
}

/// Build the notifier named in the settings file.
pub fn notifier_from_settings(settings: &NotifierSettings) -> Result<Box<dyn Notifier>, NotifyError> {
    match settings.kind {
        NotifierKind::Log => Ok(Box::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = settings.url.as_deref().ok_or_else(|| {
                NotifyError::Misconfigured("webhook notifier requires a url".to_string())
            })?;
            Ok(Box::new(WebhookNotifier::new(url)?))
        }
    }
}

/// Replace every `v<Key>` token in `template` with its value, verbatim.
///
/// Longer keys go first so a key that prefixes another cannot clip it.
pub fn render_template(template: &str, variables: &[(&str, String)]) -> String {
    let mut ordered: Vec<&(&str, String)> = variables.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut rendered = template.to_string();
    for (key, value) in ordered {
        rendered = rendered.replace(&format!("v{}", key), value);
    }
    rendered
}
