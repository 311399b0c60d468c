use crate::config::Config;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const MAIL_TIMEOUT_SECONDS: u64 = 20;
const MAIL_API_KEY_ENV: &str = "DEEPFOCUS_MAIL_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;

    fn describe(&self) -> String;
}

/// Posts each message as JSON to a transactional mail HTTP API.
pub struct HttpMailer {
    endpoint: String,
    client: Client,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                    .context("Failed to build Authorization header")?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(MAIL_TIMEOUT_SECONDS))
            .default_headers(headers)
            .build()
            .context("Failed to create mail HTTP client")?;

        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            client,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(mail)
            .send()
            .await
            .with_context(|| format!("Mail API request failed for {}", mail.to))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .context("Failed to read mail API response body")?;
            bail!("Mail API error {}: {}", status, body);
        }

        Ok(())
    }

    fn describe(&self) -> String {
        format!("http ({})", self.endpoint)
    }
}

/// Used when no mail API is configured; digests only reach the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            bytes = mail.html.len(),
            "mail transport not configured, digest logged instead of sent"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "log only (mail_api_url not set)".to_string()
    }
}

pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>> {
    match config
        .mail_api_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    {
        Some(url) => {
            let api_key = resolve_api_key(config);
            Ok(Arc::new(HttpMailer::new(url, api_key.as_deref())?))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

fn resolve_api_key(config: &Config) -> Option<String> {
    std::env::var(MAIL_API_KEY_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            config
                .mail_api_key
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}
