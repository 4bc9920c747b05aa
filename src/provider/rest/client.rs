//! HTTP client for the management endpoint
//!
//! Wraps `reqwest` with session handling: requests carry the session
//! header, and a rejected session is re-established once before giving up.

use super::auth::{validate_host, Credentials, SessionToken, SESSION_HEADER};
use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Build the base URL for a host, defaulting to https
pub fn endpoint_url(host: &str) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');

    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        if !validate_host(host) {
            return Err(anyhow::anyhow!("Invalid endpoint host: {:?}", host));
        }
        format!("https://{}", host)
    };

    let url = Url::parse(&format!("{}/", with_scheme))
        .with_context(|| format!("Invalid endpoint URL: {}", with_scheme))?;
    if url.host_str().is_none() {
        return Err(anyhow::anyhow!("Endpoint URL has no host: {}", with_scheme));
    }
    Ok(url)
}

/// Session-aware HTTP client
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base: Url,
    credentials: Credentials,
    session: SessionToken,
}

impl RestClient {
    /// Create a client; `insecure` disables certificate verification
    pub fn new(base: Url, credentials: Credentials, insecure: bool) -> Result<Self> {
        if insecure {
            tracing::warn!("TLS certificate verification disabled for {}", base);
        }

        let http = Client::builder()
            .user_agent(concat!("vmctl/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base,
            credentials,
            session: SessionToken::new(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn user(&self) -> &str {
        &self.credentials.user
    }

    /// Resolve an API path (with optional query) against the endpoint
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid API path: {}", path))
    }

    /// Open a session with basic auth
    pub async fn login(&self) -> Result<()> {
        let url = self.api_url("api/session")?;
        tracing::info!("Logging in to {} as {}", self.base, self.credentials.user);

        let response = self
            .http
            .post(url)
            .basic_auth(&self.credentials.user, Some(self.credentials.password()))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("Login failed: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        let token: String =
            serde_json::from_str(&body).context("Failed to parse session token")?;
        self.session.set(token).await;
        Ok(())
    }

    /// Close the session; a no-op when not logged in
    pub async fn logout(&self) -> Result<()> {
        let Some(token) = self.session.get().await else {
            return Ok(());
        };

        let url = self.api_url("api/session")?;
        let result = self
            .http
            .delete(url)
            .header(SESSION_HEADER, token)
            .send()
            .await
            .context("Failed to send logout request");

        if let Some(lived) = self.session.clear().await {
            tracing::info!("Session closed after {}s", lived.as_secs());
        }

        let response = result?;
        if !response.status().is_success() && response.status() != StatusCode::UNAUTHORIZED {
            return Err(anyhow::anyhow!("API request failed: {}", response.status()));
        }
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.api_url(path)?;
        let mut relogged = false;

        loop {
            tracing::debug!("{} {}", method, url);

            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(token) = self.session.get().await {
                request = request.header(SESSION_HEADER, token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.context("Failed to send request")?;
            let status = response.status();
            let response_body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status == StatusCode::UNAUTHORIZED && !relogged {
                tracing::info!("Session rejected, logging in again");
                self.session.clear().await;
                self.login().await?;
                relogged = true;
                continue;
            }

            if !status.is_success() {
                // Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
                return Err(anyhow::anyhow!("API request failed: {}", status));
            }

            if response_body.trim().is_empty() {
                return Ok(Value::Null);
            }

            return serde_json::from_str(&response_body).context("Failed to parse response JSON");
        }
    }
}

/// Whether the error chain carries an HTTP status raised by [`RestClient`]
fn has_status(error_str: &str, code: u16) -> bool {
    error_str.contains(&format!("failed: {}", code))
}

/// Format an API error for display
pub fn format_api_error(error: &anyhow::Error) -> String {
    let error_str = format!("{:#}", error);

    if has_status(&error_str, 401) {
        return "Authentication failed. Check the user name and password.".to_string();
    }
    if has_status(&error_str, 403) {
        return "Permission denied. Check the user's privileges on the endpoint.".to_string();
    }
    if has_status(&error_str, 404) {
        return "Resource not found.".to_string();
    }
    if has_status(&error_str, 409) {
        return "Resource conflict. The resource may already exist or be in use.".to_string();
    }
    if has_status(&error_str, 429) {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if has_status(&error_str, 400) {
        return "Invalid request. The resource may not be in a valid state for this operation."
            .to_string();
    }
    if has_status(&error_str, 500) || has_status(&error_str, 503) {
        return "Endpoint temporarily unavailable. Please try again.".to_string();
    }
    if error_str.contains("Failed to connect") || error_str.contains("Failed to send request") {
        return "Could not reach the endpoint. Check the host name and network.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
