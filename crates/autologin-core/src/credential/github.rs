use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::SecretBackend;
use crate::config::GITHUB_API_BASE;

/// Actions secret that carries the GitHub session cookie between runs.
pub const SESSION_SECRET_NAME: &str = "GH_SESSION";

const API_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("autologin/", env!("CARGO_PKG_VERSION"));

/// GitHub Actions repository secrets.
pub struct GithubSecretStore {
    client: Client,
    api_base: String,
    token: String,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct SecretPayload<'a> {
    encrypted_value: String,
    key_id: &'a str,
}

impl GithubSecretStore {
    pub fn new(token: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: GITHUB_API_BASE.to_string(),
            token: token.into(),
            repository: repository.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn secrets_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/actions/secrets/{}",
            self.api_base.trim_end_matches('/'),
            self.repository,
            tail
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
    }

    async fn public_key(&self) -> Result<RepoPublicKey> {
        let response = self
            .request(reqwest::Method::GET, self.secrets_url("public-key"))
            .send()
            .await
            .context("Failed to fetch repository public key")?;

        let status = response.status();
        if status != StatusCode::OK {
            bail!("Fetching repository public key returned HTTP {}", status.as_u16());
        }

        response
            .json()
            .await
            .context("Repository public key response was malformed")
    }
}

/// Encrypt `value` into a libsodium sealed box for `public_key` (base64).
pub(crate) fn seal(public_key: &str, value: &str) -> Result<String> {
    let decoded = BASE64
        .decode(public_key.trim())
        .context("Repository public key is not valid base64")?;
    let bytes = <[u8; 32]>::try_from(decoded.as_slice())
        .map_err(|_| anyhow!("Repository public key must be 32 bytes, got {}", decoded.len()))?;

    let sealed = PublicKey::from(bytes)
        .seal(&mut OsRng, value.as_bytes())
        .map_err(|_| anyhow!("Failed to seal secret value"))?;

    Ok(BASE64.encode(sealed))
}

#[async_trait]
impl SecretBackend for GithubSecretStore {
    fn name(&self) -> &str {
        "GitHub Actions secrets"
    }

    async fn update_secret(&self, name: &str, value: &str) -> Result<()> {
        let key = self.public_key().await?;
        let payload = SecretPayload {
            encrypted_value: seal(&key.key, value)?,
            key_id: &key.key_id,
        };

        let response = self
            .request(reqwest::Method::PUT, self.secrets_url(name))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to update secret {name}"))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!(repository = %self.repository, "Secret {} updated", name);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!(
                    "Updating secret {} returned HTTP {}: {}",
                    name,
                    status.as_u16(),
                    body.trim()
                ))
            }
        }
    }
}
