use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::heartbeat::Heartbeat;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const HEADER_ORGANIZATION_KEY: &str = "X-ORGANIZATION-KEY";
pub const HEADER_ACCESS_KEY: &str = "X-API-ACCESS-KEY";
pub const HEADER_SECRET_KEY: &str = "X-API-SECRET-KEY";

/// HTTP client for the controller API
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
    organization_key: String,
    access_key: String,
    secret_key: String,
}

impl ApiClient {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.skip_ssl_verify);

        if let Some(ca_file) = AgentConfig::tls_path(&config.ca_file) {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("failed to read CA file {}", ca_file))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("invalid CA certificate in {}", ca_file))?;
            builder = builder.add_root_certificate(cert);
        }

        match (
            AgentConfig::tls_path(&config.cert_file),
            AgentConfig::tls_path(&config.key_file),
        ) {
            (Some(cert_file), Some(key_file)) => {
                let cert = std::fs::read(cert_file)
                    .with_context(|| format!("failed to read client certificate {}", cert_file))?;
                let key = std::fs::read(key_file)
                    .with_context(|| format!("failed to read client key {}", key_file))?;
                let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key)
                    .context("invalid client certificate or key")?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => bail!("cert_file and key_file must be set together"),
        }

        if config.skip_ssl_verify {
            info!("TLS certificate verification disabled");
        }

        Ok(Self {
            client: builder.build().context("failed to build HTTP client")?,
            api_url: config.api_url.clone(),
            organization_key: config.organization_key.clone(),
            access_key: config.api_access_key.clone(),
            secret_key: config.api_secret_key.clone(),
        })
    }

    pub fn ping_url(&self) -> Result<String> {
        let base = self.api_url.trim().trim_end_matches('/');
        if base.is_empty() {
            bail!("api_url is not configured");
        }
        Ok(format!("{}/agents/ping", base))
    }
}

#[async_trait]
impl Heartbeat for ApiClient {
    async fn ping(&self) -> Result<()> {
        let url = self.ping_url()?;
        let resp = self
            .client
            .get(&url)
            .header(HEADER_ORGANIZATION_KEY, &self.organization_key)
            .header(HEADER_ACCESS_KEY, &self.access_key)
            .header(HEADER_SECRET_KEY, &self.secret_key)
            .send()
            .await
            .with_context(|| format!("ping to {} failed", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("ping rejected: {} - {}", status, body.trim());
        }

        debug!("pong from {}", url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> ApiClient {
        let config = AgentConfig {
            api_url: api_url.to_string(),
            ..AgentConfig::default()
        };
        ApiClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_ping_url() {
        let expected = "https://siem.local/api/agents/ping";
        assert_eq!(client("https://siem.local/api").ping_url().unwrap(), expected);
        assert_eq!(client("https://siem.local/api/").ping_url().unwrap(), expected);
    }

    #[test]
    fn test_empty_api_url_is_an_error() {
        assert!(client("").ping_url().is_err());
        assert!(client("   ").ping_url().is_err());
    }

    #[tokio::test]
    async fn test_ping_without_api_url_fails_before_sending() {
        let err = client("").ping().await.unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn test_half_configured_client_cert_is_rejected() {
        let config = AgentConfig {
            api_url: "https://siem.local".to_string(),
            cert_file: Some("/etc/ss-agent/client.pem".to_string()),
            ..AgentConfig::default()
        };
        assert!(ApiClient::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_ca_file_is_an_error() {
        let config = AgentConfig {
            api_url: "https://siem.local".to_string(),
            ca_file: Some("/nonexistent/ca.pem".to_string()),
            ..AgentConfig::default()
        };
        let err = ApiClient::from_config(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("/nonexistent/ca.pem"));
    }
}
