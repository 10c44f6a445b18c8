//! HTTP implementation of the ConnectLife cloud client

use super::{Appliance, ApplianceClient};
use crate::config::CloudConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// reqwest-based cloud client with bearer-token authentication.
///
/// A 401 on a data call forces one re-login and retry; a second 401 is
/// surfaced as [`BridgeError::Authentication`] so the coordinator stops the
/// refresh cycle.
pub struct HttpApplianceClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl HttpApplianceClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::config(format!("invalid endpoint {path}: {e}")))
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await?;
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| BridgeError::authentication("login did not produce a token"))
    }

    fn map_transport_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::timeout(e.to_string())
        } else if e.is_connect() {
            BridgeError::connection(e.to_string())
        } else {
            BridgeError::Http(e)
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(BridgeError::authentication(format!("{status}: {body}"))),
            500..=599 => Err(BridgeError::ServiceUnavailable(format!("{status}: {body}"))),
            _ => Err(BridgeError::appliance_control(format!("{status}: {body}"))),
        }
    }
}

#[async_trait]
impl ApplianceClient for HttpApplianceClient {
    async fn login(&self) -> Result<()> {
        let url = self.endpoint("v1/oauth/login")?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::authentication(format!("{status}: {body}")));
        }

        let login: LoginResponse = response.json().await.map_err(Self::map_transport_error)?;
        *self.token.write().await = Some(login.access_token);
        debug!("cloud login succeeded");
        Ok(())
    }

    async fn get_appliances(&self) -> Result<Vec<Appliance>> {
        let url = self.endpoint("v1/appliances")?;
        let token = self.bearer().await?;
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        // Expired token: re-login once and retry.
        let response = if response.status().as_u16() == 401 {
            self.token.write().await.take();
            self.login().await?;
            let token = self.bearer().await?;
            self.http
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(Self::map_transport_error)?
        } else {
            response
        };

        let response = Self::check_status(response).await?;
        response.json().await.map_err(Self::map_transport_error)
    }

    async fn update_appliance(
        &self,
        puid: &str,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        let url = self.endpoint(&format!("v1/appliances/{puid}"))?;
        let token = self.bearer().await?;
        debug!(puid, ?properties, "writing appliance properties");
        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&properties)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}
