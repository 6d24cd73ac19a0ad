//! reqwest implementation of [`GatewayApi`]

use super::GatewayApi;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use kook_common::ApiConfig;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response envelope shared by every REST endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GatewayData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SelfUser {
    #[serde(default)]
    online: bool,
}

/// REST client authenticated with the bot token
#[derive(Debug, Clone)]
pub struct HttpGatewayApi {
    base_url: String,
    token: String,
    http: Client,
}

impl HttpGatewayApi {
    pub fn new(config: &ApiConfig) -> GatewayResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Resolve(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Unwrap the envelope, mapping HTTP and API failures to errors
    async fn envelope<T: DeserializeOwned>(response: Response) -> GatewayResult<Option<T>> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: Envelope<T> = response.json().await?;
        if body.code != 0 {
            return Err(GatewayError::Api {
                code: body.code,
                message: body.message,
            });
        }
        Ok(body.data)
    }
}

#[async_trait]
impl GatewayApi for HttpGatewayApi {
    async fn gateway_url(&self, compress: bool) -> GatewayResult<String> {
        let url = self.url(&format!("/gateway/index?compress={}", u8::from(compress)));
        let response = self.authorized(self.http.get(&url)).send().await?;

        let data: GatewayData = Self::envelope(response)
            .await?
            .ok_or_else(|| GatewayError::Resolve("gateway response has no data".to_string()))?;
        tracing::debug!(url = %data.url, "Resolved gateway");
        Ok(data.url)
    }

    async fn notify_offline(&self) -> GatewayResult<()> {
        let url = self.url("/user/offline");
        let response = self.authorized(self.http.post(&url)).send().await?;
        Self::envelope::<Value>(response).await?;
        Ok(())
    }

    async fn is_online(&self) -> GatewayResult<bool> {
        let url = self.url("/user/me");
        let response = self.authorized(self.http.get(&url)).send().await?;
        let me: Option<SelfUser> = Self::envelope(response).await?;
        Ok(me.is_some_and(|u| u.online))
    }
}
