use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("invalid signing secret")]
    Secret,

    #[error("unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Response body shared by every gateway endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub trace_id: String,
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

/// Identity of a registered app.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub app_id: String,
    pub api_key: String,
    pub secret: String,
}

/// A fully signed request. Sending the same one twice replays its nonce.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl PreparedRequest {
    pub fn set_header(&mut self, name: &'static str, value: &str) -> Result<(), SdkError> {
        self.headers
            .insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
        Ok(())
    }
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
    app: Option<AppCredentials>,
    token: Option<String>,
    sign_bodies: bool,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            app: None,
            token: None,
            sign_bodies: true,
        }
    }

    pub fn with_app(mut self, app: AppCredentials) -> Self {
        self.app = Some(app);
        self
    }

    /// Bearer token sent as `Authorization: Bearer ...`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Skip `X-Signature`; the gateway then treats an optional signature as absent.
    pub fn without_signature(mut self) -> Self {
        self.sign_bodies = false;
        self
    }

    /// Build a request with a fresh nonce, the current timestamp and every
    /// credential the client holds.
    pub fn prepare(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<PreparedRequest, SdkError> {
        let body = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };

        let mut request = PreparedRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers: HeaderMap::new(),
            body,
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        request.set_header("x-nonce", &uuid::Uuid::new_v4().simple().to_string())?;
        request.set_header("x-timestamp", &timestamp.to_string())?;

        if !request.body.is_empty() {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if let Some(app) = &self.app {
            request.set_header("x-api-key", &app.api_key)?;
            request.set_header("x-app-id", &app.app_id)?;
            if self.sign_bodies {
                let signature = sign(&request.body, app.secret.as_bytes())?;
                request.set_header("x-signature", &signature)?;
            }
        }

        if let Some(token) = &self.token {
            request
                .headers
                .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
        }

        Ok(request)
    }

    pub async fn execute(&self, request: PreparedRequest) -> Result<reqwest::Response, SdkError> {
        Ok(self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?)
    }

    /// Send a request and decode the envelope, whatever the status.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, Envelope<T>), SdkError> {
        let request = self.prepare(method, path, body)?;
        let response = self.execute(request).await?;
        decode(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, Envelope<T>), SdkError> {
        self.call(Method::GET, path, None).await
    }
}

/// Split a response into its status and envelope.
pub async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<(StatusCode, Envelope<T>), SdkError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &[u8]) -> Result<String, SdkError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SdkError::Secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
