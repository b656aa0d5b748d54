use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::services::provider_gateway::{
    CompletionReply, CompletionRequest, FileUpload, GatewayError, ProviderErrorKind,
    ProviderGateway, RemoteFile,
};

/// Tokens this close to expiry are refreshed before use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    /// Base64 `client_id:client_secret` authorization key.
    pub credentials: String,
    pub scope: String,
    pub auth_url: String,
    pub base_url: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// GigaChat REST client.
pub struct GigaChatClient {
    client: reqwest::Client,
    settings: GigaChatSettings,
    token: Mutex<Option<AccessToken>>,
}

impl GigaChatClient {
    pub fn new(settings: GigaChatSettings) -> Result<Self, GatewayError> {
        if settings.credentials.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "GigaChat credentials are missing; set gigachat_credentials".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        // Held across the exchange so concurrent callers share one refresh.
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting GigaChat access token");
        let response = self
            .client
            .post(&self.settings.auth_url)
            .header(AUTHORIZATION, format!("Basic {}", self.settings.credentials))
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.settings.scope.as_str())])
            .send()
            .await?;

        let response = Self::check(response).await?;
        let body: TokenResponse = response.json().await?;

        let expires_at = DateTime::from_timestamp_millis(body.expires_at).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("bad token expiry {}", body.expires_at))
        })?;

        let token = AccessToken {
            value: body.access_token,
            expires_at,
        };
        let value = token.value.clone();
        *cached = Some(token);

        Ok(value)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::provider(status.as_u16(), message))
    }

    /// Status check for calls made with a bearer token; a rejected token is dropped.
    async fn check_authorized(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GatewayError> {
        let result = Self::check(response).await;
        if let Err(GatewayError::Provider {
            kind: ProviderErrorKind::Authentication,
            ..
        }) = &result
        {
            self.token.lock().await.take();
        }
        result
    }

    pub async fn get_file(&self, remote_id: &str) -> Result<RemoteFile, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.url(&format!("/files/{}", remote_id)))
            .bearer_auth(token)
            .send()
            .await?;

        Ok(self.check_authorized(response).await?.json().await?)
    }
}

#[async_trait]
impl ProviderGateway for GigaChatClient {
    async fn upload_file(&self, upload: FileUpload) -> Result<RemoteFile, GatewayError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| {
                GatewayError::InvalidRequest(format!(
                    "MIME type '{}' of {}: {}",
                    upload.mime_type, upload.name, e
                ))
            })?;
        let form = Form::new()
            .part("file", part)
            .text("purpose", upload.purpose.as_str());

        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url("/files"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let file: RemoteFile = self.check_authorized(response).await?.json().await?;
        if file.id.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "upload response carries an empty file id".to_string(),
            ));
        }

        tracing::debug!("Uploaded {} to GigaChat as {}", upload.name, file.id);
        match self.get_file(&file.id).await {
            Ok(info) => tracing::debug!(
                "Remote file {}: {:?}, {:?} bytes, purpose {:?}",
                info.id,
                info.filename,
                info.bytes,
                info.purpose
            ),
            Err(e) => tracing::debug!("Could not describe remote file {}: {}", file.id, e),
        }

        Ok(file)
    }

    async fn delete_file(&self, remote_id: &str) -> Result<(), GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/files/{}/delete", remote_id)))
            .bearer_auth(token)
            .send()
            .await?;

        let body: DeleteResponse = self.check_authorized(response).await?.json().await?;
        if !body.deleted {
            return Err(GatewayError::InvalidResponse(format!(
                "provider did not delete file {}",
                body.id
            )));
        }

        Ok(())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, GatewayError> {
        let payload = ChatPayload {
            model: &request.params.model,
            messages: request
                .messages
                .iter()
                .map(|turn| WireMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                    attachments: turn.file_ids.clone(),
                })
                .collect(),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            n: request.params.sample_count,
            stream: false,
            profanity_check: request.params.profanity_check,
        };

        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let body: CompletionResponse = self.check_authorized(response).await?.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::InvalidResponse("no choices in completion".to_string()))?;

        Ok(CompletionReply {
            role: choice.message.role,
            content: choice.message.content,
        })
    }
}

// Wire types

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch milliseconds.
    expires_at: i64,
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    n: u32,
    stream: bool,
    profanity_check: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct DeleteResponse {
    id: String,
    deleted: bool,
}
