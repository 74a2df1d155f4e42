use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kozani_core::auth::{
    AuthError, CredentialStore, Credentials, DeviceFlow, DeviceFlowEvent, UserIdentity,
};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

pub const GITHUB_LOGIN_URL: &str = "https://github.com";
pub const GITHUB_API_URL: &str = "https://api.github.com";
const SCOPE: &str = "read:user";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    device_code: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollDecision {
    Granted { token: String, token_type: String },
    Wait(Duration),
    Fail(AuthError),
}

/// GitHub OAuth device-authorization flow.
///
/// The token is persisted through the credential store before `Success` is
/// reported.
pub struct GithubDeviceFlow {
    http: Client,
    client_id: String,
    login_url: String,
    api_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl GithubDeviceFlow {
    pub fn new(
        client_id: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        Self::with_endpoints(client_id, credentials, GITHUB_LOGIN_URL, GITHUB_API_URL)
    }

    pub fn with_endpoints(
        client_id: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
        login_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(concat!("kozani/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(to_auth_error)?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            login_url: trim_base(login_url.into()),
            api_url: trim_base(api_url.into()),
            credentials,
        })
    }

    async fn login(&self, events: &UnboundedSender<DeviceFlowEvent>) -> Result<String, AuthError> {
        let device = self.request_device_code().await?;
        tracing::info!(verification_uri = %device.verification_uri, "received device code");
        notify(
            events,
            DeviceFlowEvent::AwaitingVerification {
                code: device.user_code.clone(),
                url: device.verification_uri.clone(),
            },
        );

        let deadline = Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = device
            .interval
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs);

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(expired_error());
            }

            tracing::debug!("polling for device authorization");
            let response = self.poll_token(&device.device_code).await?;
            match decide(response, interval) {
                PollDecision::Granted { token, token_type } => {
                    self.save_credentials(Credentials {
                        token: token.clone(),
                        token_type,
                    })
                    .await?;
                    return Ok(token);
                }
                PollDecision::Wait(next) => interval = next,
                PollDecision::Fail(error) => return Err(error),
            }
        }
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse, AuthError> {
        let response = self
            .http
            .post(format!("{}/login/device/code", self.login_url))
            .header(ACCEPT, "application/json")
            .json(&DeviceCodeRequest {
                client_id: &self.client_id,
                scope: SCOPE,
            })
            .send()
            .await
            .map_err(to_auth_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::new(format!(
                "GitHub rejected the device code request ({status}): {body}"
            )));
        }
        response.json().await.map_err(to_auth_error)
    }

    async fn poll_token(&self, device_code: &str) -> Result<TokenResponse, AuthError> {
        self.http
            .post(format!("{}/login/oauth/access_token", self.login_url))
            .header(ACCEPT, "application/json")
            .json(&TokenRequest {
                client_id: &self.client_id,
                device_code,
                grant_type: DEVICE_GRANT_TYPE,
            })
            .send()
            .await
            .map_err(to_auth_error)?
            .json()
            .await
            .map_err(to_auth_error)
    }

    async fn save_credentials(&self, credentials: Credentials) -> Result<(), AuthError> {
        let store = Arc::clone(&self.credentials);
        tokio::task::spawn_blocking(move || store.save(&credentials))
            .await
            .map_err(|error| AuthError::new(format!("credential task failed: {error}")))?
            .map_err(|error| AuthError::new(format!("failed to save credentials: {error}")))?;
        tracing::info!("authentication successful, credentials saved");
        Ok(())
    }
}

#[async_trait]
impl DeviceFlow for GithubDeviceFlow {
    async fn run(&self, events: UnboundedSender<DeviceFlowEvent>) {
        tracing::info!("starting GitHub device flow login");
        let outcome = match self.login(&events).await {
            Ok(token) => DeviceFlowEvent::Success { token },
            Err(error) => {
                tracing::error!(%error, "authentication failed");
                DeviceFlowEvent::Failure { error }
            }
        };
        notify(&events, outcome);
    }

    async fn fetch_user(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .header(ACCEPT, "application/vnd.github+json")
            .bearer_auth(token)
            .send()
            .await
            .map_err(to_auth_error)?;

        if !response.status().is_success() {
            return Err(AuthError::new(format!(
                "GitHub user lookup failed ({})",
                response.status()
            )));
        }
        let user: UserResponse = response.json().await.map_err(to_auth_error)?;
        Ok(UserIdentity {
            login: user.login,
            name: user.name.filter(|name| !name.trim().is_empty()),
        })
    }
}

fn decide(response: TokenResponse, interval: Duration) -> PollDecision {
    if let Some(token) = response.access_token.filter(|token| !token.is_empty()) {
        return PollDecision::Granted {
            token,
            token_type: response.token_type.unwrap_or_else(|| "bearer".to_string()),
        };
    }

    match response.error.as_deref() {
        Some("authorization_pending") => PollDecision::Wait(interval),
        Some("slow_down") => PollDecision::Wait(
            response
                .interval
                .map_or(interval + SLOW_DOWN_STEP, Duration::from_secs),
        ),
        Some("expired_token") => PollDecision::Fail(expired_error()),
        Some("access_denied") => PollDecision::Fail(AuthError::new("Authorization was denied.")),
        Some(code) => PollDecision::Fail(AuthError::new(
            response
                .error_description
                .unwrap_or_else(|| format!("GitHub returned `{code}`")),
        )),
        None => PollDecision::Fail(AuthError::new("Unexpected response from GitHub.")),
    }
}

fn expired_error() -> AuthError {
    AuthError::new("The device code has expired.")
}

fn notify(events: &UnboundedSender<DeviceFlowEvent>, event: DeviceFlowEvent) {
    if events.send(event).is_err() {
        tracing::debug!("device flow listener dropped");
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn to_auth_error(error: reqwest::Error) -> AuthError {
    AuthError::new(error.to_string())
}
