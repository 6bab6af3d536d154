use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::{ClientError, ClientResult, detail_message};
use crate::transport::{AUTHORIZATION_HEADER, HttpRequest, HttpResponse, Transport};

const LOGIN_PATH: &str = "api/v1/auth/login";
const REGISTER_PATH: &str = "api/v1/auth/register";

/// Bearer token issued by the service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Login {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        name: Option<String>,
    },
}

impl Credentials {
    pub fn login(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Login {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn register(
        email: impl Into<String>,
        password: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self::Register {
            email: email.into(),
            password: password.into(),
            name,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Self::Login { email, .. } | Self::Register { email, .. } => email,
        }
    }

    fn password(&self) -> &str {
        match self {
            Self::Login { password, .. } | Self::Register { password, .. } => password,
        }
    }

    fn to_request(&self) -> HttpRequest {
        match self {
            Self::Login { email, password } => HttpRequest::post(
                LOGIN_PATH,
                json!({ "email": email.trim(), "password": password }),
            ),
            Self::Register {
                email,
                password,
                name,
            } => {
                let mut body = json!({ "email": email.trim(), "password": password });
                if let Some(name) = name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                    body["name"] = json!(name);
                }
                HttpRequest::post(REGISTER_PATH, body)
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Login { .. } => "Login",
            Self::Register { .. } => "Register",
        };
        f.debug_struct(kind)
            .field("email", &self.email())
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Holds the bearer credential and stamps it onto outgoing requests.
///
/// One `Session` is shared by reference between the gateway and whoever
/// drives authentication; a credential stored by `authenticate` is seen by
/// every request sent after it returns.
pub struct Session {
    transport: Arc<dyn Transport>,
    credential: RwLock<Option<Credential>>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            credential: RwLock::new(None),
        }
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.read().is_some()
    }

    pub fn sign_out(&self) {
        if self.credential.write().take().is_some() {
            info!("signed out");
        }
    }

    /// Logs in or registers; on any failure the previous credential stays.
    #[instrument(skip_all, fields(email = %credentials.email()))]
    pub async fn authenticate(&self, credentials: Credentials) -> ClientResult<Credential> {
        if credentials.email().trim().is_empty() || credentials.password().is_empty() {
            return Err(ClientError::validation("email and password are required"));
        }

        let response = self
            .transport
            .send(credentials.to_request())
            .await
            .map_err(|err| ClientError::AuthFailed(err.to_string()))?;

        if !response.is_success() {
            let message = detail_message(&response.body)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            warn!(status = response.status, message = %message, "authentication rejected");
            return Err(ClientError::AuthFailed(message));
        }

        let token: TokenResponse = serde_json::from_str(&response.body).map_err(|err| {
            ClientError::AuthFailed(format!("unreadable token response: {err}"))
        })?;
        if token.access_token.trim().is_empty() {
            return Err(ClientError::AuthFailed(
                "service returned an empty access token".to_string(),
            ));
        }
        if let Some(kind) = token.token_type.as_deref()
            && !kind.eq_ignore_ascii_case("bearer")
        {
            warn!(token_type = kind, "unexpected token type; sending as bearer anyway");
        }

        let credential = Credential::new(token.access_token);
        *self.credential.write() = Some(credential.clone());
        info!("authenticated");
        Ok(credential)
    }

    /// Sends `request`, attaching the bearer credential when one is held.
    pub async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let bearer = self.credential.read().as_ref().map(Credential::bearer);
        let request = match bearer {
            Some(value) => request.with_header(AUTHORIZATION_HEADER, value),
            None => {
                debug!(path = %request.path, "sending without credential");
                request
            }
        };
        self.transport.send(request).await
    }
}
