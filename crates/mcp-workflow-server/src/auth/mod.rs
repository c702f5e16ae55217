//! OAuth authorization-server providers for the engine's own MCP surface.
//!
//! Two variants: [`pass_thru::PassThruAuthServerProvider`] makes the engine
//! its own authorization server (code exchange delegated to a
//! [`TokenExchanger`] hook), while
//! [`third_party::ThirdPartyAuthServerProvider`] fronts an upstream OAuth
//! provider. Both mint HS256-signed JWTs as access and refresh tokens
//! carrying `{token, client_id, scopes, expires_at}`; JWT decode errors are
//! silent (`None`), not fatal.

pub mod pass_thru;
pub mod third_party;

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mcp_workflow_client::OAuthToken;

use crate::cache::AsyncCache;
use crate::error::{Result, ServerError};

/// In-flight authorization request parameters, cached by state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParams {
    pub state: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code_challenge: String,
    #[serde(default)]
    pub redirect_uri_provided_explicitly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub scopes: Vec<String>,
    pub expires_at: f64,
    pub code_challenge: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub redirect_uri_provided_explicitly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<i64>,
}

/// A registered OAuth client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInformation {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientInformation {
    pub fn new(client_id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uris,
            scope: None,
            extra: Map::new(),
        }
    }
}

/// Storage for registered OAuth clients.
#[async_trait]
pub trait ClientManager: Send + Sync {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientInformation>>;
    async fn save_client(&self, client: &ClientInformation) -> Result<()>;
}

/// In-memory client manager.
#[derive(Default)]
pub struct MemoryClientManager {
    clients: tokio::sync::RwLock<std::collections::HashMap<String, ClientInformation>>,
}

impl MemoryClientManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientManager for MemoryClientManager {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientInformation>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn save_client(&self, client: &ClientInformation) -> Result<()> {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }
}

/// Hook that performs the actual code/refresh exchange for the pass-thru
/// provider.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_authorization_code(
        &self,
        client: &ClientInformation,
        code: &AuthorizationCode,
    ) -> Result<OAuthToken>;

    async fn exchange_refresh_token(
        &self,
        client: &ClientInformation,
        refresh_token: &RefreshToken,
        scopes: &[String],
    ) -> Result<Option<OAuthToken>>;
}

/// The authorization-server contract the MCP surface consumes.
#[async_trait]
pub trait AuthServerProvider: Send + Sync {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientInformation>>;
    async fn register_client(&self, client: &ClientInformation) -> Result<()>;

    /// Build the URL the end user is redirected to.
    async fn authorize(
        &self,
        client: &ClientInformation,
        params: &AuthorizationParams,
    ) -> Result<String>;

    async fn load_authorization_code(
        &self,
        client: &ClientInformation,
        code: &str,
    ) -> Result<Option<AuthorizationCode>>;

    async fn exchange_authorization_code(
        &self,
        client: &ClientInformation,
        code: &AuthorizationCode,
    ) -> Result<OAuthToken>;

    async fn load_refresh_token(
        &self,
        client: &ClientInformation,
        refresh_token: &str,
    ) -> Result<Option<RefreshToken>>;

    async fn exchange_refresh_token(
        &self,
        client: &ClientInformation,
        refresh_token: &RefreshToken,
        scopes: &[String],
    ) -> Result<Option<OAuthToken>>;

    async fn load_access_token(&self, access_token: &str) -> Result<Option<AccessToken>>;

    async fn revoke_token(&self, token: &str) -> Result<()>;
}

/// Claims carried by our signed access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<i64>,
}

/// Sign claims with HS256.
pub fn sign_claims<T: Serialize>(secret_key: &str, claims: &T) -> Result<String> {
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )?)
}

/// Decode HS256-signed claims; any error (bad signature, malformed token)
/// yields `None`.
pub fn decode_claims<T: DeserializeOwned>(secret_key: &str, token: &str) -> Option<T> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    jsonwebtoken::decode::<T>(
        token,
        &DecodingKey::from_secret(secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

/// Wrap an upstream token into our own signed JWT pair.
pub fn wrap_token(
    secret_key: &str,
    client_id: &str,
    scopes: &[String],
    upstream: &OAuthToken,
) -> Result<OAuthToken> {
    let expires_at = upstream
        .expires_in
        .map(|seconds| chrono::Utc::now().timestamp() + seconds as i64);

    let access_token = sign_claims(
        secret_key,
        &TokenClaims {
            token: upstream.access_token.clone(),
            client_id: client_id.to_owned(),
            scopes: scopes.to_vec(),
            expires_at,
        },
    )?;
    let refresh_token = sign_claims(
        secret_key,
        &TokenClaims {
            token: upstream
                .refresh_token
                .clone()
                .unwrap_or_else(|| upstream.access_token.clone()),
            client_id: client_id.to_owned(),
            scopes: scopes.to_vec(),
            expires_at: None,
        },
    )?;

    Ok(OAuthToken {
        access_token,
        token_type: Some("Bearer".to_owned()),
        expires_in: upstream.expires_in,
        refresh_token: Some(refresh_token),
        scope: upstream.scope.clone(),
    })
}

/// Decode a refresh token JWT into a [`RefreshToken`].
pub(crate) fn refresh_token_from_jwt(secret_key: &str, token: &str) -> Option<RefreshToken> {
    let claims: TokenClaims = decode_claims(secret_key, token)?;
    Some(RefreshToken {
        token: claims.token,
        client_id: claims.client_id,
        scopes: claims.scopes,
        expires_at: claims.expires_at,
    })
}

/// Decode an access token JWT into an [`AccessToken`].
pub(crate) fn access_token_from_jwt(secret_key: &str, token: &str) -> Option<AccessToken> {
    let claims: TokenClaims = decode_claims(secret_key, token)?;
    Some(AccessToken {
        token: claims.token,
        client_id: claims.client_id,
        scopes: claims.scopes,
        expires_at: claims.expires_at,
    })
}

/// Serialize authorization params into the cache under `key`.
pub async fn cache_set_params(
    cache: &dyn AsyncCache,
    key: &str,
    params: &AuthorizationParams,
) -> Result<()> {
    let encoded = serde_json::to_string(params)
        .map_err(mcp_workflow_core::error::WorkflowError::from)?;
    cache
        .set(key, encoded, Some(Duration::from_secs(600)))
        .await;
    Ok(())
}

/// Read authorization params cached under `key`.
pub async fn cache_get_params(
    cache: &dyn AsyncCache,
    key: &str,
) -> Result<Option<AuthorizationParams>> {
    match cache.get(key).await {
        Some(encoded) => {
            let params = serde_json::from_str(&encoded)
                .map_err(mcp_workflow_core::error::WorkflowError::from)?;
            Ok(Some(params))
        }
        None => Ok(None),
    }
}

/// Build an [`AuthorizationCode`] from cached params.
pub(crate) fn code_from_params(
    client: &ClientInformation,
    code: &str,
    params: AuthorizationParams,
) -> AuthorizationCode {
    AuthorizationCode {
        code: code.to_owned(),
        scopes: params.scopes,
        expires_at: 0.0,
        code_challenge: params.code_challenge,
        client_id: client.client_id.clone(),
        redirect_uri: params.redirect_uri,
        redirect_uri_provided_explicitly: params.redirect_uri_provided_explicitly,
    }
}

/// Surface an upstream exchange failure as an HTTP 500, logging status
/// errors and unexpected errors distinctly.
pub(crate) fn upstream_error(error: mcp_workflow_core::error::WorkflowError) -> ServerError {
    match &error {
        mcp_workflow_core::error::WorkflowError::HttpStatus { status, url } => {
            tracing::error!(status, url = %url, "upstream token exchange failed");
        }
        other => {
            tracing::error!(error = %other, "unexpected error during token exchange");
        }
    }
    ServerError::http(500)
}
