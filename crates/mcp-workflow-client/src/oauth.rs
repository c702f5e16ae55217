//! OAuth2 authorization-code client.
//!
//! Covers the flows an MCP client needs: building the authorization URL
//! (with optional PKCE), exchanging authorization codes and refresh tokens,
//! authorization-server metadata discovery (RFC 8414) and dynamic client
//! registration (RFC 7591).
//!
//! A failed refresh is a soft failure: a 4xx from the token endpoint logs a
//! warning and yields `None` so callers can fall back to a full
//! authorization flow. Everything else propagates.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use mcp_workflow_core::error::{Result, WorkflowError};

const WELL_KNOWN_PATH: &str = "/.well-known/oauth-authorization-server";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            expires_in: None,
            refresh_token: None,
            scope: None,
        }
    }
}

/// RFC 8414 authorization-server metadata, possibly synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// RFC 7591 registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct AuthorizeInfo {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct OAuth2AuthorizationCodeClient {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    http: reqwest::Client,
}

impl OAuth2AuthorizationCodeClient {
    pub fn new(
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        scope: Option<String>,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret,
            scope,
            http: reqwest::Client::new(),
        }
    }

    /// Cryptographically random opaque state value.
    pub fn generate_state() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Generate a PKCE verifier/S256-challenge pair (RFC 7636).
    pub fn generate_pkce_pair() -> (String, String) {
        let mut bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        (verifier, challenge)
    }

    /// Build the authorization URL for the code flow.
    pub fn authorize_info(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> AuthorizeInfo {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &self.client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", self.scope.as_deref().unwrap_or(""));
        query.append_pair("state", state);
        if let Some(code_challenge) = code_challenge {
            query.append_pair("code_challenge", code_challenge);
            query.append_pair("code_challenge_method", "S256");
        }
        AuthorizeInfo {
            url: format!("{}?{}", self.authorization_endpoint, query.finish()),
            state: state.to_owned(),
        }
    }

    /// Redeem an authorization code at the token endpoint.
    pub async fn exchange_authorization_code(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthToken> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                endpoint = %self.token_endpoint,
                "authorization code exchange failed"
            );
            return Err(WorkflowError::HttpStatus {
                status: status.as_u16(),
                url: self.token_endpoint.clone(),
            });
        }
        Ok(response.json().await?)
    }

    /// Redeem a refresh token. A 4xx means the grant is no longer usable and
    /// yields `None`; other failures propagate.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<Option<OAuthToken>> {
        let scope = scopes.join(" ");
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        if status.is_client_error() {
            tracing::warn!(
                status = status.as_u16(),
                endpoint = %self.token_endpoint,
                "refresh token exchange failed"
            );
            return Ok(None);
        }
        if !status.is_success() {
            return Err(WorkflowError::HttpStatus {
                status: status.as_u16(),
                url: self.token_endpoint.clone(),
            });
        }
        Ok(Some(response.json().await?))
    }

    /// Fetch `{origin}/.well-known/oauth-authorization-server`. A 404 yields
    /// conventional defaults under the same origin; other non-2xx responses
    /// propagate.
    pub async fn server_metadata_discovery(base_url: &str) -> Result<ServerMetadata> {
        let origin = origin_of(base_url)?;
        let url = format!("{origin}{WELL_KNOWN_PATH}");

        let response = reqwest::Client::new().get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(ServerMetadata {
                issuer: Some(origin.clone()),
                authorization_endpoint: format!("{origin}/authorize"),
                token_endpoint: format!("{origin}/token"),
                registration_endpoint: Some(format!("{origin}/register")),
                extra: Map::new(),
            });
        }
        if !status.is_success() {
            return Err(WorkflowError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    /// Register a client via RFC 7591 dynamic registration.
    pub async fn dynamic_client_registration(
        registration_endpoint: &str,
        redirect_uris: &[String],
    ) -> Result<ClientRegistration> {
        let payload = json!({
            "redirect_uris": redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "client_secret_post",
        });

        let response = reqwest::Client::new()
            .post(registration_endpoint)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::HttpStatus {
                status: status.as_u16(),
                url: registration_endpoint.to_owned(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Split a scope string on whitespace, collapsing runs; empty input yields
/// an empty list.
pub fn split_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_owned).collect()
}

fn origin_of(base_url: &str) -> Result<String> {
    let url = url::Url::parse(base_url)
        .map_err(|e| WorkflowError::configuration(format!("invalid server url {base_url:?}: {e}")))?;
    match url.origin() {
        url::Origin::Tuple(..) => Ok(url.origin().ascii_serialization()),
        url::Origin::Opaque(_) => Err(WorkflowError::configuration(format!(
            "server url {base_url:?} has no http origin"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(token_endpoint: String) -> OAuth2AuthorizationCodeClient {
        OAuth2AuthorizationCodeClient::new(
            "https://example.com/authorize",
            token_endpoint,
            "client_id",
            Some("client_secret".into()),
            Some("scope".into()),
        )
    }

    #[test]
    fn test_generate_state_opaque() {
        let a = OAuth2AuthorizationCodeClient::generate_state();
        let b = OAuth2AuthorizationCodeClient::generate_state();
        assert_ne!(a, b);
        assert!(a.len() >= 32);
    }

    #[test]
    fn test_authorize_info_url() {
        let client = client("https://example.com/token".into());
        let state = OAuth2AuthorizationCodeClient::generate_state();
        let info = client.authorize_info("https://localhost", &state, None);
        assert_eq!(
            info.url,
            format!(
                "https://example.com/authorize?response_type=code&client_id=client_id&redirect_uri=https%3A%2F%2Flocalhost&scope=scope&state={state}"
            )
        );
    }

    #[test]
    fn test_authorize_info_pkce() {
        let client = client("https://example.com/token".into());
        let (verifier, challenge) = OAuth2AuthorizationCodeClient::generate_pkce_pair();
        assert!(verifier.len() >= 43);
        let info = client.authorize_info("https://localhost", "xyz", Some(&challenge));
        assert!(info.url.contains(&format!("code_challenge={challenge}")));
        assert!(info.url.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn test_exchange_authorization_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=xxx"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(OAuthToken::new("123")),
            )
            .mount(&server)
            .await;

        let client = client(format!("{}/token", server.uri()));
        let token = client
            .exchange_authorization_code("https://localhost", "xxx", None)
            .await
            .unwrap();
        assert_eq!(token.access_token, "123");
    }

    #[tokio::test]
    async fn test_exchange_authorization_code_pkce() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code_verifier="))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(OAuthToken::new("123")),
            )
            .mount(&server)
            .await;

        let (verifier, _) = OAuth2AuthorizationCodeClient::generate_pkce_pair();
        let client = client(format!("{}/token", server.uri()));
        let token = client
            .exchange_authorization_code("https://localhost", "xxx", Some(&verifier))
            .await
            .unwrap();
        assert_eq!(token.access_token, "123");
    }

    #[tokio::test]
    async fn test_exchange_authorization_code_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client(format!("{}/token", server.uri()));
        let err = client
            .exchange_authorization_code("https://localhost", "xxx", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::HttpStatus { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_exchange_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(OAuthToken::new("123")),
            )
            .mount(&server)
            .await;

        let client = client(format!("{}/token", server.uri()));
        let token = client
            .exchange_refresh_token("xyz", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.access_token, "123");
    }

    #[tokio::test]
    async fn test_exchange_refresh_token_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client(format!("{}/token", server.uri()));
        let token = client.exchange_refresh_token("xyz", &[]).await.unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_server_metadata_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "authorization_endpoint": "http://127.0.0.1:8000/authorize",
                "token_endpoint": "http://127.0.0.1:8000/token",
                "registration_endpoint": "http://127.0.0.1:8000/register",
            })))
            .mount(&server)
            .await;

        let metadata = OAuth2AuthorizationCodeClient::server_metadata_discovery(&format!(
            "{}/mcp/",
            server.uri()
        ))
        .await
        .unwrap();
        assert_eq!(
            metadata.authorization_endpoint,
            "http://127.0.0.1:8000/authorize"
        );
    }

    #[tokio::test]
    async fn test_server_metadata_discovery_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = server.uri();
        let metadata =
            OAuth2AuthorizationCodeClient::server_metadata_discovery(&format!("{base}/mcp/"))
                .await
                .unwrap();
        assert_eq!(metadata.authorization_endpoint, format!("{base}/authorize"));
        assert_eq!(metadata.token_endpoint, format!("{base}/token"));
        assert_eq!(
            metadata.registration_endpoint,
            Some(format!("{base}/register"))
        );
    }

    #[tokio::test]
    async fn test_server_metadata_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = OAuth2AuthorizationCodeClient::server_metadata_discovery(&format!(
            "{}/mcp/",
            server.uri()
        ))
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::HttpStatus { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_dynamic_client_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "client_id",
                "client_secret": "client_secret",
                "redirect_uris": ["http://localhost"],
            })))
            .mount(&server)
            .await;

        let registration = OAuth2AuthorizationCodeClient::dynamic_client_registration(
            &format!("{}/register", server.uri()),
            &["http://localhost".to_owned()],
        )
        .await
        .unwrap();
        assert_eq!(registration.client_id, "client_id");
    }

    #[test]
    fn test_split_scopes() {
        assert_eq!(split_scopes("a      b   c"), vec!["a", "b", "c"]);
        assert_eq!(split_scopes("ab c"), vec!["ab", "c"]);
        assert_eq!(split_scopes("a"), vec!["a"]);
        assert!(split_scopes("").is_empty());
    }
}
