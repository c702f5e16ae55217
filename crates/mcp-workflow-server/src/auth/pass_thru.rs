//! Pass-thru authorization-server provider.
//!
//! The engine itself acts as the authorization server: dynamic client
//! registration is not supported, the authorization params are signed into
//! the outbound redirect state, and the actual code/refresh exchange is
//! delegated to a [`TokenExchanger`] hook supplied by the embedder. The
//! hook's tokens are returned unwrapped; refresh and access tokens issued by
//! this provider are signed JWTs like the third-party variant's.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mcp_workflow_client::OAuthToken;

use super::{
    access_token_from_jwt, cache_get_params, code_from_params, refresh_token_from_jwt,
    sign_claims, AccessToken, AuthServerProvider, AuthorizationCode, AuthorizationParams,
    ClientInformation, ClientManager, RefreshToken, TokenExchanger,
};
use crate::cache::AsyncCache;
use crate::error::{Result, ServerError};

/// Authorization params signed into the redirect `state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedState {
    params: AuthorizationParams,
}

pub struct PassThruAuthServerProvider {
    issuer_url: String,
    authorization_endpoint: String,
    cache: Arc<dyn AsyncCache>,
    client_manager: Arc<dyn ClientManager>,
    secret_key: String,
    exchanger: Arc<dyn TokenExchanger>,
}

impl PassThruAuthServerProvider {
    pub fn new(
        issuer_url: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        cache: Arc<dyn AsyncCache>,
        client_manager: Arc<dyn ClientManager>,
        secret_key: impl Into<String>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            authorization_endpoint: authorization_endpoint.into(),
            cache,
            client_manager,
            secret_key: secret_key.into(),
            exchanger,
        }
    }

    pub fn client_manager(&self) -> &Arc<dyn ClientManager> {
        &self.client_manager
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    fn callback_uri(&self) -> String {
        format!("{}/redirect", self.issuer_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AuthServerProvider for PassThruAuthServerProvider {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientInformation>> {
        self.client_manager.get_client(client_id).await
    }

    async fn register_client(&self, _client: &ClientInformation) -> Result<()> {
        Err(ServerError::NotSupported(
            "dynamic client registration".to_owned(),
        ))
    }

    async fn authorize(
        &self,
        client: &ClientInformation,
        params: &AuthorizationParams,
    ) -> Result<String> {
        let state = sign_claims(
            &self.secret_key,
            &SignedState {
                params: params.clone(),
            },
        )?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &client.client_id);
        query.append_pair("redirect_uri", &self.callback_uri());
        query.append_pair("scope", client.scope.as_deref().unwrap_or(""));
        query.append_pair("state", &state);
        Ok(format!("{}?{}", self.authorization_endpoint, query.finish()))
    }

    async fn load_authorization_code(
        &self,
        client: &ClientInformation,
        code: &str,
    ) -> Result<Option<AuthorizationCode>> {
        let Some(params) = cache_get_params(self.cache.as_ref(), code).await? else {
            return Ok(None);
        };
        Ok(Some(code_from_params(client, code, params)))
    }

    async fn exchange_authorization_code(
        &self,
        client: &ClientInformation,
        code: &AuthorizationCode,
    ) -> Result<OAuthToken> {
        self.exchanger.exchange_authorization_code(client, code).await
    }

    async fn load_refresh_token(
        &self,
        _client: &ClientInformation,
        refresh_token: &str,
    ) -> Result<Option<RefreshToken>> {
        Ok(refresh_token_from_jwt(&self.secret_key, refresh_token))
    }

    async fn exchange_refresh_token(
        &self,
        client: &ClientInformation,
        refresh_token: &RefreshToken,
        scopes: &[String],
    ) -> Result<Option<OAuthToken>> {
        self.exchanger
            .exchange_refresh_token(client, refresh_token, scopes)
            .await
    }

    async fn load_access_token(&self, access_token: &str) -> Result<Option<AccessToken>> {
        Ok(access_token_from_jwt(&self.secret_key, access_token))
    }

    async fn revoke_token(&self, _token: &str) -> Result<()> {
        Err(ServerError::NotSupported("token revocation".to_owned()))
    }
}
