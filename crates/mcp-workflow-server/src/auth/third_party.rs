//! Third-party authorization-server provider.
//!
//! Delegates the actual authorization to an upstream OAuth provider. The
//! in-flight [`AuthorizationParams`] are cached by state; the redirect
//! callback re-caches them under the authorization code so the token
//! endpoint can redeem it upstream and wrap the received token in our own
//! JWT. Upstream HTTP failures surface as HTTP 500.

use std::sync::Arc;

use async_trait::async_trait;

use mcp_workflow_client::{OAuth2AuthorizationCodeClient, OAuthToken};

use super::{
    access_token_from_jwt, cache_get_params, cache_set_params, code_from_params,
    refresh_token_from_jwt, upstream_error, wrap_token, AccessToken, AuthServerProvider,
    AuthorizationCode, AuthorizationParams, ClientInformation, ClientManager, RefreshToken,
};
use crate::cache::AsyncCache;
use crate::error::Result;

pub struct ThirdPartyAuthServerProvider {
    issuer_url: String,
    cache: Arc<dyn AsyncCache>,
    oauth: OAuth2AuthorizationCodeClient,
    client_manager: Arc<dyn ClientManager>,
    secret_key: String,
}

impl ThirdPartyAuthServerProvider {
    pub fn new(
        issuer_url: impl Into<String>,
        cache: Arc<dyn AsyncCache>,
        oauth: OAuth2AuthorizationCodeClient,
        client_manager: Arc<dyn ClientManager>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            cache,
            oauth,
            client_manager,
            secret_key: secret_key.into(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn AsyncCache> {
        &self.cache
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Our own callback endpoint, registered upstream as the redirect URI.
    fn callback_uri(&self) -> String {
        format!("{}/redirect", self.issuer_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AuthServerProvider for ThirdPartyAuthServerProvider {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientInformation>> {
        self.client_manager.get_client(client_id).await
    }

    async fn register_client(&self, client: &ClientInformation) -> Result<()> {
        self.client_manager.save_client(client).await.map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "client registration failed");
            e
        })
    }

    async fn authorize(
        &self,
        _client: &ClientInformation,
        params: &AuthorizationParams,
    ) -> Result<String> {
        cache_set_params(self.cache.as_ref(), &params.state, params).await?;
        let info = self
            .oauth
            .authorize_info(&self.callback_uri(), &params.state, None);
        Ok(info.url)
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
        let upstream = self
            .oauth
            .exchange_authorization_code(&self.callback_uri(), &code.code, None)
            .await
            .map_err(upstream_error)?;
        wrap_token(&self.secret_key, &client.client_id, &code.scopes, &upstream)
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
        let upstream = self
            .oauth
            .exchange_refresh_token(&refresh_token.token, scopes)
            .await
            .map_err(upstream_error)?;
        match upstream {
            Some(token) => Ok(Some(wrap_token(
                &self.secret_key,
                &client.client_id,
                scopes,
                &token,
            )?)),
            None => Ok(None),
        }
    }

    async fn load_access_token(&self, access_token: &str) -> Result<Option<AccessToken>> {
        Ok(access_token_from_jwt(&self.secret_key, access_token))
    }

    async fn revoke_token(&self, _token: &str) -> Result<()> {
        // Upstream revocation is not implemented.
        Ok(())
    }
}
