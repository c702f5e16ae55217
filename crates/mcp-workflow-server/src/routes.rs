//! OAuth redirect callback.
//!
//! The upstream provider sends the end user back here with `state` and
//! `code`. The cached authorization params are re-cached under the code (so
//! the token endpoint can load them) and the user is 302-redirected to the
//! client's original redirect URI, carrying the code and the client's own
//! state. Framework-free so it can be mounted behind any HTTP server.

use crate::auth::{cache_get_params, cache_set_params};
use crate::cache::AsyncCache;
use crate::error::{Result, ServerError};

#[derive(Debug, Clone)]
pub struct RedirectQuery {
    pub state: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectResponse {
    pub status: u16,
    pub location: String,
}

pub async fn redirect_route(
    query: &RedirectQuery,
    cache: &dyn AsyncCache,
) -> Result<RedirectResponse> {
    let Some(params) = cache_get_params(cache, &query.state).await? else {
        tracing::warn!(state = %query.state, "redirect with unknown state");
        return Err(ServerError::http(400));
    };

    cache_set_params(cache, &query.code, &params).await?;

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("code", &query.code);
    serializer.append_pair("state", &params.state);
    Ok(RedirectResponse {
        status: 302,
        location: format!("{}?{}", params.redirect_uri, serializer.finish()),
    })
}
