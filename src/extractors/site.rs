//! Extract the routed site from request extensions.

use crate::site::SiteContext;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Falls back to the default site when the request did not pass through host routing.
#[async_trait]
impl<S> FromRequestParts<S> for SiteContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SiteContext>()
            .cloned()
            .unwrap_or_else(SiteContext::default_site))
    }
}
