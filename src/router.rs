//! Host-based dispatch. Every site is served by the same API router; the resolved
//! `SiteContext` travels with the request as an extension.

use crate::config::SiteConfig;
use crate::site::SiteContext;
use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;

/// Host table with a guaranteed `default` entry. Immutable once built.
#[derive(Clone, Debug)]
pub struct TenantRouter {
    entries: Vec<(String, SiteContext)>,
    fallback: SiteContext,
}

/// Lowercase and drop any port; bracketed IPv6 literals keep their brackets.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim().to_ascii_lowercase();
    if raw.starts_with('[') {
        return match raw.find(']') {
            Some(end) => raw[..=end].to_string(),
            None => raw,
        };
    }
    raw.split(':').next().unwrap_or_default().to_string()
}

impl TenantRouter {
    pub fn new(sites: &[SiteConfig]) -> Self {
        let entries = sites
            .iter()
            .map(|s| {
                let host = normalize_host(&s.hostname);
                (host.clone(), SiteContext::new(s.name.clone(), Some(host)))
            })
            .collect();
        TenantRouter {
            entries,
            fallback: SiteContext::default_site(),
        }
    }

    /// First entry whose hostname matches, else the default site.
    pub fn resolve(&self, host: Option<&str>) -> &SiteContext {
        let Some(host) = host.map(normalize_host) else {
            return &self.fallback;
        };
        self.entries
            .iter()
            .find(|(h, _)| *h == host)
            .map(|(_, site)| site)
            .unwrap_or(&self.fallback)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteContext> {
        self.entries.iter().map(|(_, s)| s).chain(std::iter::once(&self.fallback))
    }

    /// Wrap `app` so each request carries the site its host resolves to.
    pub fn into_service(self, app: Router) -> Router {
        let names: Vec<String> = self.sites().map(|s| s.name.clone()).collect();
        tracing::info!(sites = ?names, "host routing enabled");
        app.layer(middleware::from_fn_with_state(Arc::new(self), dispatch))
    }
}

async fn dispatch(State(router): State<Arc<TenantRouter>>, mut req: Request, next: Next) -> Response {
    let host = req.headers().get(HOST).and_then(|v| v.to_str().ok());
    let site = router.resolve(host).clone();
    tracing::debug!(site = %site.name, "request routed");
    req.extensions_mut().insert(site);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TenantRouter {
        TenantRouter::new(&[
            SiteConfig {
                name: "shop".into(),
                hostname: "Shop.Example.com".into(),
            },
            SiteConfig {
                name: "admin".into(),
                hostname: "admin.example.com:8080".into(),
            },
        ])
    }

    #[test]
    fn hosts_are_normalized() {
        assert_eq!(normalize_host("Shop.Example.com:6336"), "shop.example.com");
        assert_eq!(normalize_host("[::1]:6336"), "[::1]");
        assert_eq!(normalize_host("localhost"), "localhost");
    }

    #[test]
    fn unknown_hosts_fall_back_to_default() {
        let r = router();
        assert_eq!(r.resolve(Some("shop.example.com:443")).name, "shop");
        assert_eq!(r.resolve(Some("admin.example.com")).name, "admin");
        assert_eq!(r.resolve(Some("elsewhere.org")).name, "default");
        assert_eq!(r.resolve(None).name, "default");
        assert_eq!(r.sites().count(), 3);
    }
}
