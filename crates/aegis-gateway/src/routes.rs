//! Path-prefix route table.

use crate::config::RouteSettings;
use aegis_core::RouteConfig;
use std::sync::Arc;

/// A configured route and where it forwards to.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub config: RouteConfig,
    pub path_prefix: String,
    pub upstream: String,
}

impl ProxyRoute {
    pub fn new(config: RouteConfig, path_prefix: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            config,
            path_prefix: path_prefix.into(),
            upstream: upstream.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Prefix match on a path-segment boundary: `/api` matches `/api` and
    /// `/api/chat`, not `/apix`.
    fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.as_str();
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }
}

impl From<&RouteSettings> for ProxyRoute {
    fn from(settings: &RouteSettings) -> Self {
        ProxyRoute::new(
            RouteConfig::from_metadata(settings.id.clone(), settings.metadata.clone()),
            settings.path_prefix.clone(),
            settings.upstream.clone(),
        )
    }
}

/// Route matched for the current request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct MatchedRoute(pub Arc<ProxyRoute>);

/// Routes ordered longest prefix first.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<ProxyRoute>>,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = ProxyRoute>) -> Self {
        let mut routes: Vec<_> = routes.into_iter().map(Arc::new).collect();
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { routes }
    }

    pub fn from_settings(settings: &[RouteSettings]) -> Self {
        Self::new(settings.iter().map(ProxyRoute::from))
    }

    /// Longest configured prefix matching `path`.
    pub fn match_path(&self, path: &str) -> Option<Arc<ProxyRoute>> {
        self.routes.iter().find(|r| r.matches(path)).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProxyRoute>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
