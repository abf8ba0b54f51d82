use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// The kinds of content whose writes invalidate public pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Dish,
    Category,
    Bundle,
    Settings,
}

/// The fields of a written entity that decide which pages go stale.
///
/// Everything else in the stored record is irrelevant here and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub slug: Option<String>,
    /// Public menu section the entity belongs to, e.g. "food" or "drinks".
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
}

/// A committed admin write whose public pages need refreshing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidationRequest {
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity: EntityRef,
}

const SETTINGS_PATHS: &[&str] = &["/api/settings", "/", "/menu", "/about", "/contact"];

/// Keeps a value only if it is usable as a single path segment.
fn segment(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.contains(['/', '?', '#', '%']) && *v != "." && *v != "..")
}

/// Computes the public paths made stale by a write, list endpoint first.
pub fn paths_for(entity_type: EntityType, entity: &EntityRef) -> Vec<String> {
    let slug = segment(entity.slug.as_deref());
    let kind = segment(entity.kind.as_deref());

    let mut paths: Vec<String> = match entity_type {
        EntityType::Dish => {
            let mut paths = vec!["/api/dishes".to_string()];
            paths.extend(slug.map(|s| format!("/api/dishes/{}", s)));
            paths.extend(kind.map(|k| format!("/{}", k)));
            paths
        }
        EntityType::Category => {
            let mut paths = vec!["/api/categories".to_string(), "/api/dishes".to_string()];
            paths.extend(kind.map(|k| format!("/{}", k)));
            paths
        }
        EntityType::Bundle => {
            let mut paths = vec!["/api/bundles".to_string()];
            paths.extend(slug.map(|s| format!("/api/bundles/{}", s)));
            paths.push("/menus".to_string());
            paths
        }
        EntityType::Settings => SETTINGS_PATHS.iter().map(|p| p.to_string()).collect(),
    };

    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));
    paths
}

/// Why a single path could not be invalidated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidationError {
    #[error("cache endpoint request failed: {0}")]
    Transport(String),
    #[error("cache endpoint answered {0}")]
    Rejected(u16),
}

/// The cache in front of the public site.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, path: &str) -> impl Future<Output = Result<(), InvalidationError>> + Send;
}

/// Outcome of invalidating one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathOutcome {
    pub path: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort invalidation of public pages after admin writes.
#[derive(Clone)]
pub struct RevalidationDispatcher<I> {
    invalidator: I,
}

impl<I: CacheInvalidator> RevalidationDispatcher<I> {
    pub fn new(invalidator: I) -> Self {
        Self { invalidator }
    }

    /// Invalidates each path independently.
    ///
    /// A failing path is logged and reported; it never stops the remaining
    /// paths and never turns into an error for the caller.
    pub async fn invalidate(&self, paths: &[String]) -> Vec<PathOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());

        for path in paths {
            match self.invalidator.invalidate(path).await {
                Ok(()) => {
                    tracing::debug!("♻️ Revalidated {}", path);
                    outcomes.push(PathOutcome {
                        path: path.clone(),
                        ok: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("⚠️ Revalidation failed for {}: {}", path, e);
                    outcomes.push(PathOutcome {
                        path: path.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcomes
    }

    /// Derives the stale paths for a committed write and invalidates them.
    pub async fn revalidate(&self, request: &RevalidationRequest) -> Vec<PathOutcome> {
        let paths = paths_for(request.entity_type, &request.entity);
        tracing::info!(
            "♻️ Revalidating {} paths after {:?} write",
            paths.len(),
            request.entity_type
        );
        self.invalidate(&paths).await
    }
}

/// Purges pages by POSTing `{"path": ...}` to a revalidation webhook.
///
/// Without a configured endpoint there is no cache to purge and every path
/// succeeds immediately.
#[derive(Clone)]
pub struct WebhookInvalidator {
    client: reqwest::Client,
    endpoint: Option<String>,
    secret: Option<Zeroizing<String>>,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    path: &'a str,
}

impl WebhookInvalidator {
    pub fn new(endpoint: Option<String>, secret: Option<Zeroizing<String>>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            secret,
        })
    }
}

impl CacheInvalidator for WebhookInvalidator {
    async fn invalidate(&self, path: &str) -> Result<(), InvalidationError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::debug!("No revalidation endpoint configured, skipping {}", path);
            return Ok(());
        };

        let mut request = self.client.post(endpoint).json(&WebhookBody { path });
        if let Some(secret) = &self.secret {
            request = request.header("x-revalidate-secret", secret.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| InvalidationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InvalidationError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}
