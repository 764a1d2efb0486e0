//! Fetch strategies.
//!
//! Each strategy turns a request into a response using the network, the
//! cache, or both. [`StrategyRunner::respond`] never fails: any strategy error
//! ends in [`StrategyRunner::error_fallback`], which always has an answer.
//!
//! Successful network responses are written through to the dynamic
//! generation. Write-through failures are logged and never surface to the
//! caller.

use std::sync::{Arc, Mutex};

use casa_sw_core::{AppConfig, CacheDb, Error, RequestDescriptor, StoredResponse};
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::fetch::{Network, resolve};
use crate::router::Strategy;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// A cached offline page or fallback image.
    Fallback,
    /// The built-in 408 response.
    Synthetic,
}

/// A response plus how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    /// `None` when the request bypassed interception.
    pub strategy: Option<Strategy>,
    pub source: ResponseSource,
    pub response: StoredResponse,
}

impl FetchOutcome {
    fn new(strategy: Strategy, source: ResponseSource, response: StoredResponse) -> Self {
        Self { strategy: Some(strategy), source, response }
    }
}

/// Absolute URLs of the cached resources served when everything else fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallbacks {
    pub offline_page: String,
    pub fallback_image: String,
}

impl Fallbacks {
    pub fn from_config(config: &AppConfig, origin: &Url) -> Result<Self, Error> {
        let offline_page = resolve(origin, &config.offline_page).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let fallback_image = resolve(origin, &config.fallback_image).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { offline_page: offline_page.to_string(), fallback_image: fallback_image.to_string() })
    }
}

/// Background fetches still running, keyed by request URL.
type Refreshes = Arc<Mutex<Vec<(String, JoinHandle<()>)>>>;

/// Runs strategies against one cache store and one network.
#[derive(Clone)]
pub struct StrategyRunner {
    db: CacheDb,
    network: Arc<dyn Network>,
    dynamic_cache: String,
    fallbacks: Fallbacks,
    refreshes: Refreshes,
}

impl StrategyRunner {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, dynamic_cache: impl Into<String>, fallbacks: Fallbacks) -> Self {
        Self { db, network, dynamic_cache: dynamic_cache.into(), fallbacks, refreshes: Arc::default() }
    }

    /// Run `strategy`, degrading to error-fallback on failure.
    pub async fn respond(&self, strategy: Strategy, request: &RequestDescriptor) -> FetchOutcome {
        let result = match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Strategy::ErrorFallback => return self.error_fallback(request).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::info!(
                    url = %request.url,
                    strategy = ?strategy,
                    transport = e.is_transport(),
                    error = %e,
                    "falling back"
                );
                self.error_fallback(request).await
            }
        }
    }

    /// Forward a request untouched. Transport failures become the synthetic 408.
    pub async fn passthrough(&self, request: &RequestDescriptor) -> FetchOutcome {
        match self.network.fetch(request).await {
            Ok(response) => FetchOutcome { strategy: None, source: ResponseSource::Network, response },
            Err(e) => {
                tracing::warn!(method = %request.method, url = %request.url, error = %e, "bypassed request failed");
                FetchOutcome {
                    strategy: None,
                    source: ResponseSource::Synthetic,
                    response: StoredResponse::network_error(),
                }
            }
        }
    }

    /// Serve from cache; on a miss fetch and write through.
    ///
    /// Non-2xx network responses are returned but never cached.
    pub async fn cache_first(&self, request: &RequestDescriptor) -> Result<FetchOutcome, Error> {
        if let Some(cached) = self.cached(request).await {
            return Ok(FetchOutcome::new(Strategy::CacheFirst, ResponseSource::Cache, cached));
        }

        let response = self.network.fetch(request).await?;
        if response.is_success() {
            self.write_through(request, &response).await;
        }
        Ok(FetchOutcome::new(Strategy::CacheFirst, ResponseSource::Network, response))
    }

    /// Prefer the network; use the cache when it fails or answers non-2xx.
    ///
    /// With nothing cached a non-2xx answer counts as a failure too, so
    /// [`respond`](Self::respond) ends in error-fallback.
    pub async fn network_first(&self, request: &RequestDescriptor) -> Result<FetchOutcome, Error> {
        match self.network.fetch(request).await {
            Ok(response) if response.is_success() => {
                self.write_through(request, &response).await;
                Ok(FetchOutcome::new(Strategy::NetworkFirst, ResponseSource::Network, response))
            }
            Ok(response) => match self.cached(request).await {
                Some(cached) => Ok(FetchOutcome::new(Strategy::NetworkFirst, ResponseSource::Cache, cached)),
                None => Err(Error::HttpStatus(response.status)),
            },
            Err(e) => match self.cached(request).await {
                Some(cached) => {
                    tracing::debug!(url = %request.url, error = %e, "network failed, serving cached copy");
                    Ok(FetchOutcome::new(Strategy::NetworkFirst, ResponseSource::Cache, cached))
                }
                None => Err(e),
            },
        }
    }

    /// Serve the cached copy at once and refresh it in the background.
    ///
    /// With nothing cached the caller waits for the fetch. Either way the
    /// fetch runs on a detached task, so its cache write completes even if the
    /// caller goes away.
    pub async fn stale_while_revalidate(&self, request: &RequestDescriptor) -> Result<FetchOutcome, Error> {
        if let Some(cached) = self.cached(request).await {
            self.spawn_refresh(request.clone(), None);
            return Ok(FetchOutcome::new(Strategy::StaleWhileRevalidate, ResponseSource::Cache, cached));
        }

        let (tx, rx) = oneshot::channel();
        self.spawn_refresh(request.clone(), Some(tx));
        let response = rx
            .await
            .map_err(|_| Error::Network(format!("refresh task for {} ended without a result", request.url)))??;
        Ok(FetchOutcome::new(Strategy::StaleWhileRevalidate, ResponseSource::Network, response))
    }

    /// The terminal handler: offline page, fallback image, or a 408.
    pub async fn error_fallback(&self, request: &RequestDescriptor) -> FetchOutcome {
        let fallback = if request.accepts_html() {
            Some(&self.fallbacks.offline_page)
        } else if request.is_image() {
            Some(&self.fallbacks.fallback_image)
        } else {
            None
        };

        if let Some(url) = fallback
            && let Some(cached) = self.cached(&RequestDescriptor::get(url.as_str())).await
        {
            return FetchOutcome::new(Strategy::ErrorFallback, ResponseSource::Fallback, cached);
        }

        FetchOutcome::new(Strategy::ErrorFallback, ResponseSource::Synthetic, StoredResponse::network_error())
    }

    /// Wait for every background fetch started so far.
    pub async fn settle(&self) {
        let pending = match self.refreshes.lock() {
            Ok(mut refreshes) => std::mem::take(&mut *refreshes),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for (url, handle) in pending {
            if let Err(e) = handle.await {
                tracing::warn!(%url, error = %e, "background refresh task panicked");
            }
        }
    }

    /// Cache lookup where a storage error counts as a miss.
    async fn cached(&self, request: &RequestDescriptor) -> Option<StoredResponse> {
        match self.db.match_request(request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    async fn write_through(&self, request: &RequestDescriptor, response: &StoredResponse) {
        store(&self.db, &self.dynamic_cache, request, response).await;
    }

    /// Start a detached fetch-and-store for `request`.
    ///
    /// Without a `reply` channel the fetch is a pure background refresh and is
    /// coalesced with any refresh already running for the same URL.
    fn spawn_refresh(&self, request: RequestDescriptor, reply: Option<oneshot::Sender<Result<StoredResponse, Error>>>) {
        let Ok(mut refreshes) = self.refreshes.lock() else {
            tracing::error!("refresh registry poisoned");
            return;
        };
        refreshes.retain(|(_, handle)| !handle.is_finished());

        if reply.is_none() && refreshes.iter().any(|(url, _)| *url == request.url) {
            tracing::debug!(url = %request.url, "refresh already in flight");
            return;
        }

        let db = self.db.clone();
        let network = self.network.clone();
        let generation = self.dynamic_cache.clone();
        let url = request.url.clone();

        let handle = tokio::spawn(async move {
            let result = network.fetch(&request).await;
            match &result {
                Ok(response) if response.is_success() => store(&db, &generation, &request, response).await,
                Ok(response) => tracing::debug!(url = %request.url, status = response.status, "refresh not cached"),
                Err(e) => tracing::warn!(url = %request.url, error = %e, "background refresh failed"),
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
        refreshes.push((url, handle));
    }
}

async fn store(db: &CacheDb, generation: &str, request: &RequestDescriptor, response: &StoredResponse) {
    if let Err(e) = db.put(generation, request, response).await {
        tracing::warn!(url = %request.url, %generation, error = %e, "write-through failed");
    }
}
