//! Background sync: replay of queued form submissions and periodic refresh
//! of property data.
//!
//! Delivery is at-least-once. A task is removed only after its endpoint
//! answers 2xx; every other outcome leaves it queued with the failure
//! recorded, and the next task is still attempted.

use std::sync::Arc;

use casa_sw_core::{AppConfig, CacheDb, Error, RequestDescriptor, StoredResponse, SyncKind, SyncTask};
use schemars::JsonSchema;
use serde::Serialize;
use url::Url;

use crate::fetch::{Network, resolve};

/// Periodic sync tag that refreshes cached property listings.
pub const PROPERTY_UPDATES_TAG: &str = "property-updates";

/// Absolute URLs used by sync replay and the periodic refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndpoints {
    pub contact_form: String,
    pub investment_inquiry: String,
    pub property_updates: String,
    pub property_listing: String,
}

impl SyncEndpoints {
    pub fn from_config(config: &AppConfig, origin: &Url) -> Result<Self, Error> {
        let absolute = |path: &str| {
            resolve(origin, path)
                .map(String::from)
                .map_err(|e| Error::InvalidUrl(format!("{path:?}: {e}")))
        };
        Ok(Self {
            contact_form: absolute(&config.contact_form_endpoint)?,
            investment_inquiry: absolute(&config.investment_inquiry_endpoint)?,
            property_updates: absolute(&config.property_updates_url)?,
            property_listing: absolute(&config.property_listing_url)?,
        })
    }

    pub fn for_kind(&self, kind: SyncKind) -> &str {
        match kind {
            SyncKind::ContactForm => &self.contact_form,
            SyncKind::InvestmentInquiry => &self.investment_inquiry,
        }
    }
}

/// Result of replaying one kind's queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct SyncReport {
    /// Ids of tasks delivered and removed.
    pub replayed: Vec<i64>,
    /// Ids of tasks that failed and stay queued.
    pub failed: Vec<i64>,
}

/// What a sync or periodic-sync event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum SyncOutcome {
    Replayed { kind: SyncKind, report: SyncReport },
    PropertiesRefreshed { updated: bool },
    /// Unknown tag.
    Ignored { tag: String },
}

pub struct SyncQueue {
    db: CacheDb,
    network: Arc<dyn Network>,
    endpoints: SyncEndpoints,
    dynamic_cache: String,
}

impl SyncQueue {
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, endpoints: SyncEndpoints, dynamic_cache: impl Into<String>,
    ) -> Self {
        Self { db, network, endpoints, dynamic_cache: dynamic_cache.into() }
    }

    pub async fn enqueue(&self, kind: SyncKind, payload: &serde_json::Value) -> Result<SyncTask, Error> {
        let task = self.db.enqueue_sync_task(kind, payload).await?;
        tracing::debug!(id = task.id, %kind, "queued for background sync");
        Ok(task)
    }

    pub async fn pending(&self, kind: SyncKind) -> Result<Vec<SyncTask>, Error> {
        self.db.pending_sync_tasks(kind).await
    }

    /// Dispatch a one-off sync tag.
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, Error> {
        match tag.parse::<SyncKind>() {
            Ok(kind) => Ok(SyncOutcome::Replayed { kind, report: self.replay(kind).await? }),
            Err(_) => {
                tracing::debug!(%tag, "ignoring unknown sync tag");
                Ok(SyncOutcome::Ignored { tag: tag.to_string() })
            }
        }
    }

    /// Dispatch a periodic sync tag.
    pub async fn handle_periodic(&self, tag: &str) -> SyncOutcome {
        if tag == PROPERTY_UPDATES_TAG {
            SyncOutcome::PropertiesRefreshed { updated: self.refresh_properties().await }
        } else {
            tracing::debug!(%tag, "ignoring unknown periodic sync tag");
            SyncOutcome::Ignored { tag: tag.to_string() }
        }
    }

    /// Replay every pending task of `kind`, oldest first.
    ///
    /// Storage errors abort the run; delivery failures never do.
    pub async fn replay(&self, kind: SyncKind) -> Result<SyncReport, Error> {
        let endpoint = self.endpoints.for_kind(kind);
        let mut report = SyncReport::default();

        for task in self.db.pending_sync_tasks(kind).await? {
            let request = RequestDescriptor::post_json(endpoint, &task.payload);
            let failure = match self.network.fetch(&request).await {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(format!("status {}", response.status)),
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => {
                    self.db.remove_sync_task(task.id).await?;
                    tracing::info!(id = task.id, %kind, "synced");
                    report.replayed.push(task.id);
                }
                Some(reason) => {
                    tracing::warn!(id = task.id, %kind, attempts = task.attempts + 1, %reason, "sync replay failed");
                    self.db.record_sync_failure(task.id, &reason).await?;
                    report.failed.push(task.id);
                }
            }
        }

        Ok(report)
    }

    /// Pull the latest property data into the dynamic cache.
    ///
    /// Returns whether the cached listing was replaced. Failures are logged only.
    pub async fn refresh_properties(&self) -> bool {
        let updates = RequestDescriptor::get(self.endpoints.property_updates.as_str());
        let response = match self.network.fetch(&updates).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(status = response.status, "property update refresh rejected");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "property update refresh failed");
                return false;
            }
        };

        let data: serde_json::Value = match serde_json::from_slice(&response.body) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "property update was not JSON");
                return false;
            }
        };

        let listing = StoredResponse::with_content_type(200, "application/json", data.to_string());
        let request = RequestDescriptor::get(self.endpoints.property_listing.as_str());
        match self.db.put(&self.dynamic_cache, &request, &listing).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to cache property update");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedNetwork, ok, status};
    use serde_json::json;

    const CONTACT: &str = "https://casa.test/api/contact";

    fn endpoints() -> SyncEndpoints {
        let origin = Url::parse("https://casa.test").unwrap();
        SyncEndpoints::from_config(&AppConfig::default(), &origin).unwrap()
    }

    async fn setup(network: ScriptedNetwork) -> (SyncQueue, CacheDb, Arc<ScriptedNetwork>) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(network);
        (SyncQueue::new(db.clone(), network.clone(), endpoints(), "casa-dynamic-test"), db, network)
    }

    #[test]
    fn test_endpoints_resolve() {
        let endpoints = endpoints();
        assert_eq!(endpoints.for_kind(SyncKind::ContactForm), CONTACT);
        assert_eq!(endpoints.for_kind(SyncKind::InvestmentInquiry), "https://casa.test/api/investment-inquiry");
        assert_eq!(endpoints.property_listing, "https://casa.test/api/properties");
    }

    #[tokio::test]
    async fn test_partial_replay_keeps_failed_task() {
        let network = ScriptedNetwork::offline()
            .then("POST", CONTACT, Reply::Respond(ok("application/json", "{}")))
            .then("POST", CONTACT, Reply::Respond(status(500)));
        let (queue, _, network) = setup(network).await;
        let first = queue.enqueue(SyncKind::ContactForm, &json!({"name": "Amina"})).await.unwrap();
        let second = queue.enqueue(SyncKind::ContactForm, &json!({"name": "Youssef"})).await.unwrap();

        let outcome = queue.handle_sync("contact-form").await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replayed {
                kind: SyncKind::ContactForm,
                report: SyncReport { replayed: vec![first.id], failed: vec![second.id] }
            }
        );
        let remaining = queue.pending(SyncKind::ContactForm).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert_eq!(remaining[0].payload, json!({"name": "Youssef"}));
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(remaining[0].last_error.as_deref(), Some("status 500"));

        let sent = network.requests();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|r| r.method == "POST"
            && r.headers.iter().any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v == "application/json")));
        assert_eq!(sent[0].body.as_deref(), Some(br#"{"name":"Amina"}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_tasks() {
        let network = ScriptedNetwork::offline()
            .then("POST", CONTACT, Reply::Fail)
            .then("POST", CONTACT, Reply::Respond(ok("application/json", "{}")));
        let (queue, _, _) = setup(network).await;
        let first = queue.enqueue(SyncKind::ContactForm, &json!({"n": 1})).await.unwrap();
        let second = queue.enqueue(SyncKind::ContactForm, &json!({"n": 2})).await.unwrap();

        let report = queue.replay(SyncKind::ContactForm).await.unwrap();

        assert_eq!(report.failed, vec![first.id]);
        assert_eq!(report.replayed, vec![second.id]);
    }

    #[tokio::test]
    async fn test_replay_only_touches_its_kind() {
        let (queue, _, network) = setup(ScriptedNetwork::offline()).await;
        queue.enqueue(SyncKind::InvestmentInquiry, &json!({"budget": 2_000_000})).await.unwrap();

        let report = queue.replay(SyncKind::ContactForm).await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(network.calls(), 0);
        assert_eq!(queue.pending(SyncKind::InvestmentInquiry).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_noop() {
        let (queue, _, network) = setup(ScriptedNetwork::offline()).await;

        let outcome = queue.handle_sync("newsletter").await.unwrap();

        assert_eq!(outcome, SyncOutcome::Ignored { tag: "newsletter".into() });
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_property_updates_cached_under_listing_url() {
        let network = ScriptedNetwork::offline()
            .on_get("https://casa.test/api/properties/updates", ok("application/json", r#"[{"id": 7}]"#));
        let (queue, db, _) = setup(network).await;

        let outcome = queue.handle_periodic(PROPERTY_UPDATES_TAG).await;

        assert_eq!(outcome, SyncOutcome::PropertiesRefreshed { updated: true });
        let cached = db
            .match_request(&RequestDescriptor::get("https://casa.test/api/properties"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.content_type(), Some("application/json"));
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&cached.body).unwrap(), json!([{"id": 7}]));
    }

    #[tokio::test]
    async fn test_property_updates_failure_is_swallowed() {
        let network =
            ScriptedNetwork::offline().on_get("https://casa.test/api/properties/updates", ok("text/html", "<oops>"));
        let (queue, db, _) = setup(network).await;

        let outcome = queue.handle_periodic(PROPERTY_UPDATES_TAG).await;
        assert_eq!(outcome, SyncOutcome::PropertiesRefreshed { updated: false });
        assert!(db.generation_names().await.unwrap().is_empty());

        let (offline, _, _) = setup(ScriptedNetwork::offline()).await;
        assert!(!offline.refresh_properties().await);
    }
}
