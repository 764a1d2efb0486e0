//! Install and activate.
//!
//! Install pre-warms the static generation from the precache manifest, all
//! or nothing. Activate deletes every generation that is not current and
//! claims open clients for this version.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use casa_sw_core::{AppConfig, CacheDb, Error, RequestDescriptor, StoredResponse};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use crate::clients::ClientRegistry;
use crate::fetch::{Network, resolve};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Not yet installed.
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never activate.
    Redundant,
}

/// Names identifying the current version's generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Generations {
    pub version: String,
    pub static_cache: String,
    pub dynamic_cache: String,
}

impl Generations {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            version: config.version.clone(),
            static_cache: config.static_cache.clone(),
            dynamic_cache: config.dynamic_cache.clone(),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct InstallReport {
    pub generation: String,
    pub cached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum ActivateOutcome {
    Activated { purged: Vec<String>, claimed: usize },
    /// Skip-waiting is off and other versions still control open clients.
    Waiting { blocking_clients: usize },
}

pub struct LifecycleManager {
    db: CacheDb,
    network: Arc<dyn Network>,
    generations: Generations,
    manifest: Vec<String>,
    skip_waiting: AtomicBool,
    state: Mutex<LifecycleState>,
    /// Set once activation completes; a later install attempt never clears it.
    active: AtomicBool,
}

impl LifecycleManager {
    /// `manifest` holds absolute URLs.
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, generations: Generations, manifest: Vec<String>, skip_waiting: bool,
    ) -> Self {
        Self {
            db,
            network,
            generations,
            manifest,
            skip_waiting: AtomicBool::new(skip_waiting),
            state: Mutex::new(LifecycleState::Parsed),
            active: AtomicBool::new(false),
        }
    }

    /// Build from config, resolving manifest entries against `origin`.
    pub fn from_config(
        db: CacheDb, network: Arc<dyn Network>, config: &AppConfig, origin: &Url,
    ) -> Result<Self, Error> {
        let manifest = config
            .precache_manifest
            .iter()
            .map(|entry| {
                resolve(origin, entry)
                    .map(String::from)
                    .map_err(|e| Error::InvalidUrl(format!("manifest entry {entry:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(db, network, Generations::from_config(config), manifest, config.skip_waiting))
    }

    pub fn generations(&self) -> &Generations {
        &self.generations
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Fetch every manifest URL and store them all in the static generation.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` when any fetch fails or answers non-2xx. Nothing
    /// is written. A first install becomes `Redundant`; an active worker stays
    /// `Activated` and keeps controlling its clients.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, LifecycleState::Installing | LifecycleState::Activating) {
                return Err(Error::InvalidState(format!("cannot install while {:?}", *state)));
            }
            *state = LifecycleState::Installing;
        }
        let was_active = self.is_active();
        tracing::info!(version = %self.generations.version, assets = self.manifest.len(), was_active, "installing");

        match self.precache().await {
            Ok(cached) => {
                *self.state.lock().await =
                    if was_active { LifecycleState::Activated } else { LifecycleState::Installed };
                tracing::info!(generation = %self.generations.static_cache, cached, "installed");
                Ok(InstallReport { generation: self.generations.static_cache.clone(), cached })
            }
            Err(e) => {
                *self.state.lock().await =
                    if was_active { LifecycleState::Activated } else { LifecycleState::Redundant };
                tracing::warn!(version = %self.generations.version, error = %e, "install failed");
                Err(e)
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn precache(&self) -> Result<usize, Error> {
        let mut fetches = JoinSet::new();
        for (index, url) in self.manifest.iter().enumerate() {
            let network = self.network.clone();
            let request = RequestDescriptor::get(url.as_str());
            fetches.spawn(async move {
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut entries: Vec<Option<(RequestDescriptor, StoredResponse)>> = vec![None; self.manifest.len()];
        while let Some(joined) = fetches.join_next().await {
            let (index, request, result) = joined
                .map_err(|e| Error::InstallFailed { url: "<task>".into(), reason: e.to_string() })?;
            let response =
                result.map_err(|e| Error::InstallFailed { url: request.url.clone(), reason: e.to_string() })?;
            if !response.is_success() {
                return Err(Error::InstallFailed {
                    url: request.url.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            entries[index] = Some((request, response));
        }

        let entries: Vec<_> = entries.into_iter().flatten().collect();
        self.db
            .put_all(&self.generations.static_cache, &entries)
            .await
            .map_err(|e| Error::InstallFailed { url: self.generations.static_cache.clone(), reason: e.to_string() })
    }

    /// Purge superseded generations and claim clients.
    ///
    /// Returns `Waiting` without touching anything when skip-waiting is off
    /// and another version still controls an open client.
    pub async fn activate(&self, clients: &mut ClientRegistry) -> Result<ActivateOutcome, Error> {
        let previous = {
            let mut state = self.state.lock().await;
            if !matches!(*state, LifecycleState::Installed | LifecycleState::Activated) {
                return Err(Error::InvalidState(format!("cannot activate while {:?}", *state)));
            }

            let blocking_clients = clients.controlled_by_other(&self.generations.version);
            if !self.skips_waiting() && blocking_clients > 0 {
                tracing::info!(version = %self.generations.version, blocking_clients, "waiting");
                return Ok(ActivateOutcome::Waiting { blocking_clients });
            }
            let previous = *state;
            *state = LifecycleState::Activating;
            previous
        };

        let current = self.generations.clone();
        let purged = match self.db.purge(move |name| !current.is_current(name)).await {
            Ok(purged) => purged,
            Err(e) => {
                *self.state.lock().await = previous;
                return Err(e);
            }
        };
        for name in &purged {
            tracing::info!(generation = %name, "deleted superseded cache");
        }

        let claimed = clients.claim(&self.generations.version);
        self.active.store(true, Ordering::SeqCst);
        *self.state.lock().await = LifecycleState::Activated;
        tracing::info!(version = %self.generations.version, claimed, "activated");

        Ok(ActivateOutcome::Activated { purged, claimed })
    }

    /// Version controlling new clients, once activated.
    pub async fn controller(&self) -> Option<String> {
        self.is_active().then(|| self.generations.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedNetwork, ok, status};

    fn generations(version: &str) -> Generations {
        Generations {
            version: format!("casa-{version}"),
            static_cache: format!("casa-static-{version}"),
            dynamic_cache: format!("casa-dynamic-{version}"),
        }
    }

    fn manifest() -> Vec<String> {
        ["https://casa.test/", "https://casa.test/css/styles.css", "https://casa.test/offline.html"]
            .map(String::from)
            .to_vec()
    }

    fn online() -> ScriptedNetwork {
        ScriptedNetwork::offline()
            .on_get("https://casa.test/", ok("text/html", "home"))
            .on_get("https://casa.test/css/styles.css", ok("text/css", "body{}"))
            .on_get("https://casa.test/offline.html", ok("text/html", "offline"))
    }

    fn manager(db: &CacheDb, network: ScriptedNetwork, version: &str, skip_waiting: bool) -> LifecycleManager {
        LifecycleManager::new(db.clone(), Arc::new(network), generations(version), manifest(), skip_waiting)
    }

    #[tokio::test]
    async fn test_cold_install_caches_manifest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let lifecycle = manager(&db, online(), "v1", true);
        assert_eq!(lifecycle.state().await, LifecycleState::Parsed);

        let report = lifecycle.install().await.unwrap();

        assert_eq!(report, InstallReport { generation: "casa-static-v1".into(), cached: 3 });
        assert_eq!(lifecycle.state().await, LifecycleState::Installed);
        let handle = db.open_generation("casa-static-v1").await.unwrap();
        assert_eq!(handle.keys().await.unwrap(), manifest());
        let offline = db.match_request(&RequestDescriptor::get("https://casa.test/offline.html")).await.unwrap();
        assert_eq!(offline.unwrap().text(), "offline");
    }

    #[tokio::test]
    async fn test_install_is_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("casa-static-v0", &RequestDescriptor::get("https://casa.test/"), &ok("text/html", "old"))
            .await
            .unwrap();
        let network = online().on_get("https://casa.test/css/styles.css", status(404));
        let lifecycle = manager(&db, network, "v1", true);

        let err = lifecycle.install().await.unwrap_err();

        assert!(matches!(err, Error::InstallFailed { ref url, .. } if url == "https://casa.test/css/styles.css"));
        assert_eq!(lifecycle.state().await, LifecycleState::Redundant);
        assert_eq!(db.generation_names().await.unwrap(), vec!["casa-static-v0".to_string()]);
        assert_eq!(db.entry_count("casa-static-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reinstall_keeps_control() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = ScriptedNetwork::offline()
            .on_get("https://casa.test/", ok("text/html", "home"))
            .on_get("https://casa.test/offline.html", ok("text/html", "offline"))
            .then("GET", "https://casa.test/css/styles.css", Reply::Respond(ok("text/css", "body{}")))
            .then("GET", "https://casa.test/css/styles.css", Reply::Respond(ok("text/css", "body{color:red}")));
        let lifecycle = manager(&db, network, "v1", true);
        lifecycle.install().await.unwrap();
        lifecycle.activate(&mut ClientRegistry::new()).await.unwrap();

        lifecycle.install().await.unwrap();
        assert_eq!(lifecycle.state().await, LifecycleState::Activated);
        assert_eq!(lifecycle.controller().await.as_deref(), Some("casa-v1"));

        assert!(matches!(lifecycle.install().await, Err(Error::InstallFailed { .. })));
        assert_eq!(lifecycle.state().await, LifecycleState::Activated);
        assert_eq!(lifecycle.controller().await.as_deref(), Some("casa-v1"));
        let css = db.match_request(&RequestDescriptor::get("https://casa.test/css/styles.css")).await.unwrap();
        assert_eq!(css.unwrap().text(), "body{color:red}");
    }

    #[tokio::test]
    async fn test_install_fails_on_transport_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = ScriptedNetwork::offline().on_get("https://casa.test/", ok("text/html", "home"));
        let lifecycle = manager(&db, network, "v1", true);

        assert!(matches!(lifecycle.install().await, Err(Error::InstallFailed { .. })));
        assert!(db.generation_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let lifecycle = manager(&db, online(), "v1", true);

        let err = lifecycle.activate(&mut ClientRegistry::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_version_bump_purges_old_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut clients = ClientRegistry::new();

        let v1 = manager(&db, online(), "v1", true);
        v1.install().await.unwrap();
        v1.activate(&mut clients).await.unwrap();
        db.put("casa-dynamic-v1", &RequestDescriptor::get("https://casa.test/about"), &ok("text/html", "about"))
            .await
            .unwrap();
        clients.connect("tab-1", "https://casa.test/", v1.controller().await);

        let v2 = manager(&db, online(), "v2", true);
        v2.install().await.unwrap();
        let outcome = v2.activate(&mut clients).await.unwrap();

        assert_eq!(
            outcome,
            ActivateOutcome::Activated {
                purged: vec!["casa-static-v1".into(), "casa-dynamic-v1".into()],
                claimed: 1
            }
        );
        assert_eq!(db.generation_names().await.unwrap(), vec!["casa-static-v2".to_string()]);
        assert_eq!(clients.get("tab-1").unwrap().controller.as_deref(), Some("casa-v2"));
        assert_eq!(v2.state().await, LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_waits_for_other_controllers_without_skip_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("casa-static-v1").await.unwrap();
        let mut clients = ClientRegistry::new();
        clients.connect("tab-1", "https://casa.test/", Some("casa-v1".into()));

        let v2 = manager(&db, online(), "v2", false);
        v2.install().await.unwrap();

        let outcome = v2.activate(&mut clients).await.unwrap();
        assert_eq!(outcome, ActivateOutcome::Waiting { blocking_clients: 1 });
        assert_eq!(v2.state().await, LifecycleState::Installed);
        assert!(db.generation_names().await.unwrap().contains(&"casa-static-v1".to_string()));

        v2.skip_waiting();
        let outcome = v2.activate(&mut clients).await.unwrap();
        assert!(matches!(outcome, ActivateOutcome::Activated { claimed: 1, .. }));
    }

    #[tokio::test]
    async fn test_no_wait_when_last_client_closed() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut clients = ClientRegistry::new();
        clients.connect("tab-1", "https://casa.test/", Some("casa-v1".into()));
        clients.disconnect("tab-1");

        let v2 = manager(&db, online(), "v2", false);
        v2.install().await.unwrap();

        assert!(matches!(v2.activate(&mut clients).await.unwrap(), ActivateOutcome::Activated { claimed: 0, .. }));
    }

    #[tokio::test]
    async fn test_manifest_resolves_against_origin() {
        let origin = Url::parse("https://casa.test").unwrap();
        let config = AppConfig { precache_manifest: vec!["/".into(), "/offline.html".into()], ..Default::default() };
        let db = CacheDb::open_in_memory().await.unwrap();

        let network = Arc::new(ScriptedNetwork::offline());
        let lifecycle = LifecycleManager::from_config(db, network, &config, &origin).unwrap();

        assert_eq!(lifecycle.manifest(), ["https://casa.test/", "https://casa.test/offline.html"]);
        assert_eq!(lifecycle.generations().static_cache, config.static_cache);
    }
}
