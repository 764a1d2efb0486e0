//! Event dispatch for one worker version.
//!
//! [`ServiceWorkerState`] is built once per process from config. Every
//! event a host delivers goes through [`ServiceWorkerState::handle`], which
//! returns the effect the host should apply.

use std::sync::Arc;

use casa_sw_core::{AppConfig, CacheDb, Error, RequestDescriptor, SyncKind, SyncTask};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::clients::{Client, ClientRegistry};
use crate::fetch::{FetchClient, FetchConfig, Network, resolve};
use crate::lifecycle::{ActivateOutcome, Generations, InstallReport, LifecycleManager, LifecycleState};
use crate::notify::{ClickOutcome, NotificationDispatcher, NotificationRequest};
use crate::router::{Route, RoutingTable};
use crate::strategies::{Fallbacks, FetchOutcome, StrategyRunner};
use crate::sync::{SyncEndpoints, SyncOutcome, SyncQueue};

/// Messages a page can post to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ClientMessage {
    SkipWaiting,
    GetVersion,
    /// Persist a failed submission for background sync.
    QueueSync { kind: SyncKind, payload: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(RequestDescriptor),
    Sync { tag: String },
    PeriodicSync { tag: String },
    Push { payload: Option<Vec<u8>> },
    NotificationClick { action: Option<String>, data: serde_json::Value },
    Message(ClientMessage),
    ClientConnected { id: String, url: String },
    ClientDisconnected { id: String },
}

/// What the host should do in response to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "effect")]
pub enum Effect {
    Installed { report: InstallReport },
    Activation { outcome: ActivateOutcome },
    Respond { route: Route, outcome: FetchOutcome },
    Synced { outcome: SyncOutcome },
    ShowNotification { notification: NotificationRequest },
    /// The push carried nothing showable.
    NoNotification,
    NotificationClosed { outcome: ClickOutcome },
    SkipWaiting { activation: Option<ActivateOutcome> },
    Version { version: String },
    Queued { task: SyncTask },
    ClientConnected { client: Client },
    ClientDisconnected { client: Option<Client> },
}

pub struct ServiceWorkerState {
    db: CacheDb,
    origin: Url,
    version: String,
    router: RoutingTable,
    runner: StrategyRunner,
    lifecycle: LifecycleManager,
    sync: SyncQueue,
    notifications: NotificationDispatcher,
    clients: Mutex<ClientRegistry>,
}

impl ServiceWorkerState {
    /// Build every component over `db` and `network`.
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;

        Ok(Self {
            router: RoutingTable::from_config(config)?,
            runner: StrategyRunner::new(
                db.clone(),
                network.clone(),
                config.dynamic_cache.clone(),
                Fallbacks::from_config(config, &origin)?,
            ),
            lifecycle: LifecycleManager::from_config(db.clone(), network.clone(), config, &origin)?,
            sync: SyncQueue::new(
                db.clone(),
                network,
                SyncEndpoints::from_config(config, &origin)?,
                config.dynamic_cache.clone(),
            ),
            notifications: NotificationDispatcher::from_config(config, &origin),
            clients: Mutex::new(ClientRegistry::new()),
            version: config.version.clone(),
            origin,
            db,
        })
    }

    /// Build with the real HTTP client.
    pub fn from_config(config: &AppConfig, db: CacheDb) -> Result<Self, Error> {
        let network = FetchClient::new(FetchConfig::from(config))?;
        Self::new(config, db, Arc::new(network))
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Names of the generations this version owns.
    pub fn generations(&self) -> &Generations {
        self.lifecycle.generations()
    }

    /// Resolve a possibly root-relative URL against the origin.
    pub fn resolve_url(&self, url: &str) -> Result<String, Error> {
        resolve(&self.origin, url)
            .map(String::from)
            .map_err(|e| Error::InvalidUrl(format!("{url:?}: {e}")))
    }

    pub async fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    pub async fn clients(&self) -> Vec<Client> {
        self.clients.lock().await.all()
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Install failures, activation from the wrong state, storage failures
    /// during sync or queueing. Fetch events never fail.
    pub async fn handle(&self, event: WorkerEvent) -> Result<Effect, Error> {
        match event {
            WorkerEvent::Install => Ok(Effect::Installed { report: self.lifecycle.install().await? }),
            WorkerEvent::Activate => {
                let mut clients = self.clients.lock().await;
                Ok(Effect::Activation { outcome: self.lifecycle.activate(&mut clients).await? })
            }
            WorkerEvent::Fetch(request) => {
                let (route, outcome) = self.fetch(request).await;
                Ok(Effect::Respond { route, outcome })
            }
            WorkerEvent::Sync { tag } => Ok(Effect::Synced { outcome: self.sync.handle_sync(&tag).await? }),
            WorkerEvent::PeriodicSync { tag } => Ok(Effect::Synced { outcome: self.sync.handle_periodic(&tag).await }),
            WorkerEvent::Push { payload } => Ok(match self.notifications.on_push(payload.as_deref()) {
                Some(notification) => Effect::ShowNotification { notification },
                None => Effect::NoNotification,
            }),
            WorkerEvent::NotificationClick { action, data } => {
                let controller = self.lifecycle.controller().await;
                let mut clients = self.clients.lock().await;
                let outcome = self.notifications.on_click(action.as_deref(), &data, &mut clients, controller);
                Ok(Effect::NotificationClosed { outcome })
            }
            WorkerEvent::Message(message) => self.on_message(message).await,
            WorkerEvent::ClientConnected { id, url } => {
                let url = self.resolve_url(&url)?;
                let controller = self.lifecycle.controller().await;
                let client = self.clients.lock().await.connect(id, url, controller);
                Ok(Effect::ClientConnected { client })
            }
            WorkerEvent::ClientDisconnected { id } => {
                Ok(Effect::ClientDisconnected { client: self.clients.lock().await.disconnect(&id) })
            }
        }
    }

    /// Route and serve one request. Root-relative URLs are resolved against
    /// the origin first.
    pub async fn fetch(&self, mut request: RequestDescriptor) -> (Route, FetchOutcome) {
        if let Ok(url) = resolve(&self.origin, &request.url) {
            request.url = url.into();
        }

        let route = self.router.classify(&request);
        let outcome = match route {
            Route::Bypass => self.runner.passthrough(&request).await,
            Route::Strategy(strategy) => self.runner.respond(strategy, &request).await,
        };
        tracing::debug!(
            url = %request.url,
            route = ?route,
            source = ?outcome.source,
            status = outcome.response.status,
            "served"
        );
        (route, outcome)
    }

    async fn on_message(&self, message: ClientMessage) -> Result<Effect, Error> {
        match message {
            ClientMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                let activation = if self.lifecycle.state().await == LifecycleState::Installed {
                    let mut clients = self.clients.lock().await;
                    Some(self.lifecycle.activate(&mut clients).await?)
                } else {
                    None
                };
                Ok(Effect::SkipWaiting { activation })
            }
            ClientMessage::GetVersion => Ok(Effect::Version { version: self.version.clone() }),
            ClientMessage::QueueSync { kind, payload } => {
                Ok(Effect::Queued { task: self.sync.enqueue(kind, &payload).await? })
            }
        }
    }
}
