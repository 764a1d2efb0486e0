//! Worker components for casa-sw.
//!
//! This crate provides the network client, request routing, fetch
//! strategies, install/activate lifecycle, background sync, notification
//! handling, and the event dispatch that ties them together.

pub mod clients;
pub mod fetch;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod strategies;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use clients::{Client, ClientRegistry};
pub use fetch::{FetchClient, FetchConfig, Network};
pub use lifecycle::{ActivateOutcome, Generations, InstallReport, LifecycleManager, LifecycleState};
pub use notify::{ClickOutcome, NotificationAction, NotificationDispatcher, NotificationRequest, PushPayload};
pub use router::{Route, RoutingRule, RoutingTable, RulePredicate, Strategy};
pub use strategies::{Fallbacks, FetchOutcome, ResponseSource, StrategyRunner};
pub use sync::{SyncEndpoints, SyncOutcome, SyncQueue, SyncReport};
pub use worker::{ClientMessage, Effect, ServiceWorkerState, WorkerEvent};
