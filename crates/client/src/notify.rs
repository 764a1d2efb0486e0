//! Push notifications and notification clicks.

use casa_sw_core::AppConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clients::{Client, ClientRegistry};
use crate::fetch::resolve;

pub const VIEW_ACTION: &str = "view";
pub const DISMISS_ACTION: &str = "dismiss";

const VIEW_ICON: &str = "/assets/view-icon.png";
const DISMISS_ICON: &str = "/assets/dismiss-icon.png";
const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

/// Payload pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub actions: Vec<NotificationAction>,
    pub data: serde_json::Value,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "result", content = "client")]
pub enum ClickOutcome {
    /// Closed without navigating.
    Dismissed,
    Focused(Client),
    Opened(Client),
}

pub struct NotificationDispatcher {
    origin: Url,
    icon: String,
    badge: String,
}

impl NotificationDispatcher {
    pub fn new(origin: Url, icon: impl Into<String>, badge: impl Into<String>) -> Self {
        Self { origin, icon: icon.into(), badge: badge.into() }
    }

    pub fn from_config(config: &AppConfig, origin: &Url) -> Self {
        Self::new(origin.clone(), config.notification_icon.clone(), config.notification_badge.clone())
    }

    /// Turn a push payload into a notification.
    ///
    /// A missing payload, non-JSON bytes, or a payload without a title
    /// produces nothing.
    pub fn on_push(&self, payload: Option<&[u8]>) -> Option<NotificationRequest> {
        let Some(bytes) = payload else {
            tracing::debug!("push without payload");
            return None;
        };
        let payload: PushPayload = match serde_json::from_slice(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed push payload");
                return None;
            }
        };

        Some(NotificationRequest {
            title: payload.title,
            body: payload.body,
            icon: payload.icon.unwrap_or_else(|| self.icon.clone()),
            badge: self.badge.clone(),
            actions: vec![
                NotificationAction { action: VIEW_ACTION.into(), title: "View Details".into(), icon: VIEW_ICON.into() },
                NotificationAction {
                    action: DISMISS_ACTION.into(),
                    title: "Dismiss".into(),
                    icon: DISMISS_ICON.into(),
                },
            ],
            data: payload.data,
            vibrate: VIBRATE_PATTERN.to_vec(),
            require_interaction: true,
        })
    }

    /// Handle a click on a shown notification.
    ///
    /// Only the `view` action navigates: it focuses a client already showing
    /// `data.url` (default `/`) or opens a new window there.
    pub fn on_click(
        &self, action: Option<&str>, data: &serde_json::Value, clients: &mut ClientRegistry, controller: Option<String>,
    ) -> ClickOutcome {
        if action != Some(VIEW_ACTION) {
            return ClickOutcome::Dismissed;
        }

        let target = data.get("url").and_then(|u| u.as_str()).unwrap_or("/");
        let url = match resolve(&self.origin, target) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!(%target, error = %e, "notification target is not a valid URL");
                return ClickOutcome::Dismissed;
            }
        };

        match clients.focus_at(&url) {
            Some(client) => ClickOutcome::Focused(client),
            None => {
                tracing::debug!(%url, "opening window for notification");
                ClickOutcome::Opened(clients.open_window(url, controller))
            }
        }
    }
}
