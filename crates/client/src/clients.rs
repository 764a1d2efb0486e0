//! Registry of open clients (pages) the worker can control, focus, or open.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Serialize;

/// One open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Client {
    pub id: String,
    pub url: String,
    /// Version of the worker controlling this client, if any.
    pub controller: Option<String>,
    pub focused: bool,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Client>,
    opened: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous client with the same id.
    pub fn connect(&mut self, id: impl Into<String>, url: impl Into<String>, controller: Option<String>) -> Client {
        let client = Client { id: id.into(), url: url.into(), controller, focused: false };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    pub fn disconnect(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn all(&self) -> Vec<Client> {
        self.clients.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of clients controlled by a version other than `version`.
    pub fn controlled_by_other(&self, version: &str) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref().is_some_and(|v| v != version))
            .count()
    }

    /// Make `version` the controller of every client. Returns how many changed hands.
    pub fn claim(&mut self, version: &str) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Focus the first client showing `url`, unfocusing the rest.
    pub fn focus_at(&mut self, url: &str) -> Option<Client> {
        let id = self.clients.values().find(|c| c.url == url)?.id.clone();
        for client in self.clients.values_mut() {
            client.focused = client.id == id;
        }
        self.clients.get(&id).cloned()
    }

    /// Open and focus a new window at `url`.
    pub fn open_window(&mut self, url: impl Into<String>, controller: Option<String>) -> Client {
        self.opened += 1;
        let id = format!("window-{}", self.opened);
        for client in self.clients.values_mut() {
            client.focused = false;
        }
        let mut client = self.connect(id, url, controller);
        client.focused = true;
        if let Some(stored) = self.clients.get_mut(&client.id) {
            stored.focused = true;
        }
        client
    }
}
