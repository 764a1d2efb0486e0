//! Scripted `Network` double for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use casa_sw_core::{CacheDb, Error, RequestDescriptor, StoredResponse};
use tokio::sync::Semaphore;

use crate::fetch::Network;

#[derive(Clone, Debug)]
pub enum Reply {
    Respond(StoredResponse),
    Fail,
}

/// Answers requests from a script; anything unscripted fails like an offline network.
#[derive(Default)]
pub struct ScriptedNetwork {
    standing: Mutex<HashMap<String, Reply>>,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<RequestDescriptor>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

fn key(method: &str, url: &str) -> String {
    format!("{} {url}", method.to_ascii_uppercase())
}

pub fn ok(content_type: &str, body: &str) -> StoredResponse {
    StoredResponse::with_content_type(200, content_type, body)
}

pub fn status(code: u16) -> StoredResponse {
    StoredResponse::with_content_type(code, "text/plain", format!("status {code}"))
}

impl ScriptedNetwork {
    pub fn offline() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit on the returned semaphore before answering.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: Some(gate.clone()), ..Self::default() }, gate)
    }

    /// Answer every `method url` request with `reply`.
    pub fn on(self, method: &str, url: &str, reply: Reply) -> Self {
        self.standing.lock().unwrap().insert(key(method, url), reply);
        self
    }

    pub fn on_get(self, url: &str, response: StoredResponse) -> Self {
        self.on("GET", url, Reply::Respond(response))
    }

    /// Answer the next `method url` request with `reply`, ahead of any standing reply.
    pub fn then(self, method: &str, url: &str, reply: Reply) -> Self {
        self.queued.lock().unwrap().entry(key(method, url)).or_default().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<StoredResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let k = key(&request.method, &request.url);
        let queued = self.queued.lock().unwrap().get_mut(&k).and_then(VecDeque::pop_front);
        let reply = queued.or_else(|| self.standing.lock().unwrap().get(&k).cloned());

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail) | None => Err(Error::Network(format!("offline: {k}"))),
        }
    }
}

/// Poll until `request` is cached with `body`, or panic after ~2s.
pub async fn wait_for_cached(db: &CacheDb, request: &RequestDescriptor, body: &str) {
    for _ in 0..200 {
        if let Some(hit) = db.match_request(request).await.unwrap()
            && hit.text() == body
        {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{} never cached with body {body:?}", request.url);
}
