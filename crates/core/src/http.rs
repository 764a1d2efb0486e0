//! Request and response descriptors exchanged between the worker components.
//!
//! These are deliberately transport-agnostic: the client crate converts them
//! to and from `reqwest` types, the cache stores them as rows.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body of the response synthesized when nothing else can answer a request.
pub const NETWORK_ERROR_BODY: &str = "Network error";

/// Status of the response synthesized when nothing else can answer a request.
pub const NETWORK_ERROR_STATUS: u16 = 408;

/// What kind of resource the caller intends to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestDestination {
    Document,
    Image,
    Style,
    Script,
    Font,
    #[default]
    Other,
}

/// An outbound request as seen at the interception boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestDescriptor {
    /// HTTP method, upper-case.
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute or root-relative URL.
    pub url: String,
    /// Value of the Accept header, if any.
    #[serde(default)]
    pub accept: Option<String>,
    #[serde(default)]
    pub destination: RequestDestination,
    /// Additional request headers forwarded to the network.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

fn default_method() -> String {
    "GET".into()
}

impl RequestDescriptor {
    /// A plain GET for `url` with no Accept header.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            accept: None,
            destination: RequestDestination::Other,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A top-level navigation: GET accepting HTML.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::get(url)
            .with_accept("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .with_destination(RequestDestination::Document)
    }

    /// A POST carrying a JSON body.
    pub fn post_json(url: impl Into<String>, payload: &serde_json::Value) -> Self {
        Self {
            method: "POST".into(),
            url: url.into(),
            accept: Some("application/json".into()),
            destination: RequestDestination::Other,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(payload.to_string().into_bytes()),
        }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Whether the Accept header asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.accept.as_deref().is_some_and(|a| a.contains("text/html"))
    }

    pub fn is_image(&self) -> bool {
        self.destination == RequestDestination::Image
    }
}

/// A response snapshot: what the network returned or what a generation holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoredResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// A response with a single Content-Type header.
    pub fn with_content_type(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, vec![("Content-Type".into(), content_type.into())], body)
    }

    /// The terminal response returned when no network, cache, or fallback can answer.
    pub fn network_error() -> Self {
        Self::with_content_type(NETWORK_ERROR_STATUS, "text/plain", NETWORK_ERROR_BODY)
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
