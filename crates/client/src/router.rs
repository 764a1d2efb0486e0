//! Request classification.
//!
//! Routing is an ordered table of `(predicate, route)` rules interpreted by
//! [`RoutingTable::classify`]; the first matching rule wins. The default
//! table is:
//!
//! 1. method is not GET → bypass
//! 2. scheme is not http(s) → bypass
//! 3. path starts with a network-first prefix → network-first
//! 4. path ends with a static-asset extension → cache-first
//! 5. Accept header asks for HTML → stale-while-revalidate
//! 6. anything else → network-first
//!
//! Prefixes are checked before extensions so `/api/report.js` is never
//! served from a cache-first hit.

use casa_sw_core::{AppConfig, Error, RequestDescriptor};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::fetch::is_http;

/// The algorithm that satisfies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    /// Terminal handler; never selected by routing, only reached on failure.
    ErrorFallback,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "route", content = "strategy")]
pub enum Route {
    /// Not intercepted: forwarded to the network untouched.
    Bypass,
    Strategy(Strategy),
}

/// A condition over a request.
#[derive(Debug, Clone)]
pub enum RulePredicate {
    NotGet,
    NonHttpScheme,
    PathPrefix(Vec<String>),
    PathPattern(Regex),
    AcceptsHtml,
    Always,
}

impl RulePredicate {
    /// Build a predicate matching paths ending in any of `extensions`.
    pub fn extensions(extensions: &[String]) -> Result<Self, Error> {
        let alternatives = extensions
            .iter()
            .map(|ext| regex::escape(ext.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"\.(?:{alternatives})$"))
            .map_err(|e| Error::InvalidInput(format!("bad extension pattern: {e}")))?;
        Ok(Self::PathPattern(pattern))
    }

    fn matches(&self, request: &RequestDescriptor, url: Option<&url::Url>) -> bool {
        match self {
            RulePredicate::NotGet => !request.is_get(),
            RulePredicate::NonHttpScheme => url.is_none_or(|u| !is_http(u)),
            RulePredicate::PathPrefix(prefixes) => {
                url.is_some_and(|u| prefixes.iter().any(|prefix| u.path().starts_with(prefix.as_str())))
            }
            RulePredicate::PathPattern(pattern) => url.is_some_and(|u| pattern.is_match(u.path())),
            RulePredicate::AcceptsHtml => request.accepts_html(),
            RulePredicate::Always => true,
        }
    }
}

/// One row of the routing table.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Short label used in logs.
    pub name: &'static str,
    pub predicate: RulePredicate,
    pub route: Route,
}

impl RoutingRule {
    pub fn new(name: &'static str, predicate: RulePredicate, route: Route) -> Self {
        Self { name, predicate, route }
    }
}

/// Ordered rule list; evaluation order is list order.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
}

impl RoutingTable {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// The standard table built from configured prefixes and extensions.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self::new(vec![
            RoutingRule::new("non-get", RulePredicate::NotGet, Route::Bypass),
            RoutingRule::new("non-http", RulePredicate::NonHttpScheme, Route::Bypass),
            RoutingRule::new(
                "network-first-prefix",
                RulePredicate::PathPrefix(config.network_first_prefixes.clone()),
                Route::Strategy(Strategy::NetworkFirst),
            ),
            RoutingRule::new(
                "static-asset",
                RulePredicate::extensions(&config.cache_first_extensions)?,
                Route::Strategy(Strategy::CacheFirst),
            ),
            RoutingRule::new("html", RulePredicate::AcceptsHtml, Route::Strategy(Strategy::StaleWhileRevalidate)),
            RoutingRule::new("default", RulePredicate::Always, Route::Strategy(Strategy::NetworkFirst)),
        ]))
    }

    /// Classify a request. The URL must already be absolute.
    ///
    /// A request no rule matches falls through to network-first.
    pub fn classify(&self, request: &RequestDescriptor) -> Route {
        let url = url::Url::parse(&request.url).ok();

        match self.rules.iter().find(|rule| rule.predicate.matches(request, url.as_ref())) {
            Some(rule) => {
                tracing::debug!(rule = rule.name, url = %request.url, route = ?rule.route, "classified request");
                rule.route
            }
            None => Route::Strategy(Strategy::NetworkFirst),
        }
    }
}
