//! Shared circuit breakers, one per logical endpoint.

use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use crate::config::{BreakerScope, CircuitBreakerConfig};
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Hands out the breaker guarding a target. Workers that resolve to the same
/// endpoint key share one breaker instance.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// The breaker for `target`, created closed on first use.
    pub fn breaker_for(&self, target: &str) -> Arc<CircuitBreaker> {
        let key = endpoint_key(self.config.scope, target);
        if let Some(existing) = self.breakers.get(&key) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_config(key, &self.config)));
        Arc::clone(entry.value())
    }

    /// Number of distinct endpoints seen so far.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

/// Map a target onto the key of the breaker that guards it.
///
/// Targets that do not parse as URLs fall back to the raw string so they still
/// get a breaker of their own.
pub fn endpoint_key(scope: BreakerScope, target: &str) -> String {
    match scope {
        BreakerScope::Global => "*".to_string(),
        BreakerScope::Url => target.to_string(),
        BreakerScope::Host => match Url::parse(target) {
            Ok(url) => match (url.host_str(), url.port_or_known_default()) {
                (Some(host), Some(port)) => format!("{}://{}:{}", url.scheme(), host, port),
                (Some(host), None) => format!("{}://{}", url.scheme(), host),
                _ => target.to_string(),
            },
            Err(_) => target.to_string(),
        },
    }
}
