//! Named circuit breakers, one per downstream target

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Registry of circuit breakers keyed by target name
///
/// Each downstream service (CRM, ads API, messaging gateway, ...) gets its
/// own breaker so that an outage in one does not reject calls to the others.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers share one configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the breaker for `name`, creating it on first use
    pub fn get_or_create(&self, name: &str) -> CircuitBreaker {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        self.breakers
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                log::debug!("Creating circuit breaker for target '{}'", name);
                CircuitBreaker::new(self.config.clone())
            })
            .clone()
    }

    /// Get the breaker for `name` if one exists
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.read().get(name).cloned()
    }

    /// Current state of every registered breaker, ordered by name
    pub fn states(&self) -> BTreeMap<String, CircuitState> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    /// Reset every registered breaker to closed
    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker has been registered yet
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
