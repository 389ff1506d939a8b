//! Transaction policy.
//!
//! An explicit table deciding, per handler implementation, whether the
//! transactional decorator is active. The decision is made once at
//! composition time and captured in the wrapper.

use std::collections::HashMap;

use crate::config::TransactionConfig;
use crate::contract::ImplId;

/// Per-implementation transaction enablement with an explicit default.
#[derive(Debug, Clone)]
pub struct TransactionPolicy {
    default_enabled: bool,
    overrides: HashMap<ImplId, bool>,
}

impl TransactionPolicy {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            default_enabled,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::new(config.default_enabled)
    }

    /// Force transactions on for one implementation.
    pub fn enable(mut self, implementation: ImplId) -> Self {
        self.overrides.insert(implementation, true);
        self
    }

    /// Force transactions off for one implementation.
    pub fn disable(mut self, implementation: ImplId) -> Self {
        self.overrides.insert(implementation, false);
        self
    }

    pub fn default_enabled(&self) -> bool {
        self.default_enabled
    }

    /// Whether the transactional decorator is active for `implementation`.
    pub fn is_enabled(&self, implementation: &ImplId) -> bool {
        self.overrides
            .get(implementation)
            .copied()
            .unwrap_or(self.default_enabled)
    }
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HandlerA;
    struct HandlerB;

    #[test]
    fn falls_back_to_the_default() {
        let policy = TransactionPolicy::new(true);
        assert!(policy.is_enabled(&ImplId::of::<HandlerA>()));

        let policy = TransactionPolicy::new(false);
        assert!(!policy.is_enabled(&ImplId::of::<HandlerA>()));
    }

    #[test]
    fn overrides_beat_the_default() {
        let policy = TransactionPolicy::new(true).disable(ImplId::of::<HandlerA>());
        assert!(!policy.is_enabled(&ImplId::of::<HandlerA>()));
        assert!(policy.is_enabled(&ImplId::of::<HandlerB>()));

        let policy = TransactionPolicy::new(false).enable(ImplId::of::<HandlerB>());
        assert!(policy.is_enabled(&ImplId::of::<HandlerB>()));
        assert!(!policy.is_enabled(&ImplId::of::<HandlerA>()));
    }

    #[test]
    fn from_config_copies_the_default() {
        let config = TransactionConfig {
            default_enabled: false,
        };
        assert!(!TransactionPolicy::from_config(&config).default_enabled());
    }
}
