//! The check registry: insertion order within category buckets.

use crate::check::{Category, Check};

/// Holds the registered checks. Iteration yields categories in canonical
/// order and, within a category, checks in registration order.
#[derive(Default)]
pub struct Registry {
    checks: Vec<Box<dyn Check>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Indices into the check list, bucketed by category order.
    pub fn ordered_indices(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.checks.len());
        for category in Category::ALL {
            for (idx, check) in self.checks.iter().enumerate() {
                if check.category() == category {
                    order.push(idx);
                }
            }
        }
        order
    }

    pub fn check_mut(&mut self, idx: usize) -> &mut Box<dyn Check> {
        &mut self.checks[idx]
    }

    pub fn check(&self, idx: usize) -> &dyn Check {
        self.checks[idx].as_ref()
    }
}

/// The full doctor registry, every check wired in its category.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    crate::checks::core::register(&mut registry);
    crate::checks::config::register(&mut registry);
    crate::checks::patrol::register(&mut registry);
    crate::checks::rig::register(&mut registry);
    crate::checks::cleanup::register(&mut registry);
    crate::checks::infra::register(&mut registry);
    registry
}
