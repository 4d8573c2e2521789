//! Contributions declared by resolved addins, grouped by extension point

use std::sync::{Arc, PoisonError, RwLock};

use trellis_addin_api::{AddinId, ExtensionBuilder};

struct Contribution {
    point: String,
    builder: Arc<dyn ExtensionBuilder>,
}

/// Every builder contributed to any extension point, in registration order.
///
/// The engine registers an addin's builders when it resolves and removes
/// them once the addin is stopped or failed.
#[derive(Default)]
pub struct ExtensionRegistry {
    contributions: RwLock<Vec<Contribution>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, point: impl Into<String>, builder: Arc<dyn ExtensionBuilder>) {
        let point = point.into();
        tracing::trace!(
            point = %point,
            addin = %builder.descriptor().addin,
            builder = %builder.descriptor().id,
            "Contribution registered"
        );
        self.contributions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Contribution { point, builder });
    }

    /// Builders contributed to `point`
    pub fn contributions(&self, point: &str) -> Vec<Arc<dyn ExtensionBuilder>> {
        self.contributions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.point == point)
            .map(|c| Arc::clone(&c.builder))
            .collect()
    }

    /// Builders `addin` contributed to `point`
    pub fn contributions_of(&self, point: &str, addin: &AddinId) -> Vec<Arc<dyn ExtensionBuilder>> {
        self.contributions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.point == point && &c.builder.descriptor().addin == addin)
            .map(|c| Arc::clone(&c.builder))
            .collect()
    }

    /// Names of points with at least one contribution, sorted
    pub fn points(&self) -> Vec<String> {
        let mut points: Vec<String> = self
            .contributions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.point.clone())
            .collect();
        points.sort();
        points.dedup();
        points
    }

    /// Forget every contribution of `addin`
    pub fn remove_addin(&self, addin: &AddinId) -> usize {
        let mut contributions = self
            .contributions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = contributions.len();
        contributions.retain(|c| &c.builder.descriptor().addin != addin);
        before - contributions.len()
    }

    pub fn len(&self) -> usize {
        self.contributions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
