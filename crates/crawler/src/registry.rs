use crate::Collector;
use common::ResourceType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Collectors keyed by the resource type they enumerate.
#[derive(Default, Clone)]
pub struct CollectorRegistry {
    collectors: HashMap<ResourceType, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `collector` for `ty`, replacing any previous one.
    pub fn register(&mut self, ty: ResourceType, collector: Arc<dyn Collector>) {
        self.collectors.insert(ty, collector);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, ty: ResourceType, collector: Arc<dyn Collector>) -> Self {
        self.register(ty, collector);
        self
    }

    pub fn get(&self, ty: &ResourceType) -> Option<Arc<dyn Collector>> {
        self.collectors.get(ty).cloned()
    }

    pub fn contains(&self, ty: &ResourceType) -> bool {
        self.collectors.contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.collectors.keys().map(ResourceType::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CollectorRegistry")
            .field("collectors", &names)
            .finish()
    }
}
