//! Handler registry: ordered groups of handlers.
//!
//! Groups are tried in ascending numeric order; within a group, handlers are tried in
//! insertion order and the first match consumes the update for that group. Later groups
//! still run.

use crate::handler::Handler;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    groups: BTreeMap<i32, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub(crate) fn add(&mut self, handler: Arc<dyn Handler>, group: i32) {
        self.groups.entry(group).or_default().push(handler);
    }

    /// Removes a handler by identity (`Arc::ptr_eq`). Returns whether anything was removed.
    pub(crate) fn remove(&mut self, handler: &Arc<dyn Handler>, group: i32) -> bool {
        let Some(handlers) = self.groups.get_mut(&group) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|existing| !Arc::ptr_eq(existing, handler));
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            self.groups.remove(&group);
        }
        removed
    }

    /// Clones the current group structure. Dispatch works on a snapshot, so registry
    /// mutation from inside a running handler takes effect for subsequent updates only.
    pub(crate) fn snapshot(&self) -> Vec<(i32, Vec<Arc<dyn Handler>>)> {
        self.groups
            .iter()
            .map(|(group, handlers)| (*group, handlers.clone()))
            .collect()
    }
}
