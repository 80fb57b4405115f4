//! Change tracking for models owned by a session.
//!
//! Field-level dirty state lives on each [`ModelInstance`](ormkit_core::ModelInstance)
//! (current vs. baseline). The tracker only remembers which instances the
//! session handed out and which were explicitly queued, so that
//! `save_changes` knows where to look.

use std::rc::Rc;

use ormkit_core::ModelRef;

/// Instances handed out by a session plus those queued for saving.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    tracked: Vec<ModelRef>,
    queued: Vec<ModelRef>,
}

impl ChangeTracker {
    /// Create a new empty change tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an instance loaded or inserted by the session.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn track(&mut self, model: &ModelRef) {
        if !contains(&self.tracked, model) {
            tracing::trace!(model = model.borrow().model_name(), "tracking");
            self.tracked.push(Rc::clone(model));
        }
    }

    /// Queue an instance for the next save, whether or not it is tracked.
    pub fn enqueue(&mut self, model: &ModelRef) {
        if !contains(&self.queued, model) {
            self.queued.push(Rc::clone(model));
        }
    }

    pub fn is_tracked(&self, model: &ModelRef) -> bool {
        contains(&self.tracked, model)
    }

    /// Models the next save considers: dirty tracked instances, then queued
    /// ones, without duplicates.
    pub fn candidates(&self) -> Vec<ModelRef> {
        let mut out: Vec<ModelRef> = self
            .tracked
            .iter()
            .filter(|m| m.borrow().is_dirty())
            .cloned()
            .collect();
        for model in &self.queued {
            if !contains(&out, model) {
                out.push(Rc::clone(model));
            }
        }
        tracing::debug!(candidates = out.len(), "collected save candidates");
        out
    }

    /// Drop the queue after a successful save.
    pub fn clear_queue(&mut self) {
        self.queued.clear();
    }

    /// Stop tracking deleted instances.
    pub fn forget(&mut self, gone: &[ModelRef]) {
        self.tracked.retain(|m| !contains(gone, m));
        self.queued.retain(|m| !contains(gone, m));
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

fn contains(list: &[ModelRef], model: &ModelRef) -> bool {
    list.iter().any(|m| Rc::ptr_eq(m, model))
}
