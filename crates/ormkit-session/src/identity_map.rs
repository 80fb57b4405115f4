//! Identity Map: one in-memory instance per primary key within a session.
//!
//! The map provides:
//!
//! - **Uniqueness**: the same key always resolves to the same [`ModelRef`]
//! - **Cache**: point lookups are answered without a query
//! - **Consistency**: bulk updates and deletes are replayed onto cached
//!   entries by evaluating the same [`Condition`] the backend executed
//!
//! Entries are keyed per model by the JSON serialization of the primary-key
//! tuple. Every set unique field adds a secondary `(field, value)` index
//! entry; those are advisory and never an identity of their own.

use std::collections::HashMap;
use std::rc::Rc;

use ormkit_core::{ModelRef, ReferentialAction, Registry, Result, Value};
use ormkit_query::Condition;

/// Serialize a primary-key tuple into a cache key.
pub fn cache_key(values: &[Value]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

#[derive(Debug, Default)]
struct ModelEntries {
    primary: HashMap<String, ModelRef>,
    /// Primary keys in registration order
    order: Vec<String>,
    unique: HashMap<(String, String), String>,
}

impl ModelEntries {
    fn iter(&self) -> impl Iterator<Item = &ModelRef> {
        self.order.iter().filter_map(|key| self.primary.get(key))
    }

    fn remove(&mut self, key: &str) -> Option<ModelRef> {
        let model = self.primary.remove(key)?;
        self.order.retain(|k| k != key);
        self.unique.retain(|_, primary| primary != key);
        Some(model)
    }

    /// Rebuild the secondary entries pointing at `key` from the model's set
    /// unique fields.
    fn index_unique(&mut self, key: &str, model: &ModelRef) {
        self.unique.retain(|_, primary| primary != key);
        let instance = model.borrow();
        for field in instance.info().unique_fields() {
            if !instance.is_set(field.name) {
                continue;
            }
            if let Some(value) = instance.get(field.name).filter(|v| !v.is_null()) {
                self.unique.insert(
                    (field.name.to_string(), value.to_plain_string()),
                    key.to_string(),
                );
            }
        }
    }
}

/// Per-session cache of hydrated and inserted model instances.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: HashMap<&'static str, ModelEntries>,
}

impl ModelCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached instances across all models.
    pub fn len(&self) -> usize {
        self.models.values().map(|m| m.primary.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached instances of `model`, in registration order.
    pub fn entries(&self, model: &str) -> Vec<ModelRef> {
        self.models
            .get(model)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The instance cached for a primary-key tuple.
    pub fn get(&self, model: &str, key: &[Value]) -> Result<Option<ModelRef>> {
        let key = cache_key(key)?;
        Ok(self
            .models
            .get(model)
            .and_then(|m| m.primary.get(&key))
            .cloned())
    }

    /// Whether this exact instance is the cached one for its key.
    pub fn contains(&self, model: &ModelRef) -> Result<bool> {
        let (name, key) = {
            let instance = model.borrow();
            (instance.model_name(), cache_key(&instance.persisted_key())?)
        };
        Ok(self
            .models
            .get(name)
            .and_then(|m| m.primary.get(&key))
            .is_some_and(|cached| Rc::ptr_eq(cached, model)))
    }

    /// Store an instance under its primary key, overwriting any previous
    /// entry for that key, and index its set unique fields.
    #[tracing::instrument(level = "trace", skip(self, model))]
    pub fn register(&mut self, model: &ModelRef) -> Result<()> {
        let (name, key) = {
            let instance = model.borrow();
            (instance.model_name(), cache_key(&instance.persisted_key())?)
        };
        let entries = self.models.entry(name).or_default();
        if entries.primary.insert(key.clone(), Rc::clone(model)).is_none() {
            entries.order.push(key.clone());
        }
        entries.index_unique(&key, model);
        tracing::trace!(model = name, key = %key, "registered");
        Ok(())
    }

    /// First cached instance of `model`, in registration order, for which
    /// `condition` holds.
    pub fn find_one(&self, model: &str, condition: &Condition) -> Option<ModelRef> {
        let entries = self.models.get(model)?;
        entries
            .iter()
            .find(|m| condition.evaluate(&m.borrow()))
            .cloned()
    }

    /// Secondary-key lookup on a unique field.
    pub fn find_unique(&self, model: &str, field: &str, value: &Value) -> Option<ModelRef> {
        let entries = self.models.get(model)?;
        let key = entries
            .unique
            .get(&(field.to_string(), value.to_plain_string()))?;
        let found = entries.primary.get(key)?;
        // the index is advisory; confirm against the live value
        (found.borrow().get(field) == Some(value)).then(|| Rc::clone(found))
    }

    /// Apply a committed bulk update to every cached instance of `model`
    /// matching `condition`. Returns the number of instances touched.
    #[tracing::instrument(level = "debug", skip(self, condition, changes))]
    pub fn reconcile_update(
        &mut self,
        model: &str,
        condition: &Condition,
        changes: &[(&'static str, Value)],
    ) -> Result<usize> {
        let matched: Vec<ModelRef> = match self.models.get(model) {
            Some(entries) => entries
                .iter()
                .filter(|m| condition.evaluate(&m.borrow()))
                .cloned()
                .collect(),
            None => return Ok(0),
        };

        for instance in &matched {
            let old_key = instance.borrow().persisted_key();
            {
                let mut instance = instance.borrow_mut();
                for (field, value) in changes {
                    instance.load(field, value.clone())?;
                }
            }
            self.rekey(instance, &old_key)?;
        }

        tracing::debug!(model, matched = matched.len(), "reconciled update");
        Ok(matched.len())
    }

    /// Drop every cached instance of `model` matching `condition`, then apply
    /// the `on_delete` action of every single-valued navigation pointing at
    /// a dropped instance. Returns every instance removed, cascades included.
    #[tracing::instrument(level = "debug", skip(self, registry, condition))]
    pub fn reconcile_delete(
        &mut self,
        registry: &Registry,
        model: &str,
        condition: &Condition,
    ) -> Result<Vec<ModelRef>> {
        let Some(entries) = self.models.get(model) else {
            return Ok(Vec::new());
        };
        let mut pending: Vec<ModelRef> = entries
            .iter()
            .filter(|m| condition.evaluate(&m.borrow()))
            .cloned()
            .collect();

        let mut removed = Vec::new();
        while let Some(gone) = pending.pop() {
            if !self.remove(&gone)? {
                continue;
            }
            let target = gone.borrow().model_name();

            for (dependent, navigation) in registry.dependents(target) {
                let Some(value) = gone
                    .borrow()
                    .get(navigation.target_field)
                    .filter(|v| !v.is_null())
                    .cloned()
                else {
                    continue;
                };
                let owners: Vec<ModelRef> = self
                    .entries(dependent.name)
                    .into_iter()
                    .filter(|owner| owner.borrow().get(navigation.field) == Some(&value))
                    .collect();

                for owner in owners {
                    match navigation.on_delete {
                        ReferentialAction::Cascade => pending.push(owner),
                        ReferentialAction::SetNull => {
                            let old_key = owner.borrow().persisted_key();
                            owner.borrow_mut().load(navigation.field, Value::Null)?;
                            self.rekey(&owner, &old_key)?;
                        }
                        ReferentialAction::Restrict | ReferentialAction::NoAction => {}
                    }
                }
            }
            removed.push(gone);
        }

        for remaining in self.models.values().flat_map(|m| m.primary.values()) {
            let mut remaining = remaining.borrow_mut();
            for gone in &removed {
                remaining.detach(gone);
            }
        }

        tracing::debug!(model, removed = removed.len(), "reconciled delete");
        Ok(removed)
    }

    /// Move an instance cached under `old_key` to its current key and
    /// re-index its unique fields. Instances cached elsewhere are untouched.
    pub fn rekey(&mut self, model: &ModelRef, old_key: &[Value]) -> Result<()> {
        let (name, new_key) = {
            let instance = model.borrow();
            (instance.model_name(), cache_key(&instance.persisted_key())?)
        };
        let old_key = cache_key(old_key)?;
        let Some(entries) = self.models.get_mut(name) else {
            return Ok(());
        };
        if !entries
            .primary
            .get(&old_key)
            .is_some_and(|cached| Rc::ptr_eq(cached, model))
        {
            return Ok(());
        }

        if old_key != new_key {
            entries.remove(&old_key);
            if entries.primary.insert(new_key.clone(), Rc::clone(model)).is_none() {
                entries.order.push(new_key.clone());
            }
            tracing::trace!(model = name, from = %old_key, to = %new_key, "rekeyed");
        }
        entries.index_unique(&new_key, model);
        Ok(())
    }

    /// Remove an instance if it is the one cached for its key.
    pub fn remove(&mut self, model: &ModelRef) -> Result<bool> {
        if !self.contains(model)? {
            return Ok(false);
        }
        let (name, key) = {
            let instance = model.borrow();
            (instance.model_name(), cache_key(&instance.persisted_key())?)
        };
        Ok(self
            .models
            .get_mut(name)
            .and_then(|m| m.remove(&key))
            .is_some())
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.models.clear();
    }
}
