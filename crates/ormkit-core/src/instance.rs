//! Model instances with per-field change tracking.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Result;
use crate::error::{CompilationErrorKind, Error};
use crate::model::ModelInfo;
use crate::value::Value;

/// Shared handle to a model instance within one session.
pub type ModelRef = Rc<RefCell<ModelInstance>>;

/// Identifies the session that owns an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldSlot {
    current: Value,
    baseline: Value,
    is_set: bool,
}

impl FieldSlot {
    const fn unset() -> Self {
        Self {
            current: Value::Null,
            baseline: Value::Null,
            is_set: false,
        }
    }
}

/// A row of a model: one slot per field plus navigation slots.
///
/// Each slot keeps the value last read from or written to the backend
/// (the baseline) next to the value the caller assigned (current).
pub struct ModelInstance {
    info: Arc<ModelInfo>,
    slots: Vec<FieldSlot>,
    key_snapshot: Option<Vec<Value>>,
    singles: HashMap<&'static str, Option<ModelRef>>,
    collections: HashMap<&'static str, Vec<ModelRef>>,
    owner: Option<SessionId>,
}

impl ModelInstance {
    pub fn new(info: Arc<ModelInfo>) -> Self {
        let slots = vec![FieldSlot::unset(); info.fields().len()];
        Self {
            info,
            slots,
            key_snapshot: None,
            singles: HashMap::new(),
            collections: HashMap::new(),
            owner: None,
        }
    }

    pub fn info(&self) -> &Arc<ModelInfo> {
        &self.info
    }

    pub fn model_name(&self) -> &'static str {
        self.info.name
    }

    /// Wrap into a shared [`ModelRef`].
    pub fn into_ref(self) -> ModelRef {
        Rc::new(RefCell::new(self))
    }

    fn slot_index(&self, name: &str) -> Result<usize> {
        self.info.field_index(name).ok_or_else(|| {
            Error::compilation(
                CompilationErrorKind::UnknownField,
                self.info.name,
                format!("Unknown field {name}"),
            )
        })
    }

    /// Current value of a field; unset fields read as NULL.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.info.field_index(name).map(|i| &self.slots[i].current)
    }

    /// Baseline (last committed) value of a field.
    pub fn baseline(&self, name: &str) -> Option<&Value> {
        self.info.field_index(name).map(|i| &self.slots[i].baseline)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.info.field_index(name).is_some_and(|i| self.slots[i].is_set)
    }

    /// Assign a field.
    ///
    /// The value is coerced to the field's kind. The first assignment sets
    /// current and baseline; later ones change current only, and the first
    /// of those snapshots the primary key. The snapshot is dropped again once
    /// every field matches its baseline.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.slot_index(name)?;
        let value = self.info.fields()[index].coerce(value.into())?;

        if !self.slots[index].is_set {
            let slot = &mut self.slots[index];
            slot.current = value.clone();
            slot.baseline = value;
            slot.is_set = true;
            return Ok(());
        }

        if self.key_snapshot.is_none() {
            self.key_snapshot = Some(self.primary_key());
        }
        self.slots[index].current = value;
        self.settle();
        Ok(())
    }

    /// Overwrite a field with a committed value (current and baseline),
    /// as read from the backend or applied by cache reconciliation.
    pub fn load(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self.slot_index(name)?;
        let value = self.info.fields()[index].coerce(value)?;
        let slot = &mut self.slots[index];
        slot.current = value.clone();
        slot.baseline = value;
        slot.is_set = true;
        self.settle();
        Ok(())
    }

    /// Drop the key snapshot when nothing is pending.
    fn settle(&mut self) {
        if self.key_snapshot.is_some() && !self.is_dirty() {
            self.key_snapshot = None;
        }
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.info
            .field_index(name)
            .is_some_and(|i| self.slots[i].current != self.slots[i].baseline)
    }

    /// Whether any field differs from its baseline.
    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(|s| s.current != s.baseline)
    }

    /// Changed fields with their current values, in declaration order.
    pub fn changes(&self) -> Vec<(&'static str, Value)> {
        self.info
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.current != slot.baseline)
            .map(|(field, slot)| (field.name, slot.current.clone()))
            .collect()
    }

    /// Set fields with their current values, in declaration order.
    pub fn set_values(&self) -> Vec<(&'static str, Value)> {
        self.info
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_set)
            .map(|(field, slot)| (field.name, slot.current.clone()))
            .collect()
    }

    /// Current primary-key values.
    pub fn primary_key(&self) -> Vec<Value> {
        self.info
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(field, _)| field.primary_key)
            .map(|(_, slot)| slot.current.clone())
            .collect()
    }

    /// Primary key as it was before the first pending mutation.
    pub fn key_snapshot(&self) -> Option<&[Value]> {
        self.key_snapshot.as_deref()
    }

    /// The key that identifies this instance's row in the backend.
    pub fn persisted_key(&self) -> Vec<Value> {
        self.key_snapshot
            .clone()
            .unwrap_or_else(|| self.primary_key())
    }

    /// Make current values the new baseline and drop the key snapshot.
    pub fn commit(&mut self) {
        for slot in &mut self.slots {
            slot.baseline = slot.current.clone();
        }
        self.key_snapshot = None;
    }

    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: SessionId) {
        self.owner = Some(owner);
    }

    /// Target of a single-valued navigation, if loaded and present.
    pub fn single(&self, navigation: &str) -> Option<ModelRef> {
        self.singles.get(navigation).and_then(Clone::clone)
    }

    /// Targets of a collection navigation; empty when not loaded.
    pub fn collection(&self, navigation: &str) -> Vec<ModelRef> {
        self.collections
            .get(navigation)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a navigation slot has been filled by a fetch.
    pub fn is_loaded(&self, navigation: &str) -> bool {
        self.singles.contains_key(navigation) || self.collections.contains_key(navigation)
    }

    pub fn attach_single(&mut self, navigation: &'static str, target: Option<ModelRef>) {
        self.singles.insert(navigation, target);
    }

    pub fn attach_collection(&mut self, navigation: &'static str, targets: Vec<ModelRef>) {
        self.collections.insert(navigation, targets);
    }

    /// Drop navigation targets that no longer exist.
    pub fn detach(&mut self, gone: &ModelRef) {
        for target in self.singles.values_mut() {
            if target.as_ref().is_some_and(|t| Rc::ptr_eq(t, gone)) {
                *target = None;
            }
        }
        for targets in self.collections.values_mut() {
            targets.retain(|t| !Rc::ptr_eq(t, gone));
        }
    }
}

// navigation slots may form cycles, so only their names are printed
impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<_> = self
            .info
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_set)
            .map(|(field, slot)| (field.name, &slot.current))
            .collect();
        f.debug_struct("ModelInstance")
            .field("model", &self.info.name)
            .field("fields", &fields)
            .field("key_snapshot", &self.key_snapshot)
            .field("singles", &self.singles.keys().collect::<Vec<_>>())
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("owner", &self.owner)
            .finish()
    }
}
