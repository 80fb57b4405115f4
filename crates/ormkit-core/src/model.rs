//! Model descriptors and the registry.
//!
//! Models are declared explicitly with [`ModelInfo`] and
//! [`NavigationDef`], then validated and wired together once by
//! [`RegistryBuilder::build`]. A built [`Registry`] is immutable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::Result;
use crate::error::{CompilationErrorKind, Error};
use crate::field::{FieldInfo, ReferentialAction};
use crate::instance::ModelInstance;
use crate::validate::Validators;

/// Cardinality of a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Belongs-to / has-one: at most one target per owner
    Single,
    /// Has-many: any number of targets per owner
    Collection,
}

/// A navigation as declared, before the registry resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDef {
    name: &'static str,
    kind: NavigationKind,
    field: Option<&'static str>,
    target: &'static str,
    target_field: Option<&'static str>,
    on_delete: ReferentialAction,
}

impl NavigationDef {
    /// Owning `field` on this model refers to unique `target_field` on `target`.
    pub const fn single(
        name: &'static str,
        field: &'static str,
        target: &'static str,
        target_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: NavigationKind::Single,
            field: Some(field),
            target,
            target_field: Some(target_field),
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Owning `field` on this model refers to the primary key of `target`.
    pub const fn to_primary(name: &'static str, field: &'static str, target: &'static str) -> Self {
        Self {
            name,
            kind: NavigationKind::Single,
            field: Some(field),
            target,
            target_field: None,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Rows of `target` whose `target_field` equals this model's `field`.
    pub const fn collection(
        name: &'static str,
        field: &'static str,
        target: &'static str,
        target_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: NavigationKind::Collection,
            field: Some(field),
            target,
            target_field: Some(target_field),
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Rows of `target` whose `target_field` equals this model's primary key.
    pub const fn from_primary(
        name: &'static str,
        target: &'static str,
        target_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: NavigationKind::Collection,
            field: None,
            target,
            target_field: Some(target_field),
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// What happens to cached owners when the target row is deleted.
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// A resolved navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationInfo {
    pub name: &'static str,
    pub kind: NavigationKind,
    /// Field on the declaring model
    pub field: &'static str,
    /// Target model name
    pub target: &'static str,
    /// Field on the target model
    pub target_field: &'static str,
    pub on_delete: ReferentialAction,
}

impl NavigationInfo {
    pub fn is_collection(&self) -> bool {
        self.kind == NavigationKind::Collection
    }
}

/// Metadata about a model: its table, fields and navigations.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model and table name
    pub name: &'static str,
    fields: Vec<FieldInfo>,
    declared: Vec<NavigationDef>,
    navigations: Vec<NavigationInfo>,
}

impl ModelInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            declared: Vec::new(),
            navigations: Vec::new(),
        }
    }

    /// Append a field.
    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a navigation; it is resolved when the registry is built.
    pub fn navigation(mut self, navigation: NavigationDef) -> Self {
        self.declared.push(navigation);
        self
    }

    /// Table name.
    pub fn table(&self) -> &'static str {
        self.name
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Look up a field, failing with `UnknownField`.
    pub fn require_field(&self, name: &str) -> Result<&FieldInfo> {
        self.get_field(name).ok_or_else(|| {
            Error::compilation(
                CompilationErrorKind::UnknownField,
                self.name,
                format!("Unknown field {name}"),
            )
        })
    }

    /// Primary-key fields in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// Names of the primary-key fields.
    pub fn primary_key_names(&self) -> Vec<&'static str> {
        self.primary_key().map(|f| f.name).collect()
    }

    /// Fields with a unique constraint (including a single primary key).
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// Resolved navigations.
    pub fn navigations(&self) -> &[NavigationInfo] {
        &self.navigations
    }

    pub fn get_navigation(&self, name: &str) -> Option<&NavigationInfo> {
        self.navigations.iter().find(|n| n.name == name)
    }

    /// Look up a navigation, failing with `UnknownNavigation`.
    pub fn require_navigation(&self, name: &str) -> Result<&NavigationInfo> {
        self.get_navigation(name).ok_or_else(|| {
            Error::compilation(
                CompilationErrorKind::UnknownNavigation,
                self.name,
                format!("Unknown navigation {name}"),
            )
        })
    }

    fn single_primary_key(&self) -> Option<&FieldInfo> {
        let mut keys = self.primary_key();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }
}

/// The set of registered models.
#[derive(Debug)]
pub struct Registry {
    models: Vec<Arc<ModelInfo>>,
    by_name: HashMap<&'static str, usize>,
    validators: Validators,
}

impl Registry {
    /// Start declaring models.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Result<&Arc<ModelInfo>> {
        self.by_name
            .get(name)
            .map(|&i| &self.models[i])
            .ok_or_else(|| {
                Error::compilation(
                    CompilationErrorKind::UnknownModel,
                    name,
                    format!("Model {name} is not registered"),
                )
            })
    }

    /// All models in registration order.
    pub fn models(&self) -> &[Arc<ModelInfo>] {
        &self.models
    }

    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    /// A new, empty instance of the named model.
    pub fn new_instance(&self, name: &str) -> Result<ModelInstance> {
        Ok(ModelInstance::new(Arc::clone(self.model(name)?)))
    }

    /// Single-valued navigations, on any model, whose target is `target`.
    pub fn dependents<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a Arc<ModelInfo>, &'a NavigationInfo)> + 'a {
        self.models.iter().flat_map(move |model| {
            model
                .navigations
                .iter()
                .filter(move |n| n.kind == NavigationKind::Single && n.target == target)
                .map(move |n| (model, n))
        })
    }
}

/// Collects model declarations and validates them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: Vec<ModelInfo>,
    validators: Option<Validators>,
}

impl RegistryBuilder {
    pub fn model(mut self, model: ModelInfo) -> Self {
        self.models.push(model);
        self
    }

    /// Use a specific validator set (for example one anchored at a fixed date).
    pub fn validators(mut self, validators: Validators) -> Self {
        self.validators = Some(validators);
        self
    }

    /// Validate every declaration and resolve navigations.
    pub fn build(self) -> Result<Registry> {
        let mut validators = self.validators.unwrap_or_default();
        let mut models = self.models;
        let mut by_name = HashMap::new();

        for (index, model) in models.iter_mut().enumerate() {
            if by_name.insert(model.name, index).is_some() {
                return Err(invalid_model(model.name, "Model is registered twice"));
            }

            let mut seen = HashSet::new();
            for field in &model.fields {
                if !seen.insert(field.name) {
                    return Err(invalid_model(
                        model.name,
                        &format!("Duplicate field {}", field.name),
                    ));
                }
                validators.register(field).map_err(|e| {
                    invalid_model(
                        model.name,
                        &format!("Invalid pattern for field {}: {e}", field.name),
                    )
                })?;
            }

            let keys: Vec<usize> = model
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.primary_key)
                .map(|(i, _)| i)
                .collect();
            match keys.as_slice() {
                [] => return Err(invalid_model(model.name, "Model has no primary key")),
                [single] => model.fields[*single].unique = true,
                _ => {}
            }
        }

        let mut resolved = Vec::with_capacity(models.len());
        for model in &models {
            let mut navigations = Vec::with_capacity(model.declared.len());
            for def in &model.declared {
                navigations.push(resolve_navigation(model, def, &models, &by_name)?);
            }
            resolved.push(navigations);
        }

        let models = models
            .into_iter()
            .zip(resolved)
            .map(|(mut model, navigations)| {
                model.navigations = navigations;
                tracing::trace!(
                    model = model.name,
                    fields = model.fields.len(),
                    navigations = model.navigations.len(),
                    "registered model"
                );
                Arc::new(model)
            })
            .collect::<Vec<_>>();

        tracing::debug!(models = models.len(), "registry built");
        Ok(Registry {
            models,
            by_name,
            validators,
        })
    }
}

fn invalid_model(model: &str, message: &str) -> Error {
    Error::compilation(CompilationErrorKind::InvalidModel, model, message)
}

fn invalid_navigation(model: &str, nav: &str, message: &str) -> Error {
    Error::compilation(
        CompilationErrorKind::InvalidNavigation,
        model,
        format!("Navigation {nav}: {message}"),
    )
}

fn resolve_navigation(
    model: &ModelInfo,
    def: &NavigationDef,
    models: &[ModelInfo],
    by_name: &HashMap<&'static str, usize>,
) -> Result<NavigationInfo> {
    let target = by_name.get(def.target).map(|&i| &models[i]).ok_or_else(|| {
        Error::compilation(
            CompilationErrorKind::UnknownModel,
            model.name,
            format!("Navigation {} targets unknown model {}", def.name, def.target),
        )
    })?;

    let field = match def.field {
        Some(name) => model.require_field(name)?.name,
        None => model
            .single_primary_key()
            .ok_or_else(|| {
                invalid_navigation(model.name, def.name, "owner has a composite primary key")
            })?
            .name,
    };

    let target_field = match def.target_field {
        Some(name) => target
            .get_field(name)
            .ok_or_else(|| {
                Error::compilation(
                    CompilationErrorKind::UnknownField,
                    target.name,
                    format!("Unknown field {name}"),
                )
            })?
            .name,
        None => target
            .single_primary_key()
            .ok_or_else(|| {
                invalid_navigation(model.name, def.name, "target has a composite primary key")
            })?
            .name,
    };

    // the "one" side of the relationship must identify a single row
    let one_side = match def.kind {
        NavigationKind::Single => target.get_field(target_field),
        NavigationKind::Collection => model.get_field(field),
    };
    if !one_side.is_some_and(|f| f.unique) {
        return Err(invalid_navigation(
            model.name,
            def.name,
            "referenced field is not unique",
        ));
    }

    Ok(NavigationInfo {
        name: def.name,
        kind: def.kind,
        field,
        target: target.name,
        target_field,
        on_delete: def.on_delete,
    })
}
