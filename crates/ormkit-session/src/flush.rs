//! Flush planning for `save_changes`.
//!
//! A [`FlushPlan`] holds one UPDATE per changed model, each targeting the
//! row by the primary key the model had before its pending mutations. The
//! whole plan executes as a single transaction; only once it committed does
//! [`FlushPlan::apply`] move the new values into the baselines.

use ormkit_core::error::ConsistencyErrorKind;
use ormkit_core::{
    Dialect, Error, ModelRef, Result, SessionId, Statement, ValidationError, Validators, Value,
};
use ormkit_query::{Assignment, UpdateBuilder, key_condition};

use crate::identity_map::ModelCache;

/// A model included in a flush, with the key its row is stored under.
#[derive(Debug)]
struct PendingUpdate {
    model: ModelRef,
    persisted_key: Vec<Value>,
}

/// Statements for one `save_changes` call.
#[derive(Debug, Default)]
pub struct FlushPlan {
    statements: Vec<Statement>,
    pending: Vec<PendingUpdate>,
}

impl FlushPlan {
    /// Plan an UPDATE for every candidate.
    ///
    /// Fails without side effects if a candidate is owned by another session,
    /// has no changes, or carries an invalid value.
    #[tracing::instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
    pub fn build(
        session: SessionId,
        validators: &Validators,
        dialect: Dialect,
        candidates: &[ModelRef],
    ) -> Result<Self> {
        let mut plan = FlushPlan::default();

        for model in candidates {
            let instance = model.borrow();
            if instance.owner() != Some(session) {
                return Err(Error::consistency(
                    ConsistencyErrorKind::ForeignModel,
                    "Model not managed by this session.",
                ));
            }

            let changes = instance.changes();
            if changes.is_empty() {
                return Err(Error::consistency(
                    ConsistencyErrorKind::NoChanges,
                    "No changes to save.",
                ));
            }

            let info = instance.info();
            let mut errors = ValidationError::new();
            let mut builder = UpdateBuilder::new(info.table());
            for (name, value) in changes {
                let field = info.require_field(name)?;
                if let Err(e) = validators.check(field, &value) {
                    errors.errors.push(e);
                }
                builder = builder.set(Assignment::new(name, value, field.is_enum()));
            }
            errors.into_result()?;

            let persisted_key = instance.persisted_key();
            let condition = key_condition(info, validators, &persisted_key)?;
            let statement = builder.filter(condition).build(dialect)?.finish(dialect)?;
            tracing::trace!(model = info.name, sql = %statement.sql, "planned update");

            plan.statements.push(statement);
            plan.pending.push(PendingUpdate {
                model: ModelRef::clone(model),
                persisted_key,
            });
        }

        Ok(plan)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Commit every planned model and move re-keyed ones in the cache.
    /// Call only after the plan's transaction succeeded.
    pub fn apply(self, cache: &mut ModelCache) -> Result<()> {
        for pending in self.pending {
            pending.model.borrow_mut().commit();
            cache.rekey(&pending.model, &pending.persisted_key)?;
        }
        Ok(())
    }
}
