//! Sessions for ormkit.
//!
//! `ormkit-session` is the **unit-of-work layer**. A [`Session`] compiles
//! predicates, runs fetches and writes through a [`Backend`], and keeps every
//! instance it hands out consistent through its [`ModelCache`].
//!
//! # Role In The Architecture
//!
//! - **Identity map**: at most one in-memory instance per primary key.
//! - **Change tracking**: field mutations are collected by `save_changes`.
//! - **Transactional safety**: every write is one all-or-nothing transaction.
//!
//! # Design Philosophy
//!
//! - **Explicit over implicit**: nothing is written until `insert`, `save`,
//!   `delete` or `save_changes` is called.
//! - **Single owner**: a session and its instances are `!Send`; each session
//!   keeps its own cache and tracker.
//! - **Short connections**: a connection is opened for one statement or
//!   transaction and dropped right after.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(&registry, backend);
//!
//! let john = session.get("User", &col("ID").eq("AAAAAAAAAA"))?;
//! john.borrow_mut().set("Name", "Johnny")?;
//! session.save_changes()?;
//!
//! let users = session.include("User", "IpAddresses")?.get_many(&col("Rank").eq("Admin"))?;
//! ```

pub mod change_tracker;
pub mod flush;
pub mod identity_map;

pub use change_tracker::ChangeTracker;
pub use flush::FlushPlan;
pub use identity_map::{ModelCache, cache_key};

use std::sync::Arc;

use ormkit_core::error::{ConsistencyErrorKind, MultipleRowsError, NotFoundError};
use ormkit_core::{
    Backend, Connection, Error, ModelInfo, ModelInstance, ModelRef, Registry, Result, Row,
    SessionId, Statement, ValidationError, Value,
};
use ormkit_query::{
    Assignment, Condition, DeleteBuilder, FetchPlan, IncludeSet, InsertBuilder, Operator, OrderBy,
    OrderDirection, Predicate, UpdateBuilder, compile,
};

/// Configuration for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Whether point lookups are answered from the model cache.
    pub use_cache: bool,
    /// Whether full SQL text and parameters are logged at debug level.
    pub log_statements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            log_statements: false,
        }
    }
}

/// One unit of work over a [`Backend`].
pub struct Session<'r, B: Backend> {
    id: SessionId,
    registry: &'r Registry,
    backend: B,
    config: SessionConfig,
    cache: ModelCache,
    tracker: ChangeTracker,
}

impl<'r, B: Backend> Session<'r, B> {
    /// Create a new session with the default configuration.
    pub fn new(registry: &'r Registry, backend: B) -> Self {
        Self::with_config(registry, backend, SessionConfig::default())
    }

    /// Create a new session with custom configuration.
    pub fn with_config(registry: &'r Registry, backend: B, config: SessionConfig) -> Self {
        let id = SessionId::next();
        tracing::debug!(session = ?id, dialect = ?backend.dialect(), "session opened");
        Self {
            id,
            registry,
            backend,
            config,
            cache: ModelCache::new(),
            tracker: ChangeTracker::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// A new, empty instance of a registered model.
    pub fn new_model(&self, model: &str) -> Result<ModelInstance> {
        self.registry.new_instance(model)
    }

    // ==================== Reads ====================

    /// Start a fetch of `model`.
    pub fn fetch(&mut self, model: &str) -> Result<Fetch<'_, 'r, B>> {
        let model = Arc::clone(self.registry.model(model)?);
        Ok(Fetch {
            session: self,
            model,
            includes: IncludeSet::new(),
            order_by: Vec::new(),
            limit: 0,
            offset: 0,
        })
    }

    /// Start a fetch of `model` that eagerly loads `navigation`.
    pub fn include(&mut self, model: &str, navigation: &str) -> Result<Fetch<'_, 'r, B>> {
        self.fetch(model)?.include(navigation)
    }

    /// The first instance matching `predicate`; fails with NotFound.
    pub fn get(&mut self, model: &str, predicate: &Predicate) -> Result<ModelRef> {
        self.fetch(model)?.get(predicate)
    }

    pub fn get_or_null(&mut self, model: &str, predicate: &Predicate) -> Result<Option<ModelRef>> {
        self.fetch(model)?.get_or_null(predicate)
    }

    pub fn get_many(&mut self, model: &str, predicate: &Predicate) -> Result<Vec<ModelRef>> {
        self.fetch(model)?.get_many(predicate)
    }

    /// The only instance matching `predicate`.
    pub fn single(&mut self, model: &str, predicate: &Predicate) -> Result<ModelRef> {
        self.fetch(model)?.single(predicate)
    }

    pub fn count(&mut self, model: &str, predicate: &Predicate) -> Result<u64> {
        self.fetch(model)?.count(predicate)
    }

    // ==================== Writes ====================

    /// Insert a new instance and return the session's handle to it.
    ///
    /// Every field is validated first; all required-but-unset fields are
    /// reported in one error and nothing is written.
    #[tracing::instrument(level = "debug", skip(self, instance), fields(model = instance.model_name()))]
    pub fn insert(&mut self, mut instance: ModelInstance) -> Result<ModelRef> {
        if instance.owner().is_some_and(|owner| owner != self.id) {
            return Err(foreign_model());
        }
        let info = Arc::clone(instance.info());
        let validators = self.registry.validators();

        let mut errors = ValidationError::new();
        for field in info.fields() {
            if !instance.is_set(field.name) {
                if field.required {
                    errors.add_required(field.name);
                }
                continue;
            }
            if let Some(value) = instance.get(field.name) {
                if let Err(e) = validators.check(field, value) {
                    errors.errors.push(e);
                }
            }
        }
        errors.into_result()?;

        let mut builder = InsertBuilder::new(info.table());
        for (name, value) in instance.set_values() {
            if value.is_null() {
                continue;
            }
            let is_enum = info.get_field(name).is_some_and(|f| f.is_enum());
            builder = builder.value(Assignment::new(name, value, is_enum));
        }
        let dialect = self.backend.dialect();
        let statement = builder.build(dialect)?.finish(dialect)?;
        self.transaction(std::slice::from_ref(&statement))?;

        instance.commit();
        instance.set_owner(self.id);
        let model = instance.into_ref();
        if self.config.use_cache {
            self.cache.register(&model)?;
        }
        self.tracker.track(&model);
        tracing::debug!("inserted");
        Ok(model)
    }

    /// Start a predicate-scoped bulk update.
    pub fn update(&mut self, model: &str, predicate: &Predicate) -> Result<UpdateRequest<'_, 'r, B>> {
        let (info, condition) = self.compile(model, predicate)?;
        Ok(UpdateRequest {
            session: self,
            info,
            condition,
            assignments: Vec::new(),
        })
    }

    /// Delete every row matching `predicate` and drop matching instances
    /// (and their cascades) from the cache.
    #[tracing::instrument(level = "debug", skip(self, predicate))]
    pub fn delete(&mut self, model: &str, predicate: &Predicate) -> Result<u64> {
        let (info, condition) = self.compile(model, predicate)?;
        let dialect = self.backend.dialect();
        let statement = DeleteBuilder::new(info.table())
            .filter(condition.clone())
            .build(dialect)?
            .finish(dialect)?;
        let affected = self.transaction(std::slice::from_ref(&statement))?;

        if self.config.use_cache {
            let removed = self
                .cache
                .reconcile_delete(self.registry, info.name, &condition)?;
            self.tracker.forget(&removed);
        }
        Ok(affected)
    }

    /// Queue an instance for the next [`save_changes`](Self::save_changes).
    pub fn enqueue(&mut self, model: &ModelRef) {
        self.tracker.enqueue(model);
    }

    /// Write every pending field mutation in one transaction.
    ///
    /// On failure no instance changes: dirty fields stay dirty and key
    /// snapshots are kept, so the call can be retried.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn save_changes(&mut self) -> Result<u64> {
        let candidates = self.tracker.candidates();
        if candidates.is_empty() {
            tracing::debug!("nothing to save");
            return Ok(0);
        }

        let plan = FlushPlan::build(
            self.id,
            self.registry.validators(),
            self.backend.dialect(),
            &candidates,
        )?;
        let affected = self.transaction(plan.statements())?;
        plan.apply(&mut self.cache)?;
        self.tracker.clear_queue();
        tracing::debug!(models = candidates.len(), affected, "changes saved");
        Ok(affected)
    }

    // ==================== Internals ====================

    fn compile(&self, model: &str, predicate: &Predicate) -> Result<(Arc<ModelInfo>, Condition)> {
        let info = Arc::clone(self.registry.model(model)?);
        let condition = compile(&info, self.registry.validators(), predicate)?;
        Ok((info, condition))
    }

    /// Cache probe for a point lookup: the unique-field index for a single
    /// equality, then a scan.
    fn probe(&self, model: &str, condition: &Condition) -> Option<ModelRef> {
        if let Condition::Comparison {
            field,
            op: Operator::Eq,
            value,
            ..
        } = condition
        {
            if let Some(found) = self.cache.find_unique(model, field, value) {
                return Some(found);
            }
        }
        self.cache.find_one(model, condition)
    }

    /// Map a hydrated instance onto the session's instance for its key.
    ///
    /// A cached instance is refreshed with the row's values unless it has
    /// pending changes, and returned in place of the new one.
    fn resolve(&mut self, mut instance: ModelInstance) -> Result<ModelRef> {
        if self.config.use_cache {
            let key = instance.primary_key();
            if let Some(existing) = self.cache.get(instance.model_name(), &key)? {
                let refreshed = {
                    let mut cached = existing.borrow_mut();
                    let clean = !cached.is_dirty();
                    if clean {
                        for (name, value) in instance.set_values() {
                            cached.load(name, value)?;
                        }
                    }
                    clean
                };
                if refreshed {
                    self.cache.rekey(&existing, &key)?;
                }
                tracing::trace!(model = instance.model_name(), refreshed, "resolved to cached instance");
                return Ok(existing);
            }
        }

        instance.set_owner(self.id);
        let model = instance.into_ref();
        if self.config.use_cache {
            self.cache.register(&model)?;
        }
        self.tracker.track(&model);
        Ok(model)
    }

    fn log(&self, statement: &Statement) {
        if self.config.log_statements {
            tracing::debug!(sql = %statement.sql, params = ?statement.params, "executing");
        } else {
            tracing::debug!(params = statement.params.len(), "executing statement");
        }
    }

    fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        self.log(statement);
        let mut conn = self.backend.connect()?;
        let rows = conn.query(statement)?;
        tracing::debug!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    fn transaction(&self, statements: &[Statement]) -> Result<u64> {
        for statement in statements {
            self.log(statement);
        }
        let mut conn = self.backend.connect()?;
        conn.execute_in_transaction(statements).inspect_err(|e| {
            tracing::warn!(statements = statements.len(), error = %e, "transaction failed");
        })
    }
}

impl<B: Backend> std::fmt::Debug for Session<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("tracked", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

fn foreign_model() -> Error {
    Error::consistency(
        ConsistencyErrorKind::ForeignModel,
        "Model not managed by this session.",
    )
}

/// A configured fetch: includes, ordering and paging, then one terminal call.
pub struct Fetch<'s, 'r, B: Backend> {
    session: &'s mut Session<'r, B>,
    model: Arc<ModelInfo>,
    includes: IncludeSet,
    order_by: Vec<OrderBy>,
    limit: u64,
    offset: u64,
}

impl<'s, 'r, B: Backend> Fetch<'s, 'r, B> {
    /// Eagerly load a navigation.
    pub fn include(mut self, navigation: &str) -> Result<Self> {
        self.includes.include(&self.model, navigation)?;
        Ok(self)
    }

    /// Sort by a field of the fetched model.
    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Result<Self> {
        let field = self.model.require_field(field)?;
        self.order_by
            .push(OrderBy::new(self.model.table(), field.name, direction));
        Ok(self)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// The first match; fails with NotFound when there is none.
    pub fn get(self, predicate: &Predicate) -> Result<ModelRef> {
        let model = self.model.name;
        self.get_or_null(predicate)?.ok_or_else(|| {
            Error::NotFound(NotFoundError {
                model: model.to_string(),
                sql: None,
            })
        })
    }

    /// The first match, answered from the cache when no navigation is
    /// included.
    #[tracing::instrument(level = "debug", skip_all, fields(model = self.model.name))]
    pub fn get_or_null(self, predicate: &Predicate) -> Result<Option<ModelRef>> {
        let condition = compile(&self.model, self.session.registry.validators(), predicate)?;
        if self.includes.is_empty() && self.session.config.use_cache {
            if let Some(found) = self.session.probe(self.model.name, &condition) {
                tracing::debug!("cache hit");
                return Ok(Some(found));
            }
            tracing::debug!("cache miss");
        }
        Ok(self.run(Some(condition), 1)?.into_iter().next())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = self.model.name))]
    pub fn get_many(self, predicate: &Predicate) -> Result<Vec<ModelRef>> {
        let condition = compile(&self.model, self.session.registry.validators(), predicate)?;
        let limit = self.limit;
        self.run(Some(condition), limit)
    }

    /// Every row of the model.
    pub fn all(self) -> Result<Vec<ModelRef>> {
        let limit = self.limit;
        self.run(None, limit)
    }

    /// The only match; fails with NotFound or MultipleRows.
    #[tracing::instrument(level = "debug", skip_all, fields(model = self.model.name))]
    pub fn single(self, predicate: &Predicate) -> Result<ModelRef> {
        let condition = compile(&self.model, self.session.registry.validators(), predicate)?;
        let model = self.model.name;
        let mut found = self.run(Some(condition), 0)?;
        match found.len() {
            0 => Err(Error::NotFound(NotFoundError {
                model: model.to_string(),
                sql: None,
            })),
            1 => Ok(found.remove(0)),
            count => Err(Error::MultipleRows(MultipleRowsError {
                model: model.to_string(),
                count,
            })),
        }
    }

    /// Number of matching rows; includes are ignored.
    #[tracing::instrument(level = "debug", skip_all, fields(model = self.model.name))]
    pub fn count(self, predicate: &Predicate) -> Result<u64> {
        let registry = self.session.registry;
        let condition = compile(&self.model, registry.validators(), predicate)?;
        let dialect = self.session.backend.dialect();
        let plan = FetchPlan::new(registry, &self.model, &IncludeSet::new())?;
        let statement = plan
            .count()
            .filter(Some(condition))
            .build(dialect)?
            .finish(dialect)?;
        let rows = self.session.query(&statement)?;
        match rows.first() {
            Some(row) => row.get_as::<u64>(0),
            None => Ok(0),
        }
    }

    fn run(self, condition: Option<Condition>, limit: u64) -> Result<Vec<ModelRef>> {
        let registry = self.session.registry;
        let dialect = self.session.backend.dialect();
        let plan = FetchPlan::new(registry, &self.model, &self.includes)?;

        let mut query = plan
            .select(dialect)
            .filter(condition)
            .limit(limit)
            .offset(self.offset);
        for order in self.order_by {
            query = query.order_by(order);
        }
        let statement = query.build(dialect)?.finish(dialect)?;
        let rows = self.session.query(&statement)?;

        let session = self.session;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(plan.hydrate(row, &mut |instance| session.resolve(instance))?);
        }
        tracing::debug!(hydrated = out.len(), includes = self.includes.len(), "fetched");
        Ok(out)
    }
}

impl<B: Backend> std::fmt::Debug for Fetch<'_, '_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch")
            .field("model", &self.model.name)
            .field("includes", &self.includes.len())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// A predicate-scoped bulk update being assembled.
pub struct UpdateRequest<'s, 'r, B: Backend> {
    session: &'s mut Session<'r, B>,
    info: Arc<ModelInfo>,
    condition: Condition,
    assignments: Vec<Assignment>,
}

impl<B: Backend> UpdateRequest<'_, '_, B> {
    /// Assign a field; each field may be assigned once.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let field = self.info.require_field(field)?;
        if self.assignments.iter().any(|a| a.column == field.name) {
            return Err(Error::consistency(
                ConsistencyErrorKind::DuplicateAssignment,
                format!("Field {} is set twice.", field.name),
            ));
        }
        let value = field.coerce(value.into())?;
        self.session.registry.validators().check(field, &value)?;
        self.assignments
            .push(Assignment::new(field.name, value, field.is_enum()));
        Ok(self)
    }

    /// Execute the update in its own transaction and replay it onto the
    /// cache. Returns the number of affected rows.
    #[tracing::instrument(level = "debug", skip_all, fields(model = self.info.name))]
    pub fn save(self) -> Result<u64> {
        if self.assignments.is_empty() {
            return Err(Error::consistency(
                ConsistencyErrorKind::NoAssignments,
                "No fields have been set for update.",
            ));
        }
        let dialect = self.session.backend.dialect();
        let mut builder = UpdateBuilder::new(self.info.table());
        for assignment in &self.assignments {
            builder = builder.set(assignment.clone());
        }
        let statement = builder
            .filter(self.condition.clone())
            .build(dialect)?
            .finish(dialect)?;
        let affected = self
            .session
            .transaction(std::slice::from_ref(&statement))?;

        if self.session.config.use_cache {
            let changes: Vec<(&'static str, Value)> = self
                .assignments
                .into_iter()
                .map(|a| (a.column, a.value))
                .collect();
            self.session
                .cache
                .reconcile_update(self.info.name, &self.condition, &changes)?;
        }
        Ok(affected)
    }
}

impl<B: Backend> std::fmt::Debug for UpdateRequest<'_, '_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<&str> = self.assignments.iter().map(|a| a.column).collect();
        f.debug_struct("UpdateRequest")
            .field("model", &self.info.name)
            .field("columns", &columns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::value::parse_date;
    use ormkit_core::{
        CodeClassifier, DatabaseCode, Dialect, FieldInfo, NavigationDef, ValidationErrorKind,
        Validators,
    };
    use ormkit_query::col;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct MockState {
        queries: Vec<Statement>,
        transactions: Vec<Vec<Statement>>,
        results: VecDeque<Vec<Row>>,
        fail_next: bool,
    }

    #[derive(Debug, Clone)]
    struct MockBackend {
        state: Rc<RefCell<MockState>>,
        classifier: CodeClassifier,
    }

    struct MockConnection {
        state: Rc<RefCell<MockState>>,
        classifier: CodeClassifier,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                state: Rc::new(RefCell::new(MockState::default())),
                classifier: CodeClassifier::postgres(),
            }
        }

        fn push_rows(&self, rows: Vec<Row>) {
            self.state.borrow_mut().results.push_back(rows);
        }
    }

    impl Backend for MockBackend {
        type Conn = MockConnection;

        fn connect(&self) -> Result<MockConnection> {
            Ok(MockConnection {
                state: Rc::clone(&self.state),
                classifier: self.classifier.clone(),
            })
        }

        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn classifier(&self) -> &CodeClassifier {
            &self.classifier
        }
    }

    impl Connection for MockConnection {
        fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
            let mut state = self.state.borrow_mut();
            state.queries.push(statement.clone());
            Ok(state.results.pop_front().unwrap_or_default())
        }

        fn execute_in_transaction(&mut self, statements: &[Statement]) -> Result<u64> {
            let mut state = self.state.borrow_mut();
            state.transactions.push(statements.to_vec());
            if std::mem::take(&mut state.fail_next) {
                return Err(self.classifier.error(
                    Some("23505".to_string()),
                    "duplicate key value",
                    None,
                ));
            }
            Ok(statements.len() as u64)
        }
    }

    fn registry() -> Registry {
        Registry::builder()
            .validators(Validators::anchored_at(parse_date("2022-10-12").unwrap()))
            .model(
                ModelInfo::new("User")
                    .field(FieldInfo::id("ID").primary_key())
                    .field(FieldInfo::name("Name"))
                    .field(FieldInfo::enumeration("Rank", "UserRank", &["User", "Admin"]))
                    .navigation(NavigationDef::from_primary("IpAddresses", "IpAddress", "UserID")),
            )
            .model(
                ModelInfo::new("IpAddress")
                    .field(FieldInfo::id("ID").primary_key())
                    .field(FieldInfo::id("UserID"))
                    .navigation(NavigationDef::to_primary("User", "UserID", "User")),
            )
            .build()
            .unwrap()
    }

    fn user_row(id: &str, name: &str, rank: &str) -> Row {
        Row::new(
            vec!["User.ID".into(), "User.Name".into(), "User.Rank".into()],
            vec![Value::from(id), Value::from(name), Value::from(rank)],
        )
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.use_cache);
        assert!(!config.log_statements);
    }

    #[test]
    fn test_get_queries_then_serves_from_cache() {
        let reg = registry();
        let backend = MockBackend::new();
        backend.push_rows(vec![user_row("AAAAAAAAAA", "John", "User")]);
        let mut session = Session::new(&reg, backend.clone());

        let first = session.get("User", &col("ID").eq("AAAAAAAAAA")).unwrap();
        let second = session.get("User", &col("ID").eq("AAAAAAAAAA")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let state = backend.state.borrow();
        assert_eq!(state.queries.len(), 1);
        assert_eq!(
            state.queries[0].sql,
            "SELECT \"User\".\"ID\" as \"User.ID\", \"User\".\"Name\" as \"User.Name\", \
             \"User\".\"Rank\"::text as \"User.Rank\" FROM \"User\" \
             WHERE \"User\".\"ID\" = 'AAAAAAAAAA' LIMIT 1"
        );
    }

    #[test]
    fn test_get_not_found() {
        let reg = registry();
        let mut session = Session::new(&reg, MockBackend::new());
        let err = session.get("User", &col("Name").eq("Nobody")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Model User not found");
    }

    #[test]
    fn test_includes_bypass_cache() {
        let reg = registry();
        let backend = MockBackend::new();
        backend.push_rows(vec![user_row("AAAAAAAAAA", "John", "User")]);
        let mut session = Session::new(&reg, backend.clone());
        session.get("User", &col("ID").eq("AAAAAAAAAA")).unwrap();

        backend.push_rows(vec![Row::new(
            vec![
                "User.ID".into(),
                "User.Name".into(),
                "User.Rank".into(),
                "User.IpAddresses".into(),
            ],
            vec![
                Value::from("AAAAAAAAAA"),
                Value::from("John"),
                Value::from("User"),
                Value::Null,
            ],
        )]);
        let john = session
            .include("User", "IpAddresses")
            .unwrap()
            .get(&col("ID").eq("AAAAAAAAAA"))
            .unwrap();
        assert!(john.borrow().is_loaded("IpAddresses"));
        assert_eq!(backend.state.borrow().queries.len(), 2);
    }

    #[test]
    fn test_single_reports_multiple_rows() {
        let reg = registry();
        let backend = MockBackend::new();
        backend.push_rows(vec![
            user_row("BBBBBBBBBB", "Alice", "Admin"),
            user_row("CCCCCCCCCC", "Bob", "Admin"),
        ]);
        let mut session = Session::new(&reg, backend);
        let err = session.single("User", &col("Rank").eq("Admin")).unwrap_err();
        assert!(matches!(err, Error::MultipleRows(ref e) if e.count == 2));
    }

    #[test]
    fn test_rehydration_refreshes_clean_instance_only() {
        let reg = registry();
        let backend = MockBackend::new();
        let mut session = Session::new(&reg, backend.clone());

        backend.push_rows(vec![user_row("AAAAAAAAAA", "John", "User")]);
        let john = session.get_many("User", &col("Rank").eq("User")).unwrap().remove(0);

        backend.push_rows(vec![user_row("AAAAAAAAAA", "Johnny", "User")]);
        session.get_many("User", &col("Rank").eq("User")).unwrap();
        assert_eq!(john.borrow().get("Name"), Some(&Value::from("Johnny")));

        john.borrow_mut().set("Name", "Local").unwrap();
        backend.push_rows(vec![user_row("AAAAAAAAAA", "Remote", "User")]);
        let again = session.get_many("User", &col("Rank").eq("User")).unwrap();
        assert!(Rc::ptr_eq(&again[0], &john));
        assert_eq!(john.borrow().get("Name"), Some(&Value::from("Local")));
    }

    #[test]
    fn test_insert_missing_required_field_writes_nothing() {
        let reg = registry();
        let backend = MockBackend::new();
        let mut session = Session::new(&reg, backend.clone());
        let mut user = session.new_model("User").unwrap();
        user.set("ID", "DDDDDDDDDD").unwrap();
        user.set("Rank", "User").unwrap();

        let err = session.insert(user).unwrap_err();
        match err {
            Error::Validation(v) => {
                assert_eq!(v.errors.len(), 1);
                assert_eq!(v.errors[0].field, "Name");
                assert_eq!(v.errors[0].kind, ValidationErrorKind::Required);
            }
            other => panic!("unexpected {other}"),
        }
        assert!(backend.state.borrow().transactions.is_empty());
    }

    #[test]
    fn test_insert_registers_in_cache() {
        let reg = registry();
        let backend = MockBackend::new();
        let mut session = Session::new(&reg, backend.clone());
        let mut user = session.new_model("User").unwrap();
        user.set("ID", "DDDDDDDDDD").unwrap();
        user.set("Name", "Dave").unwrap();
        user.set("Rank", "Admin").unwrap();

        let dave = session.insert(user).unwrap();
        assert_eq!(dave.borrow().owner(), Some(session.id()));
        assert_eq!(
            backend.state.borrow().transactions[0][0].sql,
            "INSERT INTO \"User\" (\"ID\", \"Name\", \"Rank\") VALUES ($1, $2, 'Admin'::\"User_Rank\")"
        );
        let found = session.get("User", &col("Name").eq("Dave")).unwrap();
        assert!(Rc::ptr_eq(&found, &dave));
        assert!(backend.state.borrow().queries.is_empty());
    }

    #[test]
    fn test_update_request_guards() {
        let reg = registry();
        let mut session = Session::new(&reg, MockBackend::new());
        let err = session
            .update("User", &col("Rank").eq("User"))
            .unwrap()
            .set("Name", "Fred")
            .unwrap()
            .set("Name", "George")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ref e) if e.kind == ConsistencyErrorKind::DuplicateAssignment
        ));

        let err = session
            .update("User", &col("Rank").eq("User"))
            .unwrap()
            .save()
            .unwrap_err();
        assert_eq!(err.to_string(), "No fields have been set for update.");

        let request = session
            .update("User", &col("Rank").eq("User"))
            .unwrap()
            .set("Name", "Fred")
            .unwrap();
        assert_eq!(
            format!("{request:?}"),
            "UpdateRequest { model: \"User\", columns: [\"Name\"], .. }"
        );
    }

    #[test]
    fn test_save_changes_failure_keeps_models_dirty() {
        let reg = registry();
        let backend = MockBackend::new();
        backend.push_rows(vec![
            user_row("BBBBBBBBBB", "Alice", "Admin"),
            user_row("CCCCCCCCCC", "Bob", "Admin"),
        ]);
        let mut session = Session::new(&reg, backend.clone());
        let admins = session.get_many("User", &col("Rank").eq("Admin")).unwrap();
        for admin in &admins {
            admin.borrow_mut().set("Rank", "User").unwrap();
        }

        backend.state.borrow_mut().fail_next = true;
        let err = session.save_changes().unwrap_err();
        assert_eq!(err.database_code(), Some(DatabaseCode::DuplicateEntry));
        assert!(admins.iter().all(|a| a.borrow().is_dirty()));

        assert_eq!(session.save_changes().unwrap(), 2);
        let state = backend.state.borrow();
        assert_eq!(state.transactions.len(), 2);
        assert_eq!(state.transactions[1].len(), 2);
        assert!(admins.iter().all(|a| !a.borrow().is_dirty()));
    }

    #[test]
    fn test_save_changes_without_candidates_is_noop() {
        let reg = registry();
        let backend = MockBackend::new();
        let mut session = Session::new(&reg, backend.clone());
        assert_eq!(session.save_changes().unwrap(), 0);
        assert!(backend.state.borrow().transactions.is_empty());
    }

    #[test]
    fn test_enqueue_foreign_model() {
        let reg = registry();
        let mut session = Session::new(&reg, MockBackend::new());
        let stranger = reg.new_instance("User").unwrap().into_ref();
        session.enqueue(&stranger);
        let err = session.save_changes().unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ref e) if e.kind == ConsistencyErrorKind::ForeignModel
        ));
    }
}
