//! Eager loading of navigations.
//!
//! A [`FetchPlan`] turns the navigations requested with an [`IncludeSet`]
//! into one SELECT: single-valued navigations become LEFT JOINs with flat,
//! aliased columns, collections become LEFT JOINs folded into one JSON
//! document per parent row. [`FetchPlan::hydrate`] reverses the mapping.

use std::collections::HashSet;
use std::sync::Arc;

use ormkit_core::error::{CompilationErrorKind, TypeError};
use ormkit_core::{
    Dialect, Error, FieldInfo, JsonColumn, ModelInfo, ModelInstance, ModelRef, NavigationInfo,
    Registry, Result, Row, Value,
};

use crate::join::Join;
use crate::select::{Projection, SelectItem, SelectQuery};

/// Navigations requested for one fetch, in request order.
#[derive(Debug, Clone, Default)]
pub struct IncludeSet {
    navigations: Vec<NavigationInfo>,
}

impl IncludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request navigation `name` of `model`.
    ///
    /// Fails with `UnknownNavigation` when the model does not declare it and
    /// with `DuplicateInclude` when it was already requested.
    pub fn include(&mut self, model: &ModelInfo, name: &str) -> Result<()> {
        let navigation = model.require_navigation(name)?;
        if self.navigations.iter().any(|n| n.name == navigation.name) {
            return Err(Error::compilation(
                CompilationErrorKind::DuplicateInclude,
                model.name,
                format!("Navigation {name} is included twice"),
            ));
        }
        self.navigations.push(navigation.clone());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.navigations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.navigations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NavigationInfo> {
        self.navigations.iter()
    }
}

/// One joined navigation target.
#[derive(Debug, Clone)]
struct Joined {
    navigation: NavigationInfo,
    target: Arc<ModelInfo>,
    /// Name the target table is referenced by in this query
    alias: String,
}

impl Joined {
    fn join(&self, root: &ModelInfo) -> Join {
        let join = Join::left(
            self.target.table(),
            root.table(),
            self.navigation.field,
            self.navigation.target_field,
        );
        if self.alias == self.target.table() {
            join
        } else {
            join.alias(self.alias.as_str())
        }
    }

    fn label(&self, field: &FieldInfo) -> String {
        format!("{}.{}", self.alias, field.name)
    }
}

/// How one fetch of a model and its included navigations maps onto SQL.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    root: Arc<ModelInfo>,
    singles: Vec<Joined>,
    collections: Vec<Joined>,
}

impl FetchPlan {
    /// Resolve every included navigation's target and choose table aliases.
    ///
    /// A target whose table is already part of the query (the root's, or one
    /// joined earlier) is aliased by the navigation name.
    pub fn new(registry: &Registry, root: &Arc<ModelInfo>, includes: &IncludeSet) -> Result<Self> {
        let mut used: HashSet<String> = HashSet::new();
        used.insert(root.table().to_string());

        let mut singles = Vec::new();
        let mut collections = Vec::new();
        for navigation in includes.iter() {
            let target = Arc::clone(registry.model(navigation.target)?);
            let alias = if used.contains(target.table()) {
                navigation.name.to_string()
            } else {
                target.table().to_string()
            };
            used.insert(alias.clone());

            let joined = Joined {
                navigation: navigation.clone(),
                target,
                alias,
            };
            if navigation.is_collection() {
                collections.push(joined);
            } else {
                singles.push(joined);
            }
        }

        Ok(Self {
            root: Arc::clone(root),
            singles,
            collections,
        })
    }

    pub fn root(&self) -> &Arc<ModelInfo> {
        &self.root
    }

    pub fn has_includes(&self) -> bool {
        !self.singles.is_empty() || !self.collections.is_empty()
    }

    /// The SELECT without filter, order or limit.
    pub fn select(&self, dialect: Dialect) -> SelectQuery {
        let root = &self.root;
        let mut items: Vec<SelectItem> = root
            .fields()
            .iter()
            .map(|f| SelectItem::column(root.table(), f.name, f.is_enum()))
            .collect();
        for single in &self.singles {
            items.extend(
                single
                    .target
                    .fields()
                    .iter()
                    .map(|f| SelectItem::column(single.alias.as_str(), f.name, f.is_enum())),
            );
        }
        for collection in &self.collections {
            items.push(SelectItem::Expr {
                sql: aggregate(dialect, collection),
                label: format!("{}.{}", root.name, collection.navigation.name),
            });
        }

        let mut query = SelectQuery::new()
            .from(root.table())
            .projection(Projection::Items(items));
        for joined in self.singles.iter().chain(&self.collections) {
            query = query.join(joined.join(root));
        }

        // collapse the duplicate parent rows the collection joins produce
        if !self.collections.is_empty() {
            for key in root.primary_key() {
                query = query.group_by(root.table(), key.name);
            }
            for single in &self.singles {
                for key in single.target.primary_key() {
                    query = query.group_by(single.alias.as_str(), key.name);
                }
            }
        }
        query
    }

    /// `SELECT COUNT(*) FROM "t"`; includes do not change the count.
    pub fn count(&self) -> SelectQuery {
        SelectQuery::new().from(self.root.table()).count()
    }

    /// Build the root instance and its navigation targets from one row.
    ///
    /// Every built instance is passed through `resolve`, which returns the
    /// instance the session keeps for that key (possibly an existing one).
    pub fn hydrate(
        &self,
        row: &Row,
        resolve: &mut dyn FnMut(ModelInstance) -> Result<ModelRef>,
    ) -> Result<ModelRef> {
        let root = self.load_columns(row, &self.root, self.root.table())?;
        let root = resolve(root)?;

        for single in &self.singles {
            let target = if self.is_absent(row, single) {
                None
            } else {
                let instance = self.load_columns(row, &single.target, &single.alias)?;
                Some(resolve(instance)?)
            };
            root.borrow_mut()
                .attach_single(single.navigation.name, target);
        }

        for collection in &self.collections {
            let label = format!("{}.{}", self.root.name, collection.navigation.name);
            let document = parse_document(row, &label)?;
            let mut targets = Vec::with_capacity(document.len());
            for element in document {
                let instance = load_object(&collection.target, &collection.alias, element, &label)?;
                targets.push(resolve(instance)?);
            }
            root.borrow_mut()
                .attach_collection(collection.navigation.name, targets);
        }

        Ok(root)
    }

    // LEFT JOIN without a match yields NULL in every target column
    fn is_absent(&self, row: &Row, single: &Joined) -> bool {
        single
            .target
            .primary_key()
            .all(|key| row.get_by_name(&single.label(key)).is_none_or(Value::is_null))
    }

    fn load_columns(&self, row: &Row, model: &Arc<ModelInfo>, alias: &str) -> Result<ModelInstance> {
        let mut instance = ModelInstance::new(Arc::clone(model));
        for field in model.fields() {
            let label = format!("{alias}.{}", field.name);
            let value = row.get_by_name(&label).cloned().ok_or_else(|| {
                Error::Type(TypeError {
                    expected: field.kind.label(),
                    actual: "missing column".to_string(),
                    column: Some(label.clone()),
                })
            })?;
            load_value(&mut instance, field, value, &label)?;
        }
        Ok(instance)
    }
}

fn aggregate(dialect: Dialect, collection: &Joined) -> String {
    let columns: Vec<JsonColumn> = collection
        .target
        .fields()
        .iter()
        .map(|f| JsonColumn {
            key: collection.label(f),
            expr: dialect.qualify(&collection.alias, f.name),
        })
        .collect();
    let present = collection
        .target
        .primary_key()
        .next()
        .map(|key| dialect.qualify(&collection.alias, key.name))
        .unwrap_or_else(|| dialect.qualify(&collection.alias, collection.navigation.target_field));
    dialect.json_aggregate(&columns, &present)
}

fn load_value(instance: &mut ModelInstance, field: &FieldInfo, value: Value, column: &str) -> Result<()> {
    let actual = value.type_name();
    instance.load(field.name, value).map_err(|_| {
        Error::Type(TypeError {
            expected: field.kind.label(),
            actual: actual.to_string(),
            column: Some(column.to_string()),
        })
    })
}

/// The aggregated document of a collection column as a list of objects.
fn parse_document(row: &Row, label: &str) -> Result<Vec<serde_json::Value>> {
    let document = match row.get_by_name(label) {
        Some(Value::Json(json)) => json.clone(),
        // SQLite returns JSON functions' results as text
        Some(Value::Text(text)) => serde_json::from_str(text)?,
        Some(Value::Null) | None => serde_json::Value::Array(Vec::new()),
        Some(other) => {
            return Err(Error::Type(TypeError {
                expected: "json",
                actual: other.type_name().to_string(),
                column: Some(label.to_string()),
            }));
        }
    };
    match document {
        serde_json::Value::Array(elements) => Ok(elements),
        other => Err(Error::Type(TypeError {
            expected: "json array",
            actual: json_kind(&other).to_string(),
            column: Some(label.to_string()),
        })),
    }
}

fn load_object(
    model: &Arc<ModelInfo>,
    alias: &str,
    element: serde_json::Value,
    label: &str,
) -> Result<ModelInstance> {
    let serde_json::Value::Object(mut object) = element else {
        return Err(Error::Type(TypeError {
            expected: "json object",
            actual: json_kind(&element).to_string(),
            column: Some(label.to_string()),
        }));
    };

    let mut instance = ModelInstance::new(Arc::clone(model));
    for field in model.fields() {
        let key = format!("{alias}.{}", field.name);
        let value = object
            .remove(&key)
            .map(json_to_value)
            .unwrap_or(Value::Null);
        load_value(&mut instance, field, value, &format!("{label}[{key}]"))?;
    }
    Ok(instance)
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::BigInt(v),
            None => Value::Json(serde_json::Value::Number(n)),
        },
        other => Value::Json(other),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::{FieldInfo, NavigationDef, ReferentialAction};

    fn registry() -> Registry {
        Registry::builder()
            .model(
                ModelInfo::new("User")
                    .field(FieldInfo::id("ID").primary_key())
                    .field(FieldInfo::name("Name"))
                    .field(FieldInfo::enumeration("Rank", "UserRank", &["User", "Admin"]))
                    .field(FieldInfo::id("ReferrerID").optional())
                    .navigation(NavigationDef::to_primary("Referrer", "ReferrerID", "User"))
                    .navigation(NavigationDef::from_primary("IpAddresses", "IpAddress", "UserID")),
            )
            .model(
                ModelInfo::new("IpAddress")
                    .field(FieldInfo::id("ID").primary_key())
                    .field(FieldInfo::id("UserID"))
                    .field(FieldInfo::boolean("Blocked"))
                    .navigation(
                        NavigationDef::to_primary("User", "UserID", "User")
                            .on_delete(ReferentialAction::Cascade),
                    ),
            )
            .build()
            .unwrap()
    }

    fn plan(reg: &Registry, model: &str, includes: &[&str]) -> FetchPlan {
        let root = reg.model(model).unwrap();
        let mut set = IncludeSet::new();
        for name in includes {
            set.include(root, name).unwrap();
        }
        FetchPlan::new(reg, root, &set).unwrap()
    }

    fn collect(plan: &FetchPlan, row: &Row) -> (ModelRef, Vec<ModelRef>) {
        let mut seen = Vec::new();
        let root = plan
            .hydrate(row, &mut |instance| {
                let model = instance.into_ref();
                seen.push(model.clone());
                Ok(model)
            })
            .unwrap();
        (root, seen)
    }

    #[test]
    fn test_include_errors() {
        let reg = registry();
        let user = reg.model("User").unwrap();
        let mut set = IncludeSet::new();
        let err = set.include(user, "Nope").unwrap_err();
        assert!(matches!(
            err,
            Error::Compilation(ref e) if e.kind == CompilationErrorKind::UnknownNavigation
        ));

        set.include(user, "IpAddresses").unwrap();
        let err = set.include(user, "IpAddresses").unwrap_err();
        assert!(matches!(
            err,
            Error::Compilation(ref e) if e.kind == CompilationErrorKind::DuplicateInclude
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_plain_select() {
        let reg = registry();
        let sql = plan(&reg, "IpAddress", &[])
            .select(Dialect::Postgres)
            .build(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            sql.sql(),
            "SELECT \"IpAddress\".\"ID\" as \"IpAddress.ID\", \"IpAddress\".\"UserID\" as \"IpAddress.UserID\", \
             \"IpAddress\".\"Blocked\" as \"IpAddress.Blocked\" FROM \"IpAddress\""
        );
    }

    #[test]
    fn test_single_include_joins_target() {
        let reg = registry();
        let sql = plan(&reg, "IpAddress", &["User"])
            .select(Dialect::Sqlite)
            .build(Dialect::Sqlite)
            .unwrap();
        assert!(sql.sql().contains("\"User\".\"Name\" as \"User.Name\""));
        assert!(
            sql.sql()
                .ends_with("FROM \"IpAddress\" LEFT JOIN \"User\" ON \"IpAddress\".\"UserID\" = \"User\".\"ID\"")
        );
        assert!(!sql.sql().contains("GROUP BY"));
    }

    #[test]
    fn test_self_reference_is_aliased() {
        let reg = registry();
        let sql = plan(&reg, "User", &["Referrer"])
            .select(Dialect::Postgres)
            .build(Dialect::Postgres)
            .unwrap();
        assert!(sql.sql().contains("\"Referrer\".\"Rank\"::text as \"Referrer.Rank\""));
        assert!(sql.sql().ends_with(
            "LEFT JOIN \"User\" \"Referrer\" ON \"User\".\"ReferrerID\" = \"Referrer\".\"ID\""
        ));
    }

    #[test]
    fn test_collection_include_aggregates() {
        let reg = registry();
        let sql = plan(&reg, "User", &["IpAddresses"])
            .select(Dialect::Postgres)
            .build(Dialect::Postgres)
            .unwrap();
        assert!(sql.sql().contains(
            "COALESCE(jsonb_agg(jsonb_build_object('IpAddress.ID', \"IpAddress\".\"ID\", \
             'IpAddress.UserID', \"IpAddress\".\"UserID\", 'IpAddress.Blocked', \"IpAddress\".\"Blocked\")) \
             FILTER (WHERE \"IpAddress\".\"ID\" IS NOT NULL), '[]'::jsonb) AS \"User.IpAddresses\""
        ));
        assert!(sql.sql().ends_with(
            "LEFT JOIN \"IpAddress\" ON \"User\".\"ID\" = \"IpAddress\".\"UserID\" GROUP BY \"User\".\"ID\""
        ));
    }

    #[test]
    fn test_group_by_covers_single_targets() {
        let reg = registry();
        let sql = plan(&reg, "User", &["Referrer", "IpAddresses"])
            .select(Dialect::Sqlite)
            .build(Dialect::Sqlite)
            .unwrap();
        assert!(sql.sql().ends_with("GROUP BY \"User\".\"ID\", \"Referrer\".\"ID\""));
    }

    #[test]
    fn test_count_ignores_includes() {
        let reg = registry();
        let sql = plan(&reg, "User", &["IpAddresses"])
            .count()
            .build(Dialect::Postgres)
            .unwrap();
        assert_eq!(sql.sql(), "SELECT COUNT(*) FROM \"User\"");
    }

    #[test]
    fn test_hydrate_single() {
        let reg = registry();
        let p = plan(&reg, "IpAddress", &["User"]);
        let row = Row::new(
            vec![
                "IpAddress.ID".into(),
                "IpAddress.UserID".into(),
                "IpAddress.Blocked".into(),
                "User.ID".into(),
                "User.Name".into(),
                "User.Rank".into(),
                "User.ReferrerID".into(),
            ],
            vec![
                Value::from("IIIIIIIIII"),
                Value::from("AAAAAAAAAA"),
                Value::BigInt(0),
                Value::from("AAAAAAAAAA"),
                Value::from("John"),
                Value::from("User"),
                Value::Null,
            ],
        );
        let (ip, seen) = collect(&p, &row);
        assert_eq!(seen.len(), 2);
        assert_eq!(ip.borrow().get("Blocked"), Some(&Value::Bool(false)));
        let user = ip.borrow().single("User").unwrap();
        assert_eq!(user.borrow().get("Name"), Some(&Value::from("John")));
        assert!(!user.borrow().is_dirty());
    }

    #[test]
    fn test_hydrate_missing_single_is_none() {
        let reg = registry();
        let p = plan(&reg, "User", &["Referrer"]);
        let mut names = Vec::new();
        let mut values = Vec::new();
        for alias in ["User", "Referrer"] {
            for f in ["ID", "Name", "Rank", "ReferrerID"] {
                names.push(format!("{alias}.{f}"));
            }
        }
        values.extend([
            Value::from("AAAAAAAAAA"),
            Value::from("John"),
            Value::from("User"),
            Value::Null,
        ]);
        values.extend([Value::Null, Value::Null, Value::Null, Value::Null]);
        let (user, seen) = collect(&p, &Row::new(names, values));
        assert_eq!(seen.len(), 1);
        assert!(user.borrow().is_loaded("Referrer"));
        assert!(user.borrow().single("Referrer").is_none());
    }

    #[test]
    fn test_hydrate_collection_from_text() {
        let reg = registry();
        let p = plan(&reg, "User", &["IpAddresses"]);
        let document = r#"[{"IpAddress.ID":"IIIIIIIIII","IpAddress.UserID":"AAAAAAAAAA","IpAddress.Blocked":1}]"#;
        let row = Row::new(
            vec![
                "User.ID".into(),
                "User.Name".into(),
                "User.Rank".into(),
                "User.ReferrerID".into(),
                "User.IpAddresses".into(),
            ],
            vec![
                Value::from("AAAAAAAAAA"),
                Value::from("John"),
                Value::from("User"),
                Value::Null,
                Value::from(document),
            ],
        );
        let (user, seen) = collect(&p, &row);
        assert_eq!(seen.len(), 2);
        let ips = user.borrow().collection("IpAddresses");
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].borrow().get("Blocked"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_hydrate_empty_collection() {
        let reg = registry();
        let p = plan(&reg, "User", &["IpAddresses"]);
        let row = Row::new(
            vec![
                "User.ID".into(),
                "User.Name".into(),
                "User.Rank".into(),
                "User.ReferrerID".into(),
                "User.IpAddresses".into(),
            ],
            vec![
                Value::from("AAAAAAAAAA"),
                Value::from("John"),
                Value::from("User"),
                Value::Null,
                Value::Json(serde_json::json!([])),
            ],
        );
        let (user, _) = collect(&p, &row);
        assert!(user.borrow().is_loaded("IpAddresses"));
        assert!(user.borrow().collection("IpAddresses").is_empty());
    }

    #[test]
    fn test_hydrate_type_error() {
        let reg = registry();
        let p = plan(&reg, "IpAddress", &[]);
        let row = Row::new(
            vec!["IpAddress.ID".into(), "IpAddress.UserID".into(), "IpAddress.Blocked".into()],
            vec![Value::from("IIIIIIIIII"), Value::BigInt(7), Value::Bool(true)],
        );
        let err = p.hydrate(&row, &mut |i| Ok(i.into_ref())).unwrap_err();
        match err {
            Error::Type(e) => {
                assert_eq!(e.column.as_deref(), Some("IpAddress.UserID"));
                assert_eq!(e.actual, "BIGINT");
            }
            other => panic!("unexpected {other}"),
        }
    }
}
