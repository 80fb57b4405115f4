//! Shared fixtures for the SQLite integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ormkit::prelude::*;
use ormkit::value::parse_date;
use ormkit::{
    Backend, CodeClassifier, Connection, Dialect, Row, SqliteConnection, Statement, Validators,
};
use tempfile::TempDir;

pub const JOHN: &str = "AAAAAAAAAA";
pub const ALICE: &str = "BBBBBBBBBB";
pub const BOB: &str = "CCCCCCCCCC";
pub const JOHNS_IP: &str = "IIIIIIIIII";

const SCHEMA: &str = r#"
CREATE TABLE "User" (
    "ID" TEXT PRIMARY KEY,
    "Name" TEXT NOT NULL,
    "Email" TEXT NOT NULL UNIQUE,
    "Rank" TEXT NOT NULL,
    "Verified" BOOLEAN NOT NULL,
    "Credit" INTEGER NOT NULL,
    "Joined" TEXT NOT NULL,
    "ReferrerID" TEXT REFERENCES "User" ("ID"),
    "LastSeen" TEXT
);
CREATE TABLE "IpAddress" (
    "ID" TEXT PRIMARY KEY,
    "UserID" TEXT NOT NULL REFERENCES "User" ("ID") ON DELETE CASCADE,
    "Address" TEXT NOT NULL,
    "Blocked" BOOLEAN NOT NULL
);
"#;

const FIXTURES: &str = r#"
INSERT INTO "User" VALUES ('AAAAAAAAAA', 'John', 'john@example.com', 'User', 1, 1200, '2019-03-02', NULL, '2022-09-01 08:30:00');
INSERT INTO "User" VALUES ('BBBBBBBBBB', 'Alice', 'alice@example.com', 'Admin', 1, 0, '2020-07-21', NULL, '2021-12-31 23:59:59');
INSERT INTO "User" VALUES ('CCCCCCCCCC', 'Bob', 'bob@example.com', 'Admin', 0, 350, '2021-11-30', 'BBBBBBBBBB', NULL);
INSERT INTO "IpAddress" VALUES ('IIIIIIIIII', 'AAAAAAAAAA', '10.0.0.1', 0);
"#;

pub fn registry() -> Registry {
    Registry::builder()
        .validators(Validators::anchored_at(parse_date("2022-10-12").unwrap()))
        .model(
            ModelInfo::new("User")
                .field(FieldInfo::id("ID").primary_key())
                .field(FieldInfo::name("Name"))
                .field(FieldInfo::email("Email").unique())
                .field(FieldInfo::enumeration("Rank", "UserRank", &["User", "Admin"]))
                .field(FieldInfo::boolean("Verified"))
                .field(FieldInfo::price("Credit"))
                .field(FieldInfo::date("Joined"))
                .field(FieldInfo::id("ReferrerID").optional())
                .field(FieldInfo::timestamp("LastSeen").optional())
                .navigation(NavigationDef::to_primary("Referrer", "ReferrerID", "User"))
                .navigation(NavigationDef::from_primary("IpAddresses", "IpAddress", "UserID")),
        )
        .model(
            ModelInfo::new("IpAddress")
                .field(FieldInfo::id("ID").primary_key())
                .field(FieldInfo::id("UserID"))
                .field(FieldInfo::text("Address", 7, 45))
                .field(FieldInfo::boolean("Blocked"))
                .navigation(
                    NavigationDef::to_primary("User", "UserID", "User")
                        .on_delete(ReferentialAction::Cascade),
                ),
        )
        .build()
        .unwrap()
}

/// Statement counters shared by a backend and its connections.
#[derive(Debug, Default)]
pub struct Stats {
    pub queries: Cell<usize>,
    pub transactions: Cell<usize>,
    pub statements: RefCell<Vec<String>>,
    pub fail_next_transaction: Cell<bool>,
}

/// SQLite backend that records what reaches the database and can reject the
/// next transaction before it runs.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    inner: SqliteBackend,
    pub stats: Rc<Stats>,
}

pub struct RecordingConnection {
    inner: SqliteConnection,
    stats: Rc<Stats>,
    classifier: CodeClassifier,
}

impl RecordingBackend {
    pub fn queries(&self) -> usize {
        self.stats.queries.get()
    }

    pub fn transactions(&self) -> usize {
        self.stats.transactions.get()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.stats.statements.borrow().last().cloned()
    }

    pub fn fail_next_transaction(&self) {
        self.stats.fail_next_transaction.set(true);
    }

    /// Run a script directly, bypassing every session and counter.
    pub fn execute(&self, script: &str) {
        self.inner.execute_script(script).unwrap();
    }

    /// Rows as the database holds them, bypassing every session.
    pub fn raw(&self, sql: &str) -> Vec<Row> {
        let mut conn = self.inner.connect().unwrap();
        conn.query(&Statement::new(sql, Vec::new())).unwrap()
    }
}

impl Backend for RecordingBackend {
    type Conn = RecordingConnection;

    fn connect(&self) -> ormkit::Result<RecordingConnection> {
        Ok(RecordingConnection {
            inner: self.inner.connect()?,
            stats: Rc::clone(&self.stats),
            classifier: self.inner.classifier().clone(),
        })
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn classifier(&self) -> &CodeClassifier {
        self.inner.classifier()
    }
}

impl Connection for RecordingConnection {
    fn query(&mut self, statement: &Statement) -> ormkit::Result<Vec<Row>> {
        self.stats.queries.set(self.stats.queries.get() + 1);
        self.stats.statements.borrow_mut().push(statement.sql.clone());
        self.inner.query(statement)
    }

    fn execute_in_transaction(&mut self, statements: &[Statement]) -> ormkit::Result<u64> {
        self.stats.transactions.set(self.stats.transactions.get() + 1);
        self.stats
            .statements
            .borrow_mut()
            .extend(statements.iter().map(|s| s.sql.clone()));
        if self.stats.fail_next_transaction.replace(false) {
            return Err(self
                .classifier
                .error(Some("1".to_string()), "injected failure", None));
        }
        self.inner.execute_in_transaction(statements)
    }
}

/// A fresh database with schema and fixtures. Keep the directory alive for
/// the duration of the test.
pub fn setup() -> (TempDir, RecordingBackend) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ormkit.db").to_string_lossy().to_string();
    let inner = SqliteBackend::file(path);
    inner.execute_script(SCHEMA).unwrap();
    inner.execute_script(FIXTURES).unwrap();
    let backend = RecordingBackend {
        inner,
        stats: Rc::new(Stats::default()),
    };
    (dir, backend)
}

pub fn text(model: &ModelRef, field: &str) -> String {
    match model.borrow().get(field) {
        Some(Value::Text(s)) => s.clone(),
        other => panic!("{field} is not text: {other:?}"),
    }
}
