//! ormkit - typed predicates, identity caching and batched change tracking
//! over SQL.
//!
//! ormkit provides:
//!
//! - Field-level validation before any SQL is rendered
//! - Predicates that compile to SQL and evaluate in memory against the same rules
//! - Eager loading of single (LEFT JOIN) and collection (JSON aggregate) navigations
//! - An identity map per session, reconciled after bulk updates and deletes
//! - Change tracking with all-or-nothing batched saves
//!
//! # Quick Start
//!
//! ```ignore
//! use ormkit::prelude::*;
//!
//! let registry = Registry::builder()
//!     .model(
//!         ModelInfo::new("User")
//!             .field(FieldInfo::id("ID").primary_key())
//!             .field(FieldInfo::name("Name"))
//!             .field(FieldInfo::enumeration("Rank", "UserRank", &["User", "Admin"]))
//!             .navigation(NavigationDef::from_primary("IpAddresses", "IpAddress", "UserID")),
//!     )
//!     .model(
//!         ModelInfo::new("IpAddress")
//!             .field(FieldInfo::id("ID").primary_key())
//!             .field(FieldInfo::id("UserID"))
//!             .navigation(
//!                 NavigationDef::to_primary("User", "UserID", "User")
//!                     .on_delete(ReferentialAction::Cascade),
//!             ),
//!     )
//!     .build()?;
//!
//! let mut session = Session::new(&registry, SqliteBackend::file("app.db"));
//!
//! // Point lookup, answered from the cache the second time
//! let john = session.get("User", &col("ID").eq("AAAAAAAAAA"))?;
//!
//! // Field-level change, written by save_changes
//! john.borrow_mut().set("Name", "Johnny")?;
//! session.save_changes()?;
//!
//! // Bulk update, replayed onto cached instances
//! session
//!     .update("User", &col("Rank").eq("Admin"))?
//!     .set("Rank", "User")?
//!     .save()?;
//!
//! // Eager loading
//! let admins = session
//!     .include("User", "IpAddresses")?
//!     .get_many(&col("Rank").eq("Admin"))?;
//! ```

pub use ormkit_core::{
    Backend, CodeClassifier, Connection, ConsistencyErrorKind, DatabaseCode, Dialect, Error,
    FieldInfo, FieldKind, ModelInfo, ModelInstance, ModelRef, NavigationDef, ReferentialAction,
    Registry, Result, Row, SessionId, Statement, ValidationErrorKind, Validators, Value,
};
pub use ormkit_query::{Condition, OrderDirection, Predicate, col, compile};
pub use ormkit_session::{Fetch, Session, SessionConfig, UpdateRequest};
pub use ormkit_sqlite::{SqliteBackend, SqliteConfig, SqliteConnection};

/// Date and timestamp helpers used by [`Value`].
pub use ormkit_core::value;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ormkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Models
        FieldInfo,
        ModelInfo,
        ModelRef,
        NavigationDef,
        ReferentialAction,
        Registry,
        // Errors and values
        Error,
        Result,
        Value,
        // Queries
        OrderDirection,
        Predicate,
        col,
        // Sessions
        Session,
        SessionConfig,
        SqliteBackend,
    };
}
