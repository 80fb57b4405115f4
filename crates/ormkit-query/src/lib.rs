//! Predicate compilation and SQL construction for ormkit.
//!
//! `ormkit-query` is the **query construction layer**. It turns predicates
//! over a model's fields into immutable [`Condition`] trees and assembles
//! statements around them.
//!
//! # Role In The Architecture
//!
//! - **Predicates**: [`col`] builds [`Predicate`] expressions.
//! - **Compiler**: [`compile`] validates every literal and produces a
//!   [`Condition`] that renders to SQL and evaluates in memory.
//! - **Builders**: [`SelectQuery`], [`InsertBuilder`], [`UpdateBuilder`] and
//!   [`DeleteBuilder`] render [`Fragment`]s with `?` markers.
//! - **Eager loading**: [`FetchPlan`] maps included navigations onto joins
//!   and hydrates rows back into model instances.
//!
//! Statements execute through the `Connection` trait from `ormkit-core`.
//! Most users reach these types through the `ormkit` facade crate.

pub mod builder;
pub mod clause;
pub mod compiler;
pub mod condition;
pub mod eager;
pub mod fragment;
pub mod join;
pub mod predicate;
pub mod select;

pub use builder::{Assignment, DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use clause::{OrderBy, OrderDirection};
pub use compiler::{compile, key_condition};
pub use condition::{Condition, Literal, Logic, Operator, sql_literal};
pub use eager::{FetchPlan, IncludeSet};
pub use fragment::Fragment;
pub use join::{Join, JoinType};
pub use predicate::{Column, Predicate, col};
pub use select::{Projection, SelectItem, SelectQuery};
