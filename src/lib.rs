//! # Cascara - Row Access and Mutation Cascade Core
//!
//! Cascara is the row-access and mutation-cascade core of a relational
//! engine: it turns a compiled FROM clause into concrete row iteration
//! and turns UPDATE/DELETE/MERGE into a complete, referentially
//! consistent set of row mutations across dependent tables.
//!
//! - **Predicate resolution**: AND-tree decomposition, per-range
//!   assignment, transitive equality expansion, index selection
//! - **Join iteration**: inner/left/right/full outer over an N-way
//!   nested loop, with null-row synthesis and a second pass for
//!   unmatched right-side rows
//! - **Cascading mutation**: recursive SET NULL / SET DEFAULT /
//!   CASCADE / RESTRICT propagation with cycle-safe merging of
//!   conflicting writes
//!
//! ## Quick Start
//!
//! ```ignore
//! use cascara::{Engine, Session};
//! use cascara::plan::RangeDecl;
//! use cascara::expr::Expr;
//!
//! let engine = Engine::new();
//! let users = engine.create_table(users_def)?;
//! engine.insert(users, vec![1.into(), "ada".into()])?;
//!
//! let plan = engine.compile(
//!     vec![RangeDecl::table(users)],
//!     Some(Expr::eq(Expr::col(0, 0), Expr::lit(1))),
//! )?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (Engine)          │
//! ├─────────────────────────────────────┤
//! │  DML Executor │ Cascade │ Triggers  │
//! ├───────────────┴─────────┴───────────┤
//! │   Range / Joined Row Iterators      │
//! ├─────────────────────────────────────┤
//! │  Resolver & Index Selection (plan)  │
//! ├─────────────────────────────────────┤
//! │ Expression Evaluation │ Schema      │
//! ├───────────────────────┴─────────────┤
//! │     In-Memory Storage (scan/probe)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! Plans are compiled once and shared read-only across sessions;
//! iterators, pending row-sets, and cascade paths are allocated per
//! execution. Row visibility and transaction semantics belong to the
//! caller and plug in through the [`storage::Visibility`] trait.

pub mod dml;
pub mod engine;
pub mod exec;
pub mod expr;
pub mod plan;
pub mod schema;
pub mod session;
pub mod storage;
pub mod types;

pub use dml::{
    Assignment, DeleteStatement, ExecuteResult, MergeStatement, QueryStatement, Statement,
    TriggerEvent, UpdateStatement,
};
pub use engine::Engine;
pub use expr::{CmpOp, Expr};
pub use plan::{BoundPlan, JoinType, RangeDecl};
pub use schema::{
    Catalog, ColumnDef, ForeignKeyDef, IndexDef, ReferentialAction, TableDef,
};
pub use session::Session;
pub use storage::RowId;
pub use types::{DataType, Value};
