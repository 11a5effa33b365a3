//! # sqlx-format-bind
//!
//! A SQLx companion crate that turns format-string query templates into driver-ready
//! statements, materializes result rows into typed entities, and reuses scratch
//! objects through a bounded lock-free pool.
//!
//! ## Features
//!
//! - **Format-String Templates**: Write `{0}`, `{1}`, … in your SQL and pass the arguments alongside
//! - **Collection Expansion**: A `Vec`, slice, array or set argument becomes one parameter per element, perfect for `IN (…)`
//! - **Dialect Rules**: `?` for MySQL, `$1` for PostgreSQL, `@p0` for SQL Server, `:p0` for Oracle, or your own renderer
//! - **Entity Materialization**: Per-type column mappings built once, matched by name with case-insensitive fallback
//! - **Lock-Free Object Pool**: Compare-and-swap slots, never blocks, constructs on exhaustion
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx = { version = "0.8", features = ["mysql", "runtime-tokio"] }
//! sqlx-format-bind = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Compiling a Template
//!
//! ```
//! use sqlx_format_bind::{template, Binder};
//!
//! let binder = Binder::new()?;
//! let statement = binder.compile(
//!     &template!("SELECT * FROM users WHERE id IN ({0}) AND name <> {1}", vec![3, 5, 8], "root"),
//!     "PostgreSQL",
//! )?;
//!
//! assert_eq!(statement.text(), "SELECT * FROM users WHERE id IN ($1,$2,$3) AND name <> $4");
//! assert_eq!(statement.parameters().len(), 4);
//! # Ok::<(), sqlx_format_bind::Error>(())
//! ```
//!
//! ### Executing with SQLx
//!
//! ```rust,no_run
//! use sqlx::{MySql, MySqlPool};
//! use sqlx_format_bind::{materialize_all, template, Binder, DescriptorBuilder, Entity, RowSet};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i32,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! impl Entity for User {
//!     fn describe(d: &mut DescriptorBuilder<Self>) {
//!         d.field("Id", |u| &mut u.id)
//!             .field("Name", |u| &mut u.name)
//!             .field("Email", |u| &mut u.email);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let binder = Binder::new()?;
//!
//! let statement = binder.compile_for::<MySql>(&template!(
//!     "SELECT id, name, email FROM users WHERE id IN ({0})",
//!     vec![1, 2, 3]
//! ))?;
//! let rows = statement.to_mysql_query().fetch_all(&pool).await?;
//!
//! let mut stream = RowSet::from_mysql_rows(&rows)?;
//! for user in materialize_all::<User, _>(&mut stream) {
//!     println!("{:?}", user?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Caller-Named Parameters
//!
//! ```
//! use sqlx_format_bind::{template, Binder, Parameter};
//!
//! let statement = Binder::new()?.compile(
//!     &template!("UPDATE users SET name = {0} WHERE id = {1}", Parameter::new("name", "Bob"), 7),
//!     "MSSQL",
//! )?;
//! assert_eq!(statement.text(), "UPDATE users SET name = @name WHERE id = @p1");
//! # Ok::<(), sqlx_format_bind::Error>(())
//! ```
//!
//! ## How It Works
//!
//! Compilation is a two-pass rewrite:
//!
//! 1. **Expand**: Every slot of a collection argument becomes a comma-joined list of slots, with the extra
//!    elements appended after the original arguments
//! 2. **Render**: Each slot occurrence becomes one bound parameter and is replaced by the placeholder token
//!    of the target driver's [`Dialect`]
//!
//! Both passes write into pooled scratch buffers, so steady-state compilation does not allocate for the
//! statement text beyond the final copy.
//!
//! ## Limitations
//!
//! - Execution goes through SQLx; the sqlx bridge (`to_mysql_query`, `from_mysql_rows`) is MySQL only
//! - Collections nested inside collections are rejected
//! - Entity descriptors are declared by hand through [`Entity::describe`]
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod argument;
pub mod builder;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod field;
pub mod pool;
pub mod query;
pub mod record;
pub mod rows;
pub mod value;

pub use argument::{Argument, Parameter, Template, ToArgument};
pub use dialect::{Dialect, DialectRules, Placeholder};
pub use entity::{descriptor, first, materialize_all, materialize_one, DescriptorBuilder, Entities, Entity};
pub use error::{Error, Result};
pub use field::FieldValue;
pub use pool::{ObjectPool, Pooled};
pub use query::{Binder, BinderBuilder, BoundParameter, Command, Statement};
pub use record::{Record, RecordExt, ResultStream};
pub use rows::RowSet;
pub use value::{Decimal, FromValue, ToValue, Value};

/// Builds a [`Template`] from a format string and its arguments.
///
/// Every argument goes through [`ToArgument`], so collections are expanded
/// and strings or byte blobs stay single values.
///
/// ```
/// use sqlx_format_bind::{template, Argument};
///
/// let t = template!("WHERE id IN ({0}) AND kind = {1}", [1, 2], "a");
/// assert_eq!(t.arguments().len(), 2);
/// assert!(matches!(t.arguments()[0], Argument::Sequence(_)));
/// ```
#[macro_export]
macro_rules! template {
    ($format:expr $(, $arg:expr)* $(,)?) => {
        $crate::Template::new(
            $format,
            ::std::vec![$($crate::ToArgument::to_argument(&$arg)),*],
        )
    };
}

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::template;
    pub use crate::{Binder, Parameter, Statement, Template};
    pub use crate::{materialize_all, materialize_one, DescriptorBuilder, Entity, RowSet};
    pub use crate::{Record, RecordExt, ResultStream, Value};
    pub use crate::{ObjectPool, Pooled};
}
