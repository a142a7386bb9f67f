//! Schema-driven entity mutations over SQLite, with a hook pipeline between
//! builders and storage.
//!
//! Every create, update, and delete becomes a [`core::mutation::Mutation`]
//! that runs through an ordered list of [`core::hook::Hook`]s before the core
//! executor turns it into a storage spec for a [`persist::Driver`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use entmut::{
//!     client::{Client, MutationBuilder},
//!     context::Context,
//!     persist::sqlite::SqliteDriver,
//!     schema::{EntityDescriptor, FieldDescriptor, Registry, defaults},
//! };
//!
//! let registry = Arc::new(
//!     Registry::builder()
//!         .entity(
//!             EntityDescriptor::new("Project", "projects")
//!                 .field(FieldDescriptor::string("name").unique())
//!                 .field(FieldDescriptor::time("createTime").immutable().default_provider()),
//!         )
//!         .provider("Project", "createTime", defaults::now)
//!         .build()?,
//! );
//! let driver = SqliteDriver::open_in_memory()?;
//! driver.create_schema(&registry)?;
//! let client = Client::builder(registry, Arc::new(driver)).build()?;
//!
//! let ctx = Context::background();
//! let projects = client.entity("Project")?;
//! let created = projects.create().set("name", "demo").save(&ctx)?;
//! let loaded = projects.get(&ctx, created.id.clone())?;
//! assert_eq!(created, loaded);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
#![deny(missing_docs)]

/// Builders over the mutation pipeline.
pub mod client;
/// TOML configuration.
pub mod config;
/// Per-call deadline and cancellation.
pub mod context;
/// Mutations, hooks, and the executor.
pub mod core;
/// Stored entities and pipeline outcomes.
pub mod entity;
/// Error taxonomy.
pub mod error;
/// Panicking helpers.
#[cfg(feature = "must")]
pub mod must;
/// Mutation operation flags.
pub mod op;
/// Storage driver contract and the SQLite driver.
pub mod persist;
/// Single-writer async runtime and events.
pub mod runtime;
/// Entity, field, and edge descriptors.
pub mod schema;
/// Storage specs and their construction.
pub mod spec;
/// Shared primitive types.
pub mod types;
/// JSON views and merge-patch input.
pub mod view;

pub use client::{Client, EntityClient, MutationBuilder};
pub use context::Context;
pub use entity::{Entity, Outcome};
pub use error::{Error, Result};
pub use op::Op;
pub use types::{EntityId, FieldType, Value};
