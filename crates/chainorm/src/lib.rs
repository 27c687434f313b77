//! # chainorm
//!
//! A chain-style SQL query builder with a lightweight record layer on top.
//!
//! ## Features
//!
//! - **Mode-aware builder**: one statement mode per chain; calling a method the mode does not
//!   support is an error, never a silent no-op
//! - **Placeholders first**: statements carry `?` placeholders and ordered values; arrays bound
//!   to `IN ?` are inlined as literal lists
//! - **Model chains**: table-bound chains with implicit finds, pagination, scopes and upsert
//! - **Records**: change tracking, delta saves and declarative associations
//! - **Events**: `<table>.<mode>` notifications after every successful execution
//! - **Query logging**: timing, slow-query warnings and truncation via `tracing`
//!
//! ## Query Builder
//!
//! ```ignore
//! use chainorm::{params, QueryBuilder};
//!
//! let mut q = QueryBuilder::new();
//! q.update("items")?
//!     .update_fields(row! { "name" => "x", "updated_at" => Value::raw("NOW()") })?
//!     .where_("id IN ?", params![[1, 2, 3]])?;
//! let built = q.to_param()?;
//! ```
//!
//! ## Models and records
//!
//! ```ignore
//! use chainorm::{Associations, Orm, OrmConfig};
//!
//! let orm = Orm::connect(OrmConfig::from_file("chainorm.toml")?)?;
//! orm.associate("items", Associations::new().belongs_to("protos", "proto_id"));
//!
//! if let Some(mut item) = orm.model("items")?.one("items.id = ?", params![1]).await? {
//!     item.set("name", "renamed");
//!     item.save().await?;
//!     let proto = item.get_related("protos").await?.into_one();
//! }
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod context;
pub mod dialect;
pub mod error;
pub mod events;
pub mod exec;
pub mod model;
pub mod monitor;
pub mod placeholder;
pub mod record;
pub mod relation;
pub mod service;
pub mod value;

#[cfg(feature = "pool")]
pub mod pg;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builder::{Built, Direction, JoinKind, Mode, QueryBuilder};
pub use codec::{EncodeStyle, ValueCodec};
pub use config::{DatabaseConfig, ModelConfig, OrmConfig};
pub use context::{Orm, OrmBuilder, ScopeFn, ServiceFactory};
pub use dialect::Dialect;
pub use error::{OrmError, OrmResult};
pub use events::{EventBus, EventKind, ModelEvent};
pub use exec::{Executor, Page, Paging};
pub use model::{ActionEntry, DoOptions, ModelChain, OpMode, Outcome, PageRequest};
pub use monitor::{QueryContext, QueryType, SqlLogger};
pub use record::{Record, Related};
pub use relation::{AssociationRegistry, Associations, Relation, RelationKind};
pub use service::{DbConnection, DbResult, DbService};
pub use value::{Row, Value};

#[cfg(feature = "pool")]
pub use context::PgServiceFactory;
#[cfg(feature = "pool")]
pub use pg::{PgService, create_pool};
