//! Migration ledger and runner for folio
//!
//! Evolves the persisted portfolio data model through an ordered list of named
//! migrations. The ledger (a collection in the data store) records which
//! migrations have been applied; the runner applies the pending ones in order,
//! stopping at the first failure and keeping the progress made before it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use folio_migrations::{DataStore, Manifest, Migration, MigrationConfig, Migrator};
//!
//! struct CreateDefaultWatchlist;
//!
//! #[async_trait]
//! impl Migration for CreateDefaultWatchlist {
//!     fn name(&self) -> &str {
//!         "001_create_default_watchlist"
//!     }
//!
//!     async fn apply(&self, store: &dyn DataStore) -> anyhow::Result<()> {
//!         store
//!             .put("watchlists", "default", serde_json::json!({ "symbols": [] }))
//!             .await?;
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> folio_migrations::MigrationResult<()> {
//! let store = folio_migrations::connect("memory://").await?;
//! let manifest = Manifest::new().register(CreateDefaultWatchlist);
//! let migrator = Migrator::new(store.clone(), Arc::new(manifest), MigrationConfig::default());
//!
//! let result = migrator.migrate().await?;
//! println!("applied {:?}", result.applied);
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod definitions;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod rollback;
pub mod runner;
pub mod source;
pub mod status;
pub mod store;

pub use definitions::{LedgerEntry, MigrateResult, Migration, MigrationConfig};
pub use error::{ConnectionError, MigrationError, MigrationResult};
pub use ledger::Ledger;
pub use lock::MigrationLock;
pub use runner::Migrator;
pub use source::{Manifest, MigrationSource};
pub use status::{StatusReport, StatusRow};
pub use store::{connect, DataStore, Document, MemoryStore, PgStore, StoreError, StoreResult};
