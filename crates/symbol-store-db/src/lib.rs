//! Persistent symbol table cache
//!
//! Stores symbol tables keyed by `(debug_name, breakpad_id)` in an embedded
//! SQLite database. The number of resident tables is capped (least recently
//! used go first, checked after every store) and an optional age limit
//! drops stale tables whenever the database is opened.

mod clock;
mod config;
mod database;
mod error;
pub mod eviction;
mod migrate;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SymbolStoreConfig;
pub use database::SymbolStoreDb;
pub use error::{Result, SymbolStoreError};
pub use types::{StoreStats, SymbolTable};
