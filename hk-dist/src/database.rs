//! Database models and operations for hkdist
//!
//! PostgreSQL holds the release catalogue: registered releases, the current
//! version of each command per platform, generated patches and the `next`
//! table that tells clients which patch to apply from an old version.

pub mod config;
pub mod connection;
pub mod current;
pub mod error;
pub mod manager;
pub mod modtime;
pub mod patch;
pub mod release;

pub use config::DatabaseConfig;
pub use connection::{DatabaseConnection, DatabasePool};
pub use current::CurrentService;
pub use error::{DatabaseError, DbResult};
pub use manager::DatabaseManager;
pub use modtime::ModService;
pub use patch::{ConvergeStats, PatchEdge, PatchService};
pub use release::ReleaseService;
