//! # Credvault Store
//!
//! Storage abstraction for credvault. Provides trait-based interfaces for
//! credential versions, permission rows and encryption key canaries, with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The services never touch a database directly; they talk to
//! [`CredentialStore`], [`PermissionStore`] and [`KeyCanaryStore`]. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`CredentialStore`] - Credentials and their versions
//! - [`PermissionStore`] - Permission rows, one per (path, actor)
//! - [`KeyCanaryStore`] - Canaries that identify configured keys
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use credvault_store::{CredentialStore, SqliteStore};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("vault.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let latest = store.find_most_recent("/app/db/password").await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Unique names**: a second credential with an existing name is a
//!   [`StoreError::Conflict`]
//! - **Cascade**: deleting a credential deletes its versions
//! - **Opaque secrets**: stores only ever see encrypted values

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    CredentialStore, CredentialSummary, KeyCanaryStore, PermissionStore, PermissionStoreExt,
};
