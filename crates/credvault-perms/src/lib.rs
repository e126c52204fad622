//! # Credvault Perms
//!
//! Per-actor, per-path access control for credvault.
//!
//! ## Overview
//!
//! A permission row grants one actor a set of operations on one path. A path
//! ending in `*` grants on everything it prefixes. The service layer asks a
//! [`PermissionChecker`] before every read or write of a credential, and
//! manages rows through a [`PermissionService`].
//!
//! ## Key Types
//!
//! - [`ActorContext`] - Who is asking
//! - [`PermissionChecker`] - The yes/no decision
//! - [`PermissionService`] - Granting, reading and revoking rows
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use credvault_core::PermissionOperation;
//! use credvault_perms::{ActorContext, PermissionChecker};
//! use credvault_store::MemoryStore;
//!
//! async fn example() {
//!     let checker = PermissionChecker::new(Arc::new(MemoryStore::new()), true);
//!     let ctx = ActorContext::new("uaa-client:ci");
//!
//!     let allowed = checker
//!         .has_permission(&ctx, "/ci/deploy-key", PermissionOperation::Read)
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Deny by default**: no row means no access
//! - **Indistinguishable denials**: missing and forbidden are both
//!   [`InvalidAccess`](credvault_core::InvalidAccess)
//! - **No self-service**: an actor never changes its own row

pub mod actor;
pub mod checker;
pub mod error;
pub mod service;

pub use actor::ActorContext;
pub use checker::PermissionChecker;
pub use error::{PermsError, Result};
pub use service::PermissionService;
