//! # Credvault Testkit
//!
//! Testing utilities for credvault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A ready-wired in-memory vault with helpers for seeding
//!   permission rows and building request contexts
//! - **Generators**: Proptest strategies for names, actors, permission
//!   entries, password parameters and simple values
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use credvault_testkit::generators::credential_name;
//!
//! proptest! {
//!     #[test]
//!     fn names_normalize_to_themselves(name in credential_name()) {
//!         prop_assert_eq!(credvault_core::normalize_name(&name), name);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,ignore
//! use credvault_testkit::fixtures::TestVault;
//!
//! let fixture = TestVault::new();
//! fixture.grant_admin_everything().await;
//! let ctx = fixture.admin();
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{actors, TestVault, ADMIN};
pub use generators::{credential_name, permission_entry, simple_value};
