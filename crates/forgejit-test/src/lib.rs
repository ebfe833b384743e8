//! Shared test fixtures for forgejit crates.
//!
//! This crate provides ready-made function definitions for testing.
//! It depends only on `forgejit-core`, so `forgejit` can use it as a
//! dev-dependency without a cycle.
//!
//! - [`fixtures`] - arithmetic, callback and lifecycle units
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! forgejit-test = { workspace = true }
//! ```
//!
//! ```ignore
//! use forgejit_test::fixtures::{arithmetic_unit, numbered_unit};
//! ```

pub mod fixtures;

pub use fixtures::{arithmetic_unit, callback_unit, lifecycle_unit, numbered_unit, sum_into};
