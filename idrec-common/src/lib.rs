//! # Identity Reconciliation Common Library
//!
//! Shared code for the identity reconciliation service:
//! - Contact data model
//! - Contact Store contract with SQLite and in-memory implementations
//! - Error taxonomy
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use db::models::{Contact, ContactUpdate, Link, LinkPrecedence, NewContact};
pub use db::{ContactStore, ContactTx};
pub use error::{Error, Result};
