//! # parley-store
//!
//! Durable client-side state for Parley, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`, a small key-value table, and the typed helpers
//! that persist the authenticated session (token + last-known profile).

pub mod database;
pub mod kv;
pub mod migrations;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use session::PersistedSession;
