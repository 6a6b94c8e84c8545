//! # Rolodex Shared Library
//!
//! Domain core of the Rolodex CRM: data models, authentication and
//! authorization, the audit trail, CSV import/export and outbound mail.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `auth`: Passwords, tokens, sessions, password reset and the access policy
//! - `audit`: Append-only JSON-lines audit trail
//! - `csv_io`: CSV import and export
//! - `mail`: Best-effort outbound mail
//! - `db`: Connection pool and migrations

pub mod audit;
pub mod auth;
pub mod csv_io;
pub mod db;
pub mod mail;
pub mod models;

/// Current version of the Rolodex shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
