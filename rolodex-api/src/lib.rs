//! # Rolodex API Server Library
//!
//! HTTP surface of the Rolodex CRM, built on the `rolodex-shared` domain
//! core.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `bootstrap`: First-run owner account
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Authentication and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
