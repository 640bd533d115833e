//! Utility Billing API Library
//!
//! Backend for a housing association's utility billing: billing periods,
//! the household/meter registry, the meter-reading ledger, billing
//! readiness checks, and the one-shot maintenance operations run from
//! `src/bin/`.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Domain logic and shared errors/models.
//! - `auth`: Bearer-token authentication and the explicit authorization context.
//! - `config`: Configuration management.
//! - `db`: Database connection, pool and migrations.
//! - `db_storage`: Period, registry and reading-ledger queries.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `import`: Spreadsheet (CSV) reading import.
//! - `maintenance`: Cleanup, reset, backfill, seeding and interval migration.
//! - `models`: Data models.
//! - `openapi`: Generated API document and Swagger UI page.
//! - `periods`: Period calendar logic and the reading-cycle filter.
//! - `readiness`: Billing readiness evaluation.
//! - `routes`: Router assembly.

pub mod api;
pub mod core;

pub mod auth;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod import;
pub mod maintenance;
pub mod models;
pub mod openapi;
pub mod periods;
pub mod readiness;
pub mod routes;
