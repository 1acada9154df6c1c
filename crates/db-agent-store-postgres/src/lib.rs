// crates/db-agent-store-postgres/src/lib.rs
// ============================================================================
// Module: PostgreSQL Store Library
// Description: Public API surface for the external PostgreSQL adapter.
// Purpose: Expose the adapter, its config, and its error type.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! External storage backend for the agent: a capped pool of
//! `tokio-postgres` clients serving the same adapter contract as the
//! embedded SQLite store.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// PostgreSQL adapter implementation.
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::PostgresAdapter;
pub use store::PostgresAdapterConfig;
pub use store::PostgresAdapterError;
