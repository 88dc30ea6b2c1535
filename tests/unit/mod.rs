// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for the PostgreSQL object operator
//!
//! This module contains unit tests for:
//! - Diff planners (owned objects, roles, grants, default privileges)
//! - Status transitions and two-phase deletion
//! - Per-kind reconciler wiring that needs no server

#[path = "../common/mod.rs"]
mod common;

mod default_privileges;
mod managed_resources;
mod owned_objects;
mod status;
