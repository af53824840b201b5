//! Hostel dashboard: property and tenant records for hostel owners.
//!
//! One JSON state document (hostels, tenants, payments, audit log, report
//! history) lives in Sled and is updated through typed path operations.
//! Read models are derived on the fly; writes go through the mutation
//! façade so every change is stamped and audited.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod aggregate;
pub mod mutations;
pub mod markdown;
pub mod report;
pub mod auth;
// REST API module: Axum HTTP handlers on port 11111
pub mod rest;
