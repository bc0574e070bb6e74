//! Tollgate - licence validation and quota enforcement for usage-bound API licences
//!
//! The enforcement engine ([`engine::LicenceEngine`]) decides admit/deny for
//! each licence-bearing call and commits the consumption against a
//! [`store::LicenceStore`]. The rest of the crate is the HTTP service around
//! it: a public validation endpoint and an admin API for issuing licences.

pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod policy;
pub mod rate_limit;
pub mod store;
pub mod util;
