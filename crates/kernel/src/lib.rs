//! Quarry Kernel Library
//!
//! Query engine, document repositories and the HTTP surface. The main
//! entry point for running the server is the `quarry` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod query;
pub mod repository;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod use_case;
