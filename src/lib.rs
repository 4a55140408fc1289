//! CRAT deploy-test server library.
//!
//! This library provides the deploy-test pipeline (package lookup, download,
//! external test dispatch and monitoring), run persistence and the HTTP API.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
pub mod store;
