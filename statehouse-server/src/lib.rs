//! Statehouse Server
//!
//! HTTP front end for the statehouse state store.

pub mod api;
pub mod config;
