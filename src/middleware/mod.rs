//! Middleware module
//!
//! Contains Tower middleware for CORS, session authentication and tenant
//! resolution.

pub mod auth;
pub mod cors;
pub mod tenant;
