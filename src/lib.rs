//! Multi-tenant authentication and tenant-scoped authorization core.
//!
//! This crate owns the session lifecycle of a multi-tenant admin backend:
//! credential verification, JWT issuance and rotation, hashed refresh-token
//! storage, tenant resolution, and a role/permission model kept in sync
//! between the relational store and an embedded policy engine. The HTTP
//! layer, DTO validation, and mail delivery live in the consuming service.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod utils;
