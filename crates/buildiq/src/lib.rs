//! Core library for the BuildIQ apartment-rental management service.
//!
//! Domain services and their storage seams live under [`rental`]; the HTTP
//! surface is assembled by [`rental::router`]. Infrastructure adapters (token
//! issuance, payment gateway, persistence) are supplied by the hosting binary.

pub mod auth;
pub mod config;
pub mod error;
pub mod rental;
pub mod telemetry;
