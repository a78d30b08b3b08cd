//! Financing Diagnosis API Library
//!
//! This library provides the core functionality for the financing diagnosis
//! API: loading the financing matrix, matching submitted business profiles,
//! phrasing the consultative diagnosis and forwarding qualified leads.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `mailer`: SMTP transport for lead emails.
//! - `matcher`: Profile filtering against the matrix.
//! - `matrix`: Matrix loading and the load-once cache.
//! - `models`: Request and response models.
//! - `narrative`: Diagnosis text generation with fallback.
//! - `notifier`: Lead notification rules and email composition.
//! - `presenter`: Response shaping and institution masking.
//! - `routes`: Router and middleware wiring.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod mailer;
pub mod matcher;
pub mod matrix;
pub mod models;
pub mod narrative;
pub mod notifier;
pub mod presenter;
pub mod routes;
