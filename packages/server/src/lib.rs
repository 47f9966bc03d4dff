//! Multi-country credit application intake and asynchronous evaluation.
//!
//! External clients submit credit applications over HTTP; the service
//! validates country-specific identity documents, persists the application
//! with encrypted PII, and evaluates it asynchronously: a database trigger
//! writes an outbox row, a consumer lifts it into the work queue, and a
//! worker fetches banking data from the country's provider (behind a
//! circuit breaker) and applies country risk rules. Status updates fan out
//! to connected WebSocket clients through the NATS bus.

pub mod common;
pub mod config;
pub mod domain;
pub mod kernel;
pub mod providers;
pub mod realtime;
pub mod resilience;
pub mod server;
pub mod services;
pub mod store;
pub mod workers;

pub use config::Config;
