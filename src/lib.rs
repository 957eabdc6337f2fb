//! fabrica-core
//!
//! Inventory ledger, recipe-driven production and seller sub-ledger core for
//! a small manufacturing shop. All persistence lives in a remote row store
//! that offers no cross-call atomicity; this crate supplies the one vetted
//! implementation of the quantity arithmetic, the movement audit log, the
//! consumption engine and the compensating-action policy that the UI
//! surfaces call.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod compensation;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;
pub mod store;

pub use config::{load_config, AppConfig};
pub use errors::ServiceError;
pub use services::AppServices;
