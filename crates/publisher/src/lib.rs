//! PlanetFlare publisher: issues single-use access tokens to clients and pays
//! providers who present them back, via signed caller-held future payments.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use publisher::{config::PublisherConfig, server::{self, AppState}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = Arc::new(AppState::new(PublisherConfig::from_env()?)?);
//!     server::run(state).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod payments;
pub mod redemption;
pub mod server;
pub mod settlement;
pub mod token_store;

pub use error::{PublisherError, Result};
