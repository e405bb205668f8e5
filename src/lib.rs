//! # Hydrotrack
//!
//! A password-gated dashboard service for hydroponic growing tables, usable
//! both as a standalone binary and as a library.
//!
//! Each table tracks its two most recent harvests, its two most recent water
//! changes, the latest pH/PPM reading, and a cumulative nutrient counter.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! hydrotrack = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hydrotrack::config::ServerConfig;
//! use hydrotrack::server::{AppState, create_router};
//! use hydrotrack::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     Arc::new(mockable::DefaultClock),
//!     &config,
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `hydrotrack` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod tracker;
pub mod types;
