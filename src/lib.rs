//! # Reelhouse
//!
//! A video sharing server, usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! reelhouse = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use reelhouse::media::MediaStorage;
//! use reelhouse::server::{AppState, create_router};
//! use reelhouse::store::SqliteStore;
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/reelhouse.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     media: Arc::new(MediaStorage::new(&PathBuf::from("./data"))),
//!     public_base_url: None,
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the binary's CLI. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod server;
pub mod store;
pub mod types;
