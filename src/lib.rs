//! Client-side data layer for the storefront admin, vendor and supplier portals.
//!
//! - [`api`]: REST client for the admin endpoints.
//! - [`loader`]: per-view list request controller (dedup, supersede, teardown).
//! - [`wizard`]: product form wizard and currency normalization.

pub mod api;
pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod wizard;

pub use error::FetchError;
