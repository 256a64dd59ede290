//! Public facade crate for `webread`.
//!
//! No IO here. Re-exports the backend-agnostic types and traits from `webread-core`.

pub use webread_core::*;
