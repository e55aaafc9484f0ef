//! Shared types and models for the Optics Back-Office inventory ledger
//!
//! This crate contains the domain types and pure rules shared by the backend
//! and any other component that needs to reason about stock and movements.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
