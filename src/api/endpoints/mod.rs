//! API endpoint handlers.

pub mod health;
pub mod identify;
pub mod remedy;
