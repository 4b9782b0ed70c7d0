//! API endpoint handlers.

pub mod assessments;
pub mod extract;
pub mod health;
pub mod portfolio;
