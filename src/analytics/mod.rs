//! Pure aggregation functions over committed assessment data.
//!
//! Nothing here fails: malformed inputs fall back to zero or an empty list.

pub mod portfolio;
pub mod progress;
pub mod ratio;

pub use portfolio::*;
pub use progress::*;
pub use ratio::*;
