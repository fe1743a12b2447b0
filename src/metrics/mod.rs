//! Metrics module: raw readings, status records, and rate computation.

mod models;
mod rates;
mod reading;

pub use models::*;
pub use rates::*;
pub use reading::*;
