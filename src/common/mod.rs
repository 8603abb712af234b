// Common constants, errors and domain types shared across layers

pub mod constants;
pub mod error;
pub mod types;
