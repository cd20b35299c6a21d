pub mod error_mapping;
pub mod time;
pub mod validation;
