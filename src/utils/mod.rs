pub mod error;
pub mod logger;
pub mod spam;
pub mod validation;
