//! Vendor-specific model backends.
pub mod openai;
