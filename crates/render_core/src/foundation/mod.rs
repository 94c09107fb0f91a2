//! Foundation module - low-level utilities shared across the crate

pub mod logging;
