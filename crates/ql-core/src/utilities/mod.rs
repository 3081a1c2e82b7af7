//! Utility sub-module.

pub mod clone;
