//! Hazard warning handling.
//!
//! `warnings` picks the warning shown per hazard category and merges pushed
//! warnings without downgrading.

pub mod warnings;
