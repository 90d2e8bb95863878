// src/lib.rs

pub mod backup;
pub mod bootstrap;
pub mod constants;
pub mod errors;
pub mod optimization;
pub mod registry;
pub mod rust_config;
pub mod system;
pub mod value;
