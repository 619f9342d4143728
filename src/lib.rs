// src/lib.rs
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod processing;
pub mod raster;
pub mod temporal;
pub mod utils;

pub use error::{Error, Result};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
