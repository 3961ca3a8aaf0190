//! GeoCat Core - Domain models, formats, ports and configuration
//!
//! This crate contains the data model shared by the import pipeline, the format
//! registry with its readers, and the port traits that catalog, database and
//! history adapters implement.

pub mod config;
pub mod error;
pub mod formats;
pub mod models;
pub mod ports;

pub use error::{ImportError, Result};
