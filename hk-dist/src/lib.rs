//! hkdist library
//!
//! The distribution service behind `hk update`: a REST API over the release
//! catalogue, the patch generator and the release builder.

pub mod builder;
pub mod config;
pub mod database;
pub mod generator;
pub mod web;

pub use config::{BuildConfig, DistConfig, GenConfig, ServerConfig};
pub use database::*;
