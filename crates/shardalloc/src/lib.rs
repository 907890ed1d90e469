#![doc = include_str!("../README.md")]

mod assignment;
mod config;
mod engine;
mod error;
pub mod explorer;
mod service;
mod store;

pub use crate::assignment::*;
pub use crate::config::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::service::*;
pub use crate::store::*;
