//! Daemon library that discovers and controls LIFX bulbs on a local
//! network and exposes them through [core::CoreHandle::dispatch].
//!
//! This crate owns components B through H of the system: the bulb
//! registry, gateway sessions, the broadcast socket, the discovery
//! controller, the command dispatcher, the single-threaded event core, and
//! the tag index. The wire codec itself lives in `lifx-core`.

pub mod broadcast;
pub mod bulb;
pub mod config;
pub mod core;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod tag;

pub use crate::config::Config;
pub use crate::core::{Core, CoreHandle};
pub use crate::error::CoreError;
