//! Real-time session and match orchestration engine.
//!
//! This crate ties the workspace together: the framed transport feeds
//! decoded frames into [`MatchServer`], which routes them through the
//! packet handler into the session, room and relay layers. Deployments
//! embed the engine through [`MatchServerBuilder`] and inject their own
//! persistence, login validation and plugins.

pub mod auth;
pub mod config;
pub mod error;
mod handler;
pub mod plugin;
pub mod server;

pub use auth::{AllowAll, DenyAll, SessionValidator};
pub use config::{AccountConfig, ChannelConfig, ServerConfig};
pub use error::MatchforgeError;
pub use plugin::{GamePlugin, PluginRegistry};
pub use server::{MatchServer, MatchServerBuilder};
