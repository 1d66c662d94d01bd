//! # StackSeek Repository Connect
//!
//! Links a signed-in StackSeek user's GitHub, GitLab, Bitbucket and Azure DevOps
//! repositories through an OAuth redirect handshake, then imports them into the
//! StackSeek backend.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod notifier;
pub mod providers;
pub mod redirect;
pub mod replay_guard;
pub mod sequencer;
pub mod server;
pub mod session;
pub mod telemetry;

pub use client::ConnectClient;
pub use error::ConnectError;
