//! Matchmaking bot for Halo 2 custom-game nights.
//!
//! The domain layer (queue, series, stores, ladder, commands, batch stats
//! rebuild) is always compiled and has no network code. The Discord
//! transport and event loop sit behind the default `io` feature.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod ladder;
pub mod matchmaking;
pub mod populate;
pub mod queue;
pub mod series;
pub mod store;
pub mod teams;
pub mod types;

#[cfg(feature = "io")]
pub mod bot;
#[cfg(feature = "io")]
pub mod gateway;
#[cfg(feature = "io")]
pub mod handlers;
#[cfg(feature = "io")]
pub mod http;
