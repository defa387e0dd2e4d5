//! Tessera full node: configuration, CLI, message handlers and the timer loop.

pub mod cli;
pub mod config;
pub mod error;
pub mod genesis;
pub mod handlers;
pub mod node;
pub mod timers;
