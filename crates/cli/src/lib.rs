//! `mchat`: diagnostics for the member portal chat engine.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
