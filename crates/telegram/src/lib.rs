//! Operator commands and advisory alerts over Telegram.

pub mod alerts;
pub mod commands;
pub mod format;

pub use alerts::run_alerts;
pub use commands::{start_bot, BotDeps, Command};
