//! Telegram delivery for escalation alerts.
//!
//! `message` renders an [`EscalationAlert`](rosterlink_core::escalation::EscalationAlert)
//! as Markdown; `client` posts it through the bot `sendMessage` method and
//! implements the core `EscalationChannel` seam.

pub mod client;
pub mod message;

pub use client::{TelegramClient, TelegramError, TelegramEscalationChannel};
pub use message::render_alert;
