//! Shared UI icons and emojis.
//!
//! Each icon falls back to a plain-text marker on terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[ABORT]");

// Target indicators
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "[T]");
pub static SHIELD: Emoji<'_, '_> = Emoji("🛡️  ", "[AUTH]");
pub static LOCK: Emoji<'_, '_> = Emoji("🔒 ", "[DENY]");

// Session indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[F]");
pub static REPORT: Emoji<'_, '_> = Emoji("📄 ", "[R]");
