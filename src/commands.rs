use std::time::Duration;

use serenity::{
    all::{CommandDataOption, CommandOptionType},
    builder::{CreateCommand, CreateCommandOption},
};

pub const START: &str = "start";
pub const MINUTES: &str = "minutes";
pub const MAX_MINUTES: u16 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCommand {
    Airhorn,
    Ping,
}

impl TextCommand {
    /// Parses a message against `prefix`. Returns `None` for anything that is
    /// not one of our commands.
    /// The name must follow the prefix directly.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }

        let rest = content.trim().strip_prefix(prefix)?;
        let name = rest.split(char::is_whitespace).next()?;

        match name.to_ascii_lowercase().as_str() {
            "airhorn" => Some(Self::Airhorn),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }
}

/// A request for the gong after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Start {
    pub delay: Duration,
}

impl Start {
    pub fn create() -> CreateCommand {
        CreateCommand::new(START)
            .description("Start timer")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    MINUTES,
                    "Minutes to wait before the gong.",
                )
                .min_int_value(0)
                .max_int_value(MAX_MINUTES.into())
                .required(false),
            )
    }

    pub fn from_options(options: &[CommandDataOption]) -> Self {
        let minutes = options
            .iter()
            .find(|opt| opt.name == MINUTES)
            .and_then(|opt| opt.value.as_i64());

        Self::from_minutes(minutes)
    }

    pub fn from_minutes(minutes: Option<i64>) -> Self {
        let minutes = minutes.unwrap_or(0).clamp(0, MAX_MINUTES as i64) as u64;

        Self {
            delay: Duration::from_secs(minutes * 60),
        }
    }

    pub fn reply(&self) -> String {
        match self.delay.as_secs() / 60 {
            0 => "Pong!".to_string(),
            1 => "Timer started, the gong sounds in 1 minute.".to_string(),
            n => format!("Timer started, the gong sounds in {} minutes.", n),
        }
    }
}
