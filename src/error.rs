use serenity::model::id::ChannelId;
use thiserror::Error;

type DynError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read file `{0}`: {1:?}")]
    InvalidPath(String, std::io::Error),
    #[error("Read invalid toml content from `{0}`: {1:?}")]
    InvalidContent(String, toml::de::Error),
    #[error("No ${0} given and none set in the config file.")]
    Missing(&'static str),
    #[error("The command prefix must not be empty.")]
    EmptyPrefix,
    #[error("Invalid snowflake for ${name}: `{value}`")]
    InvalidSnowflake { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("Could not open sound file `{path}`: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed reading sound data: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame {frame} is truncated, expected {expected} bytes.")]
    Truncated { frame: usize, expected: usize },
    #[error("Failed to decode opus frame {frame}: {source}")]
    Decode { frame: usize, source: opus::Error },
}

#[derive(Debug, Error)]
pub enum PlayError {
    #[error("You can only use this command in a guild text channel.")]
    NoGuildId,
    #[error("Join a voice channel before using this command.")]
    NoChannel,
    #[error("Already playing in <#{0}>, try again when it's done.")]
    Busy(ChannelId),
    #[error("Unable to join your voice channel.")]
    Join,
    #[error("Failed to start the audio transcoder.")]
    Ffmpeg(#[source] std::io::Error),
    #[error("Failed to prepare the sound for playback.")]
    Sound(#[from] SoundError),

    #[error("Unknown play command error: {0:?}")]
    Unknown(DynError),
}
