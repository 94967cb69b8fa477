use std::{io::ErrorKind, num::NonZeroU64};

use serde::Deserialize;
use serenity::model::id::{ApplicationId, ChannelId, GuildId};

use crate::error::ConfigError;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "GONG_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug)]
pub struct Config {
    pub token: String,
    pub app_id: Option<NonZeroU64>,
    pub guild_id: NonZeroU64,
    pub voice_channel_id: Option<NonZeroU64>,
    pub prefix: String,
    pub sound: String,
    pub gong: String,
    pub ffmpeg: String,
}

/// Contents of the TOML file. Everything is optional here since the
/// environment may fill in the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    token: Option<String>,
    app_id: Option<u64>,
    guild_id: Option<u64>,
    voice_channel_id: Option<u64>,
    prefix: Option<String>,
    sound: Option<String>,
    gong: Option<String>,
    ffmpeg: Option<String>,
}

impl Config {
    /// Loads the config from `$GONG_CONFIG` (or `config.toml`) and the process
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(&path)
    }

    /// Reads the config from a given TOML path, then applies environment
    /// overrides. A missing file is treated as empty.
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let file = read_file(path)?;
        Self::merge(file, |key| std::env::var(key).ok())
    }

    fn merge(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let token = env("BOT_TOKEN")
            .or(file.token)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let prefix = file.prefix.unwrap_or_else(|| "!".to_string());
        if prefix.trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }

        let app_id = snowflake("APP_ID", env("APP_ID"), file.app_id)?;
        let guild_id = snowflake("GUILD_ID", env("GUILD_ID"), file.guild_id)?
            .ok_or(ConfigError::Missing("GUILD_ID"))?;
        let voice_channel_id = snowflake(
            "VOICE_CHANNEL_ID",
            env("VOICE_CHANNEL_ID"),
            file.voice_channel_id,
        )?;

        Ok(Self {
            token,
            app_id,
            guild_id,
            voice_channel_id,
            prefix,
            sound: file.sound.unwrap_or_else(|| "airhorn.dca".to_string()),
            gong: file.gong.unwrap_or_else(|| "gong.wav".to_string()),
            ffmpeg: file.ffmpeg.unwrap_or_else(|| "ffmpeg".to_string()),
        })
    }

    pub fn app_id(&self) -> Option<ApplicationId> {
        self.app_id.map(ApplicationId::from)
    }

    pub fn guild_id(&self) -> GuildId {
        GuildId::from(self.guild_id)
    }

    pub fn voice_channel_id(&self) -> Option<ChannelId> {
        self.voice_channel_id.map(ChannelId::from)
    }
}

/// Reads the TOML file at `path`. A missing file reads as empty.
fn read_file(path: &str) -> Result<FileConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("no config file at `{}`, using environment only", path);
            String::new()
        }
        Err(e) => return Err(ConfigError::InvalidPath(path.to_string(), e)),
    };

    toml::from_str(&content).map_err(|e| ConfigError::InvalidContent(path.to_string(), e))
}

/// Picks the environment value over the file value and checks it is a valid,
/// non-zero snowflake.
fn snowflake(
    name: &'static str,
    env: Option<String>,
    file: Option<u64>,
) -> Result<Option<NonZeroU64>, ConfigError> {
    let invalid = |value: String| ConfigError::InvalidSnowflake { name, value };

    match (env, file) {
        (Some(value), _) => value
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(NonZeroU64::new)
            .map(Some)
            .ok_or_else(|| invalid(value)),
        (None, Some(raw)) => NonZeroU64::new(raw)
            .map(Some)
            .ok_or_else(|| invalid(raw.to_string())),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(toml: &str, env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let file: FileConfig = toml::from_str(toml).unwrap();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::merge(file, |key| env.get(key).cloned())
    }

    #[test]
    fn file_only() {
        let config = parse(
            r#"
            token = "abc"
            guild_id = 42
            voice_channel_id = 7
            prefix = "?"
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(config.token, "abc");
        assert_eq!(config.guild_id.get(), 42);
        assert_eq!(config.voice_channel_id.map(NonZeroU64::get), Some(7));
        assert_eq!(config.app_id, None);
        assert_eq!(config.prefix, "?");
        assert_eq!(config.sound, "airhorn.dca");
        assert_eq!(config.gong, "gong.wav");
        assert_eq!(config.ffmpeg, "ffmpeg");
    }

    #[test]
    fn env_overrides_file() {
        let config = parse(
            r#"
            token = "from-file"
            guild_id = 42
            "#,
            &[
                ("BOT_TOKEN", "from-env"),
                ("GUILD_ID", "812408462382333957"),
                ("APP_ID", " 1234 "),
            ],
        )
        .unwrap();

        assert_eq!(config.token, "from-env");
        assert_eq!(config.guild_id.get(), 812408462382333957);
        assert_eq!(config.app_id.map(NonZeroU64::get), Some(1234));
    }

    #[test]
    fn empty_env_falls_back_to_file() {
        let config = parse(
            r#"
            token = "from-file"
            guild_id = 42
            "#,
            &[("BOT_TOKEN", ""), ("GUILD_ID", "  ")],
        )
        .unwrap();

        assert_eq!(config.token, "from-file");
        assert_eq!(config.guild_id.get(), 42);
    }

    #[test]
    fn missing_token() {
        let err = parse("guild_id = 42", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn missing_guild() {
        let err = parse("", &[("BOT_TOKEN", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GUILD_ID")));
    }

    #[test]
    fn rejects_bad_snowflakes() {
        let err = parse("", &[("BOT_TOKEN", "abc"), ("GUILD_ID", "not-a-number")]).unwrap_err();
        match err {
            ConfigError::InvalidSnowflake { name, value } => {
                assert_eq!(name, "GUILD_ID");
                assert_eq!(value, "not-a-number");
            }
            e => panic!("unexpected error {:?}", e),
        }

        let err = parse("guild_id = 0", &[("BOT_TOKEN", "abc")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSnowflake { name: "GUILD_ID", .. }
        ));
    }

    #[test]
    fn blank_file_token_is_missing() {
        let err = parse("token = \"   \"\nguild_id = 42", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));

        let config = parse("token = \" abc \"\nguild_id = 42", &[]).unwrap();
        assert_eq!(config.token, "abc");
    }

    #[test]
    fn rejects_empty_prefix() {
        let err = parse("token = \"abc\"\nguild_id = 42\nprefix = \"\"", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPrefix));

        let err = parse("token = \"abc\"\nguild_id = 42\nprefix = \"  \"", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPrefix));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let path = std::env::temp_dir().join("gong-config-does-not-exist.toml");
        let file = read_file(path.to_str().unwrap()).unwrap();

        assert!(file.token.is_none());
        assert!(file.guild_id.is_none());
        assert!(file.prefix.is_none());
    }

    #[test]
    fn reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("gong-config-{}.toml", std::process::id()));
        std::fs::write(&path, "token = \"abc\"\nguild_id = 42\nsound = \"horn.dca\"\n").unwrap();

        let file = read_file(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        let file = file.unwrap();

        assert_eq!(file.token.as_deref(), Some("abc"));
        assert_eq!(file.guild_id, Some(42));
        assert_eq!(file.sound.as_deref(), Some("horn.dca"));
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let path = std::env::temp_dir().join(format!("gong-config-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "guild_id = [").unwrap();

        let err = read_file(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        match err {
            ConfigError::InvalidContent(name, _) => assert_eq!(name, path.to_str().unwrap()),
            e => panic!("unexpected error {:?}", e),
        }
    }
}
