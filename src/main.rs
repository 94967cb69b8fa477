use std::sync::Arc;

use anyhow::{Context, Result};
use bot::Handler;
use config::Config;
use serenity::{prelude::GatewayIntents, Client};
use songbird::SerenityInit;
use sound::Sound;

mod bot;
mod commands;
mod config;
mod error;
mod ffmpeg;
mod sound;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let sound = Sound::from_path(&config.sound)
        .with_context(|| format!("failed to load `{}`", config.sound))?;
    if sound.is_empty() {
        log::warn!("`{}` contains no frames, airhorn will be silent", config.sound);
    }
    let handler = Handler::new(&config, Arc::new(sound));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let mut builder = Client::builder(&config.token, intents).event_handler(handler);
    if let Some(app_id) = config.app_id() {
        builder = builder.application_id(app_id);
    }
    let mut client = builder.register_songbird().await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", e);
            return;
        }
        log::info!("shutting down");
        shard_manager.shutdown_all().await;
    });

    client.start().await?;

    Ok(())
}
