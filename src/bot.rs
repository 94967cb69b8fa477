use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::{
    all::{CommandInteraction, Interaction},
    async_trait,
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    client::{Context, EventHandler},
    model::{
        channel::Message,
        gateway::Ready,
        id::{ChannelId, GuildId, UserId},
    },
};
use songbird::{driver::Bitrate, input::Input, Event, EventContext, Songbird, TrackEvent};

use crate::{
    commands::{Start, TextCommand, START},
    config::Config,
    error::PlayError,
    ffmpeg::Transcode,
    sound::Sound,
};

/// Pause after the last frame before leaving, so the tail isn't clipped.
const LEAVE_DELAY: Duration = Duration::from_millis(250);
const BITRATE: Bitrate = Bitrate::BitsPerSecond(96_000);

pub struct Handler {
    guild_id: GuildId,
    voice_channel_id: Option<ChannelId>,
    prefix: String,
    sound: Arc<Sound>,
    gong: Transcode,
    playing: Playing,
}

impl Handler {
    pub fn new(config: &Config, sound: Arc<Sound>) -> Self {
        Self {
            guild_id: config.guild_id(),
            voice_channel_id: config.voice_channel_id(),
            prefix: config.prefix.clone(),
            sound,
            gong: Transcode::new(&config.ffmpeg, &config.gong),
            playing: Playing::default(),
        }
    }
}

/// Guilds with a playback in progress (or scheduled), and the channel it is
/// for.
#[derive(Debug, Default, Clone)]
pub struct Playing(Arc<DashMap<GuildId, ChannelId>>);

impl Playing {
    /// Marks the guild busy, or reports the channel it is already busy in.
    pub fn claim(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayError> {
        match self.0.entry(guild_id) {
            Entry::Occupied(entry) => Err(PlayError::Busy(*entry.get())),
            Entry::Vacant(entry) => {
                entry.insert(channel_id);
                Ok(())
            }
        }
    }

    pub fn release(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.0.remove(&guild_id).map(|(_, channel_id)| channel_id)
    }

    /// Runs `leave` with the guild still claimed, then releases it. Nothing
    /// else can join the guild until `leave` is done.
    pub async fn release_after<F>(&self, guild_id: GuildId, leave: F) -> Option<ChannelId>
    where
        F: Future<Output = ()>,
    {
        leave.await;
        self.release(guild_id)
    }
}

#[async_trait]
impl EventHandler for Handler
where
    Handler: 'static,
{
    async fn ready(&self, ctx: Context, ready: Ready) {
        log::info!("{} is connected", ready.user.name);

        match self.guild_id.get_commands(&ctx).await {
            Ok(commands) => {
                for command in commands {
                    log::info!("existing command `{}` found", command.name);
                }
            }
            Err(e) => log::error!("failed to get guild commands: {}", e),
        }

        match self.guild_id.create_command(&ctx, Start::create()).await {
            Ok(command) => log::info!("registered command `{}` in {}", command.name, self.guild_id),
            Err(e) => log::error!("failed to create guild command: {}", e),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let response = match TextCommand::parse(&self.prefix, &msg.content) {
            Some(TextCommand::Airhorn) => self.handle_airhorn(&ctx, &msg).await,
            Some(TextCommand::Ping) => {
                if let Err(e) = msg.channel_id.say(&ctx, "Pong!").await {
                    log::warn!("failed to reply to ping: {}", e);
                }
                return;
            }
            None => return,
        };

        if let Err(e) = response {
            log::warn!("airhorn in {:?} failed: {:?}", msg.guild_id, e);
            if let Err(e) = msg.channel_id.say(&ctx, e.to_string()).await {
                log::warn!("failed to send error message: {}", e);
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(cmd) = interaction {
            let response = match cmd.data.name.as_str() {
                START => self.handle_start_cmd(&ctx, &cmd).await,
                _ => return,
            };

            let message = match response {
                Ok(content) => CreateInteractionResponseMessage::new().content(content),
                Err(e) => {
                    log::warn!("start in {:?} failed: {:?}", cmd.guild_id, e);
                    CreateInteractionResponseMessage::new()
                        .content(e.to_string())
                        .ephemeral(true)
                }
            };

            if let Err(e) = cmd
                .create_response(&ctx, CreateInteractionResponse::Message(message))
                .await
            {
                log::error!("failed to send interaction callback: {}", e);
            }
        }
    }
}

impl Handler
where
    Handler: 'static,
{
    async fn handle_airhorn(&self, ctx: &Context, msg: &Message) -> Result<(), PlayError> {
        let guild_id = msg.guild_id.ok_or(PlayError::NoGuildId)?;
        let channel_id =
            get_user_channel(ctx, guild_id, msg.author.id).ok_or(PlayError::NoChannel)?;

        self.playing.claim(guild_id, channel_id)?;

        let sound = self.sound.clone();
        let input = tokio::task::spawn_blocking(move || sound.to_input())
            .await
            .map_err(|e| PlayError::Unknown(Box::new(e)))
            .and_then(|input| input.map_err(PlayError::from));

        match input {
            Ok(input) => play(ctx, &self.playing, guild_id, channel_id, input).await,
            Err(e) => {
                self.playing.release(guild_id);
                Err(e)
            }
        }
    }

    /// Schedules the gong and returns the reply for the invoker.
    pub async fn handle_start_cmd(
        &self,
        ctx: &Context,
        cmd: &CommandInteraction,
    ) -> Result<String, PlayError> {
        let guild_id = cmd.guild_id.ok_or(PlayError::NoGuildId)?;
        let channel_id = match self.voice_channel_id {
            Some(channel_id) => channel_id,
            None => get_user_channel(ctx, guild_id, cmd.user.id).ok_or(PlayError::NoChannel)?,
        };
        let start = Start::from_options(&cmd.data.options);

        self.playing.claim(guild_id, channel_id)?;

        let ctx = ctx.clone();
        let playing = self.playing.clone();
        let gong = self.gong.clone();
        tokio::spawn(async move {
            if !start.delay.is_zero() {
                log::info!("gong in {} scheduled after {:?}", guild_id, start.delay);
                tokio::time::sleep(start.delay).await;
            }

            let result = match gong.spawn() {
                Ok(stream) => play(&ctx, &playing, guild_id, channel_id, stream.into_input()).await,
                Err(e) => {
                    playing.release(guild_id);
                    Err(e)
                }
            };

            if let Err(e) = result {
                log::error!("failed to play gong in {}: {:?}", guild_id, e);
            }
        });

        Ok(start.reply())
    }
}

fn get_user_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)?
        .voice_states
        .get(&user_id)?
        .channel_id
}

/// Joins `channel_id` and plays `input`, leaving once it ends. The guild must
/// already be claimed in `playing`; it is released on failure here, or when
/// the track stops.
async fn play(
    ctx: &Context,
    playing: &Playing,
    guild_id: GuildId,
    channel_id: ChannelId,
    input: Input,
) -> Result<(), PlayError> {
    let manager = match songbird::get(ctx).await {
        Some(manager) => manager,
        None => {
            playing.release(guild_id);
            return Err(PlayError::Unknown("songbird is not registered".into()));
        }
    };

    let result = start_track(&manager, playing, guild_id, channel_id, input).await;
    if result.is_err() {
        playing
            .release_after(guild_id, async {
                if let Err(e) = manager.remove(guild_id).await {
                    log::debug!("nothing to leave in {}: {}", guild_id, e);
                }
            })
            .await;
    }
    result
}

async fn start_track(
    manager: &Arc<Songbird>,
    playing: &Playing,
    guild_id: GuildId,
    channel_id: ChannelId,
    input: Input,
) -> Result<(), PlayError> {
    let call = manager
        .join(guild_id, channel_id)
        .await
        .map_err(|_| PlayError::Join)?;
    log::info!("playing in {} / {}", guild_id, channel_id);

    let handle = {
        let mut call = call.lock().await;
        call.set_bitrate(BITRATE);
        call.play_input(input)
    };
    let leave = LeaveHandler {
        manager: manager.clone(),
        guild_id,
        playing: playing.clone(),
        done: Arc::new(AtomicBool::new(false)),
    };

    for event in [TrackEvent::End, TrackEvent::Error] {
        handle
            .add_event(Event::Track(event), leave.clone())
            .map_err(|e| PlayError::Unknown(Box::new(e)))?;
    }

    Ok(())
}

#[derive(Clone)]
struct LeaveHandler {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    playing: Playing,
    /// Shared by the End and Error registrations of one track.
    done: Arc<AtomicBool>,
}

#[async_trait]
impl songbird::EventHandler for LeaveHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                log::debug!("track in {} stopped: {:?}", self.guild_id, state.playing);
            }
        }

        if self.done.swap(true, Ordering::AcqRel) {
            return None;
        }

        let channel_id = self
            .playing
            .release_after(self.guild_id, async {
                tokio::time::sleep(LEAVE_DELAY).await;
                if let Err(e) = self.manager.remove(self.guild_id).await {
                    log::warn!("failed to leave voice in {}: {}", self.guild_id, e);
                }
            })
            .await;

        if let Some(channel_id) = channel_id {
            log::info!("left {} / {}", self.guild_id, channel_id);
        }

        None
    }
}
