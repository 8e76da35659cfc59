//! # Bot Module
//!
//! Discord side of Mapache Bot: the [`Bot`] event handler, the prefix
//! command router and the command handlers.
//!
//! ## Architecture
//!
//! [`Bot`] implements Serenity's [`EventHandler`]. Every guild message that
//! starts with the configured prefix is parsed by [`router::parse`] and
//! dispatched to [`misc`] or [`music`]. Handlers return `anyhow::Result`;
//! expected failures ([`router::CommandError`], playlist errors) are shown
//! verbatim, anything else as a generic error notice.
//!
//! The bot owns explicit handles to its services:
//!
//! - [`PlayerManager`] for queues and the audio node
//! - [`JsonStorage`] for guild settings and playlists
//! - the Fandom, Genius and speech clients

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    gateway::ActivityData,
    model::channel::ReactionType,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod misc;
pub mod music;
pub mod router;
pub mod voice;

use crate::{
    audio::player::PlayerManager,
    config::Config,
    prompt::{
        discord::{inbound_messages, ChannelSurface},
        Candidate, ChoicePrompt, Outcome, PromptScope,
    },
    sources::{FandomClient, GeniusClient, Resources, SpeechClient},
    storage::JsonStorage,
    ui::embeds,
};
use router::{Category, Command, ErrorReport, Invocation};

/// Main Discord event handler.
///
/// All services are shared handles, so command handlers only borrow the bot.
pub struct Bot {
    pub config: Arc<Config>,
    /// Ajustes por servidor y playlists guardados
    pub storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    pub player: Arc<PlayerManager>,
    pub http: reqwest::Client,
    pub fandom: FandomClient,
    /// `None` sin `GENIUS_TOKEN`
    pub genius: Option<GeniusClient>,
    /// `None` sin `GOOGLE_API_KEY`
    pub speech: Option<SpeechClient>,
    pub resources: Resources,
}

impl Bot {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<tokio::sync::Mutex<JsonStorage>>,
        player: Arc<PlayerManager>,
        http: reqwest::Client,
        resources: Resources,
    ) -> Self {
        let genius = config
            .genius_token
            .clone()
            .map(|token| GeniusClient::new(http.clone(), token));
        let speech = config
            .google_api_key
            .clone()
            .map(|key| SpeechClient::new(http.clone(), key));

        Self {
            fandom: FandomClient::new(http.clone()),
            genius,
            speech,
            config,
            storage,
            player,
            http,
            resources,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.config.command_prefix
    }

    async fn dispatch(&self, ctx: &Context, msg: &Message, invocation: Invocation<'_>) -> Result<()> {
        let spec = invocation.spec();
        match spec.category {
            Category::Music | Category::Playlists => {
                music::run(self, ctx, msg, invocation.command, invocation.args).await
            }
            Category::General if invocation.command == Command::Help => {
                self.help(ctx, msg, invocation.args).await
            }
            Category::General => misc::run(self, ctx, msg, invocation.command, invocation.args).await,
        }
    }

    async fn help(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
        let embed = if args.is_empty() {
            embeds::create_help_embed(
                "🦝 Mapache Bot",
                &format!("Usa `{}help <comando>` para ver los detalles de un comando", self.prefix()),
                router::help_sections(self.prefix()),
            )
        } else {
            let spec = router::lookup(args.trim_start_matches(self.prefix())).ok_or_else(|| {
                router::CommandError::NotFound(format!("❓ No existe el comando `{}`", args))
            })?;
            embeds::create_help_embed(
                &format!("📖 {}{}", self.prefix(), spec.name),
                &format!("{}\n\n**Uso:** `{}`", spec.help, spec.usage(self.prefix())),
                Vec::new(),
            )
        };

        send_embed(ctx, msg, embed).await
    }

    async fn report_error(&self, ctx: &Context, msg: &Message, err: anyhow::Error) {
        let sent = match router::describe_error(&err) {
            ErrorReport::User(text) => {
                debug!("Comando rechazado: {}", text);
                msg.channel_id.say(&ctx.http, text).await.map(|_| ())
            }
            ErrorReport::Internal(text) => {
                error!("❌ Error en comando '{}': {}", msg.content, text);
                msg.channel_id
                    .send_message(
                        &ctx.http,
                        CreateMessage::new().embed(embeds::create_error_embed("Error", &text)),
                    )
                    .await
                    .map(|_| ())
            }
        };

        if let Err(e) = sent {
            warn!("No se pudo informar el error: {:?}", e);
        }
    }

    /// Numbered choice prompt for the author of `msg`. `None` when the
    /// author cancelled or let it time out.
    pub async fn choose<T: Candidate>(
        &self,
        ctx: &Context,
        msg: &Message,
        title: &str,
        candidates: Vec<T>,
    ) -> Result<Option<T>> {
        let inbound = inbound_messages(ctx, msg.channel_id);
        let surface = ChannelSurface::new(ctx.http.clone(), msg.channel_id);

        let outcome = ChoicePrompt::new(&surface, PromptScope::new(msg.channel_id, msg.author.id), self.prefix())
            .timeout(self.config.choice_timeout)
            .choose(title, candidates, inbound)
            .await?;

        log_outcome(&outcome);
        Ok(outcome.selected())
    }

    /// Free-text follow-up question for the author of `msg`.
    pub async fn ask(&self, ctx: &Context, msg: &Message, title: &str, description: &str) -> Result<Option<String>> {
        let inbound = inbound_messages(ctx, msg.channel_id);
        let surface = ChannelSurface::new(ctx.http.clone(), msg.channel_id);

        let outcome = ChoicePrompt::new(&surface, PromptScope::new(msg.channel_id, msg.author.id), self.prefix())
            .timeout(self.config.follow_up_timeout)
            .ask(title, description, inbound)
            .await?;

        log_outcome(&outcome);
        Ok(outcome.selected())
    }
}

fn log_outcome<T>(outcome: &Outcome<T>) {
    match outcome {
        Outcome::Selected(_) => debug!("💬 Prompt respondido"),
        Outcome::Cancelled => debug!("💬 Prompt cancelado"),
        Outcome::TimedOut => debug!("⌛ Prompt sin respuesta"),
    }
}

pub async fn send_embed(ctx: &Context, msg: &Message, embed: CreateEmbed) -> Result<()> {
    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

pub async fn say(ctx: &Context, msg: &Message, text: impl Into<String>) -> Result<()> {
    msg.channel_id.say(&ctx.http, text).await?;
    Ok(())
}

/// Confirma el comando con 👌
pub async fn acknowledge(ctx: &Context, msg: &Message) -> Result<()> {
    msg.react(&ctx.http, ReactionType::Unicode("👌".to_string())).await?;
    Ok(())
}

#[async_trait]
impl EventHandler for Bot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🦝 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::listening(format!("{}help", self.prefix()))));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }
        let Some(invocation) = router::parse(&msg.content, self.prefix()) else {
            return;
        };

        info!(
            "⚡ Comando {} de {} en guild {:?}",
            invocation.spec().name,
            msg.author.name,
            msg.guild_id
        );

        if let Err(e) = self.dispatch(&ctx, &msg, invocation).await {
            self.report_error(&ctx, &msg, e).await;
        }
    }

    /// Cleans up when the bot is disconnected and leaves when only bots remain.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            if old.is_some() && new.channel_id.is_none() && self.player.get(guild_id).is_some() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if let Err(e) = self.player.stop(guild_id).await {
                    error!("Error al detener reproducción: {:?}", e);
                }
            }
            return;
        }

        let left = old.and_then(|state| state.channel_id).filter(|&channel| new.channel_id != Some(channel));
        let Some(left) = left else {
            return;
        };

        if voice::bot_is_alone(&ctx, guild_id) == Some(left) {
            info!("🚪 Solo quedan bots en el canal, saliendo de guild {}", guild_id);
            if let Err(e) = self.player.stop(guild_id).await {
                error!("Error al detener reproducción: {:?}", e);
            }
            if let Err(e) = voice::leave(&ctx, guild_id).await {
                error!("Error al salir del canal de voz: {:?}", e);
            }
        }
    }
}
