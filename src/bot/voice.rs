//! Voice channel enforcement for music commands and the songbird gateway
//! connection whose session is handed to the audio node.

use anyhow::Result;
use serenity::{
    model::{
        id::{ChannelId, GuildId, UserId},
        permissions::Permissions,
    },
    prelude::Context,
};
use tracing::{debug, info};

use super::router::{Command, CommandError};
use crate::audio::{lavalink::VoiceServer, player::PlayerManager};

/// Qué exige un comando respecto al canal de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRequirement {
    /// Sin comprobaciones
    Ignored,
    /// Puede conectar al bot al canal del autor
    Connect,
    /// El bot ya debe estar en el canal del autor
    SameChannel,
}

pub fn requirement(command: Command) -> VoiceRequirement {
    match command {
        Command::Volume | Command::Shuffle | Command::Playlists | Command::Delete => {
            VoiceRequirement::Ignored
        }
        Command::Play | Command::Force | Command::Join | Command::Load => VoiceRequirement::Connect,
        _ => VoiceRequirement::SameChannel,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAction {
    Stay,
    Join(ChannelId),
}

/// Decides whether a command may run given where the author and the bot are.
pub fn check(
    requirement: VoiceRequirement,
    author: Option<ChannelId>,
    bot: Option<ChannelId>,
) -> Result<VoiceAction, CommandError> {
    if requirement == VoiceRequirement::Ignored {
        return Ok(VoiceAction::Stay);
    }

    let Some(author) = author else {
        return Err(CommandError::Voice("🔇 Primero conéctate a un canal de voz".into()));
    };

    match (bot, requirement) {
        (Some(bot), _) if bot == author => Ok(VoiceAction::Stay),
        (_, VoiceRequirement::Connect) => Ok(VoiceAction::Join(author)),
        (None, _) => Err(CommandError::Voice("🔇 No estoy conectado a un canal de voz".into())),
        (Some(_), _) => Err(CommandError::Voice("🔇 Estamos en canales de voz distintos".into())),
    }
}

/// The bot needs to connect and speak in the channel it is asked to join.
pub fn can_join(permissions: Permissions) -> Result<(), CommandError> {
    if permissions.contains(Permissions::CONNECT | Permissions::SPEAK) {
        Ok(())
    } else {
        Err(CommandError::Voice(
            "🔒 Necesito los permisos `CONNECT` y `SPEAK` en tu canal de voz".into(),
        ))
    }
}

/// Permisos del bot en un canal según la caché
pub fn bot_permissions(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<Permissions> {
    let bot_id = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id)?;
    let channel = guild.channels.get(&channel_id)?;
    let member = guild.members.get(&bot_id)?;
    Some(guild.user_permissions_in(channel, member))
}

/// Canal de voz del autor y del bot según la caché
pub fn voice_channels(ctx: &Context, guild_id: GuildId, user_id: UserId) -> (Option<ChannelId>, Option<ChannelId>) {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return (None, None);
    };

    let channel_of = |id: UserId| guild.voice_states.get(&id).and_then(|state| state.channel_id);
    (channel_of(user_id), channel_of(bot_id))
}

/// True when every occupant is a bot. Unknown members count as people.
pub fn only_bots<I>(occupants: I) -> bool
where
    I: IntoIterator<Item = Option<bool>>,
{
    occupants.into_iter().all(|is_bot| is_bot == Some(true))
}

/// The bot's voice channel, when nobody but bots is left in it.
pub fn bot_is_alone(ctx: &Context, guild_id: GuildId) -> Option<ChannelId> {
    let bot_id = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&bot_id)?.channel_id?;

    let occupants = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .map(|state| {
            state
                .member
                .as_ref()
                .or_else(|| guild.members.get(&state.user_id))
                .map(|member| member.user.bot)
        });

    only_bots(occupants).then_some(channel_id)
}

/// Joins through the gateway only and forwards the voice session to the node.
pub async fn join(ctx: &Context, player: &PlayerManager, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    let (info, _call) = manager
        .join_gateway(guild_id, channel_id)
        .await
        .map_err(|e| anyhow::anyhow!("Error al conectar al canal de voz: {:?}", e))?;
    debug!("Sesión de voz obtenida: {}", info.endpoint);

    player
        .connect(
            guild_id,
            VoiceServer {
                token: info.token,
                endpoint: info.endpoint,
                session_id: info.session_id,
            },
        )
        .await?;

    info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
    Ok(())
}

pub async fn leave(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    if manager.get(guild_id).is_some() {
        manager.remove(guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u64) -> Option<ChannelId> {
        Some(ChannelId::new(id))
    }

    #[test]
    fn exempt_commands_skip_every_check() {
        for command in [Command::Volume, Command::Shuffle, Command::Playlists, Command::Delete] {
            assert_eq!(requirement(command), VoiceRequirement::Ignored);
            assert_eq!(check(requirement(command), None, None), Ok(VoiceAction::Stay));
        }
    }

    #[test]
    fn author_must_be_in_voice() {
        assert!(matches!(
            check(VoiceRequirement::Connect, None, channel(1)),
            Err(CommandError::Voice(_))
        ));
        assert!(matches!(
            check(VoiceRequirement::SameChannel, None, None),
            Err(CommandError::Voice(_))
        ));
    }

    #[test]
    fn connecting_commands_join_or_move() {
        assert_eq!(requirement(Command::Play), VoiceRequirement::Connect);
        assert_eq!(requirement(Command::Load), VoiceRequirement::Connect);
        assert_eq!(
            check(VoiceRequirement::Connect, channel(1), None),
            Ok(VoiceAction::Join(ChannelId::new(1)))
        );
        assert_eq!(
            check(VoiceRequirement::Connect, channel(1), channel(2)),
            Ok(VoiceAction::Join(ChannelId::new(1)))
        );
        assert_eq!(check(VoiceRequirement::Connect, channel(1), channel(1)), Ok(VoiceAction::Stay));
    }

    #[test]
    fn other_commands_need_the_same_channel() {
        assert_eq!(requirement(Command::Skip), VoiceRequirement::SameChannel);
        assert_eq!(requirement(Command::Save), VoiceRequirement::SameChannel);
        assert_eq!(check(VoiceRequirement::SameChannel, channel(3), channel(3)), Ok(VoiceAction::Stay));
        assert_eq!(
            check(VoiceRequirement::SameChannel, channel(3), None),
            Err(CommandError::Voice("🔇 No estoy conectado a un canal de voz".into()))
        );
        assert_eq!(
            check(VoiceRequirement::SameChannel, channel(3), channel(4)),
            Err(CommandError::Voice("🔇 Estamos en canales de voz distintos".into()))
        );
    }

    #[test]
    fn joining_needs_connect_and_speak() {
        assert!(can_join(Permissions::CONNECT | Permissions::SPEAK | Permissions::VIEW_CHANNEL).is_ok());
        assert_eq!(
            can_join(Permissions::CONNECT),
            Err(CommandError::Voice(
                "🔒 Necesito los permisos `CONNECT` y `SPEAK` en tu canal de voz".into()
            ))
        );
        assert!(matches!(can_join(Permissions::SPEAK), Err(CommandError::Voice(_))));
        assert!(matches!(can_join(Permissions::empty()), Err(CommandError::Voice(_))));
    }

    #[test]
    fn alone_only_with_bots() {
        assert!(only_bots([Some(true), Some(true)]));
        assert!(!only_bots([Some(true), Some(false)]));
        assert!(!only_bots([Some(true), None]));
        assert!(only_bots(std::iter::empty()));
    }
}
