//! Prefix command table and parsing.
//!
//! Every text command is described once in [`COMMANDS`]: its canonical name,
//! aliases, usage line and help text. [`parse`] turns a message body into an
//! [`Invocation`]; the bot dispatches on [`Command`].

use thiserror::Error;

use crate::{prompt::PromptError, storage::PlaylistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Help,
    // Misceláneos
    Raccoon,
    Inspirobot,
    Fact,
    Wikia,
    Fandom,
    Lyrics,
    Link,
    Changelog,
    Tts,
    // Música
    Play,
    Force,
    Seek,
    Skip,
    Stop,
    Clear,
    Now,
    CurrentLyrics,
    Queue,
    Pause,
    Volume,
    Shuffle,
    QueueShuffle,
    Repeat,
    Remove,
    Disconnect,
    Join,
    // Playlists
    Save,
    Load,
    Delete,
    Playlists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Music,
    Playlists,
}

impl Category {
    pub fn title(self) -> &'static str {
        match self {
            Category::General => "🦝 General",
            Category::Music => "🎵 Música",
            Category::Playlists => "💾 Playlists",
        }
    }
}

#[derive(Debug)]
pub struct CommandSpec {
    pub command: Command,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Argumentos, sin el prefijo ni el nombre
    pub args: &'static str,
    pub help: &'static str,
    pub category: Category,
}

impl CommandSpec {
    /// Línea de uso con el prefijo, p. ej. `!play|p <enlace o búsqueda>`
    pub fn usage(&self, prefix: &str) -> String {
        let mut names = vec![self.name];
        names.extend_from_slice(self.aliases);

        let mut usage = format!("{}{}", prefix, names.join("|"));
        if !self.args.is_empty() {
            usage.push(' ');
            usage.push_str(self.args);
        }
        usage
    }
}

macro_rules! command {
    ($command:ident, $name:literal, [$($alias:literal),*], $args:literal, $category:ident, $help:literal) => {
        CommandSpec {
            command: Command::$command,
            name: $name,
            aliases: &[$($alias),*],
            args: $args,
            help: $help,
            category: Category::$category,
        }
    };
}

pub const COMMANDS: &[CommandSpec] = &[
    command!(Help, "help", [], "[comando]", General, "Muestra los comandos o la ayuda de uno"),
    command!(Raccoon, "raccoon", ["racc"], "[texto]", General, "Un mapache al azar que hará tu día mejor"),
    command!(Inspirobot, "inspirobot", ["inspire"], "[texto]", General, "Genera una imagen \"inspiradora\""),
    command!(Fact, "fact", ["facts"], "[texto]", General, "Un dato curioso al azar"),
    command!(Wikia, "wikia", ["wiki"], "<búsqueda>", General, "Busca un artículo en las wikis de Fandom"),
    command!(Fandom, "fandom", [], "<wiki>", General, "Elige una wiki de Fandom y luego busca dentro de ella"),
    command!(Lyrics, "lyrics", ["l"], "<canción>", General, "Busca la letra de una canción"),
    command!(Link, "link", [], "[canal]", General, "Enlace directo a un canal de voz"),
    command!(Changelog, "changelog", [], "", General, "Últimos cambios del bot"),
    command!(Tts, "tts", ["say"], "<texto>", General, "Convierte texto en voz y lo envía como audio"),
    command!(Play, "play", ["p"], "<enlace o búsqueda>", Music, "Reproduce una canción o la agrega a la cola"),
    command!(Force, "force", ["fp"], "<enlace o búsqueda>", Music, "Agrega una canción al principio de la cola"),
    command!(Seek, "seek", [], "<segundos>", Music, "Adelanta o retrocede la canción actual"),
    command!(Skip, "skip", [], "", Music, "Salta la canción actual"),
    command!(Stop, "stop", [], "", Music, "Detiene la música, limpia la cola y sale del canal"),
    command!(Clear, "clear", [], "", Music, "Limpia la cola"),
    command!(Now, "now", ["n", "np", "playing", "current"], "", Music, "Muestra la canción actual"),
    command!(CurrentLyrics, "currentlyrics", ["nl", "npl", "cl"], "", Music, "Letra de la canción actual"),
    command!(Queue, "queue", ["q", "list"], "", Music, "Muestra la cola de reproducción"),
    command!(Pause, "pause", ["resume"], "", Music, "Pausa o reanuda la reproducción"),
    command!(Volume, "volume", ["vol"], "[1-1000]", Music, "Muestra o cambia el volumen"),
    command!(Shuffle, "shuffle", [], "", Music, "Activa o desactiva el orden aleatorio"),
    command!(QueueShuffle, "qshuffle", ["qs"], "", Music, "Mezcla la cola actual"),
    command!(Repeat, "repeat", ["loop"], "", Music, "Activa o desactiva la repetición de la cola"),
    command!(Remove, "remove", [], "<posición>", Music, "Quita una canción de la cola"),
    command!(Disconnect, "disconnect", ["dc", "leave"], "", Music, "Sale del canal de voz"),
    command!(Join, "join", ["connect", "c"], "", Music, "Entra a tu canal de voz"),
    command!(Save, "save", [], "<nombre>", Playlists, "Guarda la cola actual como playlist"),
    command!(Load, "load", [], "<nombre>", Playlists, "Agrega un playlist guardado a la cola"),
    command!(Delete, "delete", [], "<nombre>", Playlists, "Borra un playlist guardado"),
    command!(Playlists, "playlists", [], "", Playlists, "Lista tus playlists guardados"),
];

/// Busca un comando por nombre o alias (sin distinguir mayúsculas)
pub fn lookup(word: &str) -> Option<&'static CommandSpec> {
    let word = word.to_lowercase();
    COMMANDS
        .iter()
        .find(|spec| spec.name == word || spec.aliases.contains(&word.as_str()))
}

/// Un comando reconocido y el resto del mensaje
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: Command,
    pub args: &'a str,
}

impl Invocation<'_> {
    pub fn spec(&self) -> &'static CommandSpec {
        spec(self.command)
    }
}

pub fn spec(command: Command) -> &'static CommandSpec {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .unwrap_or(&COMMANDS[0])
}

/// Parses `content` as a prefixed command. Unknown words yield `None`.
pub fn parse<'a>(content: &'a str, prefix: &str) -> Option<Invocation<'a>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let rest = rest.trim_start();

    let (word, args) = match rest.find(char::is_whitespace) {
        Some(end) => (&rest[..end], rest[end..].trim()),
        None => (rest, ""),
    };
    if word.is_empty() {
        return None;
    }

    lookup(word).map(|spec| Invocation {
        command: spec.command,
        args,
    })
}

/// Fallos de comandos que se muestran tal cual al usuario
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Uso: `{0}`")]
    Usage(String),
    #[error("{0}")]
    Voice(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Esta función no está configurada en el bot")]
    Unavailable,
}

impl CommandError {
    pub fn usage(command: Command, prefix: &str) -> Self {
        CommandError::Usage(spec(command).usage(prefix))
    }
}

/// How a failed command is reported back in the channel.
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorReport {
    /// Expected failure, shown verbatim.
    User(String),
    /// Unexpected failure, shown as a generic error notice and logged.
    Internal(String),
}

pub fn describe_error(err: &anyhow::Error) -> ErrorReport {
    if let Some(e) = err.downcast_ref::<CommandError>() {
        return ErrorReport::User(e.to_string());
    }
    if let Some(e) = err.downcast_ref::<PlaylistError>() {
        return ErrorReport::User(e.to_string());
    }
    if let Some(PromptError::NoCandidates) = err.downcast_ref::<PromptError>() {
        return ErrorReport::User("🔍 No se encontró nada".to_string());
    }
    ErrorReport::Internal(format!("{:#}", err))
}

/// Texto de ayuda por categoría: `(título, líneas)`
pub fn help_sections(prefix: &str) -> Vec<(String, String)> {
    [Category::General, Category::Music, Category::Playlists]
        .into_iter()
        .map(|category| {
            let lines = COMMANDS
                .iter()
                .filter(|spec| spec.category == category)
                .map(|spec| format!("`{}{}` {}", prefix, spec.name, spec.help))
                .collect::<Vec<_>>()
                .join("\n");
            (category.title().to_string(), lines)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_name_and_arguments() {
        assert_eq!(
            parse("!play never gonna give you up", "!"),
            Some(Invocation {
                command: Command::Play,
                args: "never gonna give you up"
            })
        );
        assert_eq!(
            parse("!skip", "!"),
            Some(Invocation {
                command: Command::Skip,
                args: ""
            })
        );
    }

    #[test]
    fn resolves_aliases_case_insensitively() {
        assert_eq!(parse("!NP", "!").map(|i| i.command), Some(Command::Now));
        assert_eq!(parse("!fp  song  ", "!").map(|i| (i.command, i.args)), Some((Command::Force, "song")));
        assert_eq!(parse("mp!q", "mp!").map(|i| i.command), Some(Command::Queue));
        assert_eq!(parse("!resume", "!").map(|i| i.command), Some(Command::Pause));
    }

    #[test]
    fn ignores_plain_text_and_unknown_commands() {
        assert_eq!(parse("hola", "!"), None);
        assert_eq!(parse("!", "!"), None);
        assert_eq!(parse("!gachibass", "!"), None);
        assert_eq!(parse("?play x", "!"), None);
    }

    #[test]
    fn names_and_aliases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for spec in COMMANDS {
            assert!(seen.insert(spec.name), "duplicado: {}", spec.name);
            for alias in spec.aliases {
                assert!(seen.insert(alias), "duplicado: {}", alias);
            }
        }
    }

    #[test]
    fn every_command_has_an_entry() {
        for spec in COMMANDS {
            assert_eq!(self::spec(spec.command).name, spec.name);
        }
    }

    #[test]
    fn usage_lists_aliases_with_prefix() {
        assert_eq!(lookup("vol").unwrap().usage("!"), "!volume|vol [1-1000]");
        assert_eq!(lookup("skip").unwrap().usage(">"), ">skip");
        assert_eq!(
            CommandError::usage(Command::Play, "!").to_string(),
            "Uso: `!play|p <enlace o búsqueda>`"
        );
    }

    #[test]
    fn expected_errors_are_shown_verbatim() {
        let err = anyhow::Error::new(CommandError::Voice("Primero conéctate a un canal de voz".into()));
        assert_eq!(
            describe_error(&err),
            ErrorReport::User("Primero conéctate a un canal de voz".into())
        );

        let err = anyhow::Error::new(PlaylistError::NotFound("mix".into()));
        assert!(matches!(describe_error(&err), ErrorReport::User(_)));

        let err = anyhow::anyhow!("timeout").context("Error al buscar tracks");
        assert_eq!(
            describe_error(&err),
            ErrorReport::Internal("Error al buscar tracks: timeout".into())
        );
    }

    #[test]
    fn help_has_every_category() {
        let sections = help_sections("!");
        assert_eq!(sections.len(), 3);
        assert!(sections[1].1.contains("`!play` Reproduce"));
    }
}
