use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::audio::lavalink::Track;

/// Longitud máxima del nombre de un playlist
pub const MAX_PLAYLIST_NAME: usize = 100;

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub volume: u16,
    #[serde(default)]
    pub shuffle: bool,
}

/// Playlist guardado por un usuario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPlaylist {
    pub name: String,
    pub owner_id: u64,
    pub saved_at: DateTime<Utc>,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("❌ Caracteres no permitidos en el nombre del playlist")]
    InvalidName,
    #[error("❌ Nombre de playlist demasiado largo (máximo {} caracteres)", MAX_PLAYLIST_NAME)]
    TooLong,
    #[error("❌ Ya existe un playlist llamado **{0}**. Bórralo primero con `delete`")]
    AlreadyExists(String),
    #[error("❌ No tienes un playlist llamado **{0}**. Usa `playlists` para ver los tuyos")]
    NotFound(String),
}

/// Normaliza y valida un nombre de playlist para usarlo en un archivo
pub fn playlist_file_name(name: &str) -> Result<String, PlaylistError> {
    let name = name.trim().to_lowercase();

    if name.chars().count() > MAX_PLAYLIST_NAME {
        return Err(PlaylistError::TooLong);
    }

    let forbidden = |c: char| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.ends_with('.')
        || name.ends_with(' ')
        || name.chars().any(forbidden)
    {
        return Err(PlaylistError::InvalidName);
    }

    Ok(name)
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    default_volume: u16,
    servers_cache: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf, default_volume: u16) -> Result<Self> {
        fs::create_dir_all(data_dir.join("servers")).await?;
        fs::create_dir_all(data_dir.join("playlists")).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            default_volume,
            servers_cache: HashMap::new(),
        };

        // Cargar configuraciones existentes
        storage.load_all_servers().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de un servidor
    pub async fn guild_settings(&mut self, guild_id: u64) -> Result<GuildSettings> {
        if let Some(settings) = self.servers_cache.get(&guild_id) {
            return Ok(settings.clone());
        }

        match self.load_guild_settings(guild_id).await {
            Ok(settings) => {
                self.servers_cache.insert(guild_id, settings.clone());
                Ok(settings)
            }
            Err(_) => {
                let settings = GuildSettings {
                    guild_id,
                    volume: self.default_volume,
                    shuffle: false,
                };

                self.save_guild_settings(&settings).await?;
                self.servers_cache.insert(guild_id, settings.clone());

                info!("📝 Configuración por defecto creada para guild {}", guild_id);
                Ok(settings)
            }
        }
    }

    /// Actualiza la configuración de un servidor
    pub async fn update_guild_settings(&mut self, settings: GuildSettings) -> Result<()> {
        let guild_id = settings.guild_id;
        self.save_guild_settings(&settings).await?;
        self.servers_cache.insert(guild_id, settings);

        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }

    pub async fn set_volume(&mut self, guild_id: u64, volume: u16) -> Result<()> {
        let mut settings = self.guild_settings(guild_id).await?;
        settings.volume = volume;
        self.update_guild_settings(settings).await
    }

    pub async fn set_shuffle(&mut self, guild_id: u64, shuffle: bool) -> Result<()> {
        let mut settings = self.guild_settings(guild_id).await?;
        settings.shuffle = shuffle;
        self.update_guild_settings(settings).await
    }

    /// Guarda la cola como playlist. Nunca sobreescribe uno existente.
    pub async fn save_playlist(&self, owner_id: u64, name: &str, tracks: Vec<Track>) -> Result<usize> {
        let name = playlist_file_name(name)?;
        let path = self.playlist_path(owner_id, &name);

        if fs::try_exists(&path).await? {
            return Err(PlaylistError::AlreadyExists(name).into());
        }

        let count = tracks.len();
        let playlist = SavedPlaylist {
            name,
            owner_id,
            saved_at: Utc::now(),
            tracks,
        };
        fs::write(&path, serde_json::to_string_pretty(&playlist)?).await?;

        info!("💾 Playlist {} guardado ({} tracks)", playlist.name, count);
        Ok(count)
    }

    pub async fn load_playlist(&self, owner_id: u64, name: &str) -> Result<SavedPlaylist> {
        let name = playlist_file_name(name)?;
        let path = self.playlist_path(owner_id, &name);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaylistError::NotFound(name).into())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&content)?)
    }

    pub async fn delete_playlist(&self, owner_id: u64, name: &str) -> Result<()> {
        let name = playlist_file_name(name)?;
        let path = self.playlist_path(owner_id, &name);

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️ Playlist {} eliminado", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PlaylistError::NotFound(name).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Nombres de los playlists de un usuario, ordenados
    pub async fn list_playlists(&self, owner_id: u64) -> Result<Vec<String>> {
        let prefix = format!("{}_", owner_id);
        let mut files = fs::read_dir(self.data_dir.join("playlists")).await?;
        let mut names = Vec::new();

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(name) = path
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(&prefix))
                {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    // Métodos privados

    async fn load_guild_settings(&self, guild_id: u64) -> Result<GuildSettings> {
        let content = fs::read_to_string(self.guild_file_path(guild_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_guild_settings(&self, settings: &GuildSettings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(self.guild_file_path(settings.guild_id), content).await?;
        Ok(())
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let mut files = fs::read_dir(self.data_dir.join("servers")).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok());

            if let Some(guild_id) = guild_id {
                match self.load_guild_settings(guild_id).await {
                    Ok(settings) => {
                        self.servers_cache.insert(guild_id, settings);
                        loaded_count += 1;
                    }
                    Err(e) => {
                        warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                    }
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }
        debug!("Configuraciones en caché: {}", self.servers_cache.len());

        Ok(())
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }

    fn playlist_path(&self, owner_id: u64, name: &str) -> PathBuf {
        self.data_dir
            .join("playlists")
            .join(format!("{}_{}.json", owner_id, name))
    }
}
