//! # Audio Module
//!
//! Music playback proxied to a remote Lavalink node.
//!
//! The node does the heavy lifting (search, decoding, streaming to Discord).
//! This module keeps the per-guild state the node does not know about:
//!
//! ### [`lavalink`] - Node Client
//! - REST calls for loading tracks and updating players
//! - Websocket listener for the session id, positions and track events
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with front insertion
//! - Shuffle (random next pick) and repeat (queue loop) modes
//!
//! ### [`player`] - Player Manager
//! - One [`player::GuildPlayer`] per guild: queue, volume, pause, position
//! - Advances the queue when the node reports a finished track

pub mod lavalink;
pub mod player;
pub mod queue;
