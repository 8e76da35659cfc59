use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::lavalink::Track;

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub track: Track,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(track: Track, requested_by: UserId) -> Self {
        Self {
            track,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        self.track.title()
    }
}

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    repeat: bool,
    shuffle: bool,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            repeat: false,
            shuffle: false,
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn add_track(&mut self, item: QueueItem) -> Result<()> {
        self.ensure_space()?;
        info!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);
        Ok(())
    }

    /// Agrega un track al principio de la cola
    pub fn add_front(&mut self, item: QueueItem) -> Result<()> {
        self.ensure_space()?;
        info!("⏫ Agregado al principio de la cola: {}", item.title());
        self.items.push_front(item);
        Ok(())
    }

    /// Agrega múltiples tracks (playlist). Devuelve cuántos entraron.
    pub fn add_playlist(&mut self, tracks: Vec<Track>, requested_by: UserId) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let to_add = tracks.len().min(available_space);

        self.items.extend(
            tracks
                .into_iter()
                .take(to_add)
                .map(|track| QueueItem::new(track, requested_by)),
        );

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    /// Avanza al siguiente track.
    ///
    /// With repeat on, the finished track goes back to the end of the queue.
    /// With shuffle on, the next track is picked at random instead of FIFO.
    pub fn next_track(&mut self) -> Option<&QueueItem> {
        if let Some(finished) = self.current.take() {
            if self.repeat && self.items.len() < self.max_size {
                debug!("🔁 Track devuelto a la cola: {}", finished.title());
                self.items.push_back(finished);
            }
        }

        let next = if self.shuffle && !self.items.is_empty() {
            let index = rand::thread_rng().gen_range(0..self.items.len());
            self.items.remove(index)
        } else {
            self.items.pop_front()
        };

        match next {
            Some(item) => {
                info!("➡️ Siguiente en cola: {}", item.title());
                self.current = Some(item);
                self.current.as_ref()
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                None
            }
        }
    }

    /// Olvida el track actual sin avanzar la cola
    pub fn finish_current(&mut self) -> Option<QueueItem> {
        self.current.take()
    }

    /// Devuelve el track actual al principio de la cola sin reproducirlo
    pub fn requeue_current(&mut self) {
        if let Some(item) = self.current.take() {
            debug!("↩️ Track devuelto al principio de la cola: {}", item.title());
            self.items.push_front(item);
        }
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Mezcla la cola
    pub fn shuffle_queue(&mut self) {
        self.items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
    }

    /// Activa/desactiva la repetición de la cola
    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        if self.repeat {
            info!("🔁 Repetir cola activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.repeat
    }

    /// Elimina el track en la posición `position` (1-based, como se muestra)
    pub fn remove_track(&mut self, position: usize) -> Result<QueueItem> {
        if position == 0 || position > self.items.len() {
            anyhow::bail!("Índice fuera de rango");
        }

        let removed = self
            .items
            .remove(position - 1)
            .ok_or_else(|| anyhow::anyhow!("No se pudo remover el item"))?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }

    pub fn items(&self) -> impl ExactSizeIterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Current track first, then the queued ones.
    pub fn snapshot(&self) -> Vec<Track> {
        self.current
            .iter()
            .chain(self.items.iter())
            .map(|item| item.track.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn ensure_space(&self) -> Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_track(title: &str) -> Track {
    use super::lavalink::TrackInfo;

    Track {
        encoded: format!("enc-{}", title),
        info: TrackInfo {
            identifier: title.to_string(),
            is_seekable: true,
            author: "tester".to_string(),
            length: 180_000,
            is_stream: false,
            position: 0,
            title: title.to_string(),
            uri: Some(format!("https://example.com/{}", title)),
            artwork_url: None,
            source_name: "http".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user() -> UserId {
        UserId::new(7)
    }

    fn queue_of(titles: &[&str]) -> MusicQueue {
        let mut queue = MusicQueue::new(100);
        for title in titles {
            queue.add_track(QueueItem::new(test_track(title), user())).unwrap();
        }
        queue
    }

    fn next_title(queue: &mut MusicQueue) -> Option<String> {
        queue.next_track().map(|item| item.title().to_string())
    }

    #[test]
    fn plays_in_arrival_order() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(next_title(&mut queue).as_deref(), Some("a"));
        assert_eq!(next_title(&mut queue).as_deref(), Some("b"));
        assert_eq!(next_title(&mut queue).as_deref(), Some("c"));
        assert_eq!(next_title(&mut queue), None);
        assert!(queue.current().is_none());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn add_front_jumps_the_line() {
        let mut queue = queue_of(&["a", "b"]);
        queue.add_front(QueueItem::new(test_track("urgent"), user())).unwrap();
        assert_eq!(next_title(&mut queue).as_deref(), Some("urgent"));
        assert_eq!(next_title(&mut queue).as_deref(), Some("a"));
    }

    #[test]
    fn repeat_loops_the_whole_queue() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(queue.toggle_repeat());

        let played: Vec<_> = (0..5).filter_map(|_| next_title(&mut queue)).collect();
        assert_eq!(played, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn shuffle_picks_from_queued_items() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_shuffle(true);

        let mut played: Vec<_> = (0..3).filter_map(|_| next_title(&mut queue)).collect();
        played.sort();
        assert_eq!(played, vec!["a", "b", "c"]);
        assert_eq!(next_title(&mut queue), None);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut queue = MusicQueue::new(2);
        queue.add_track(QueueItem::new(test_track("a"), user())).unwrap();
        queue.add_track(QueueItem::new(test_track("b"), user())).unwrap();
        assert!(queue.add_track(QueueItem::new(test_track("c"), user())).is_err());
        assert!(queue.add_front(QueueItem::new(test_track("c"), user())).is_err());

        let mut queue = MusicQueue::new(2);
        let added = queue.add_playlist(vec![test_track("x"), test_track("y"), test_track("z")], user());
        assert_eq!(added, 2);
    }

    #[test]
    fn remove_uses_display_positions() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.remove_track(2).unwrap().title(), "b");
        assert!(queue.remove_track(0).is_err());
        assert!(queue.remove_track(3).is_err());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn snapshot_starts_with_current() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.next_track();
        let titles: Vec<_> = queue.snapshot().iter().map(|t| t.title().to_string()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn shuffle_queue_keeps_items() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        queue.shuffle_queue();
        let mut titles: Vec<_> = queue.items().map(|item| item.title().to_string()).collect();
        titles.sort();
        assert_eq!(titles, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn requeued_current_is_next_again() {
        let mut queue = queue_of(&["a", "b"]);
        queue.next_track();
        queue.requeue_current();
        assert!(queue.current().is_none());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_track().unwrap().title(), "a");
    }
}
