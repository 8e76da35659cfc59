//! Paged queue view driven by reaction controls.
//!
//! The view is a small state machine over `{page, pages}`. Each received
//! control symbol maps to a [`PagerAction`] through [`Pager::apply`]; the
//! caller redraws, reloads or closes the message accordingly and re-applies the
//! affordances returned by [`Pager::controls`].

/// Símbolos de control del paginador
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagerControl {
    First,
    Prev,
    Next,
    Last,
    Refresh,
    Close,
}

impl PagerControl {
    pub fn emoji(self) -> char {
        match self {
            PagerControl::First => '⏮',
            PagerControl::Prev => '◀',
            PagerControl::Next => '▶',
            PagerControl::Last => '⏭',
            PagerControl::Refresh => '🔄',
            PagerControl::Close => '❌',
        }
    }

    pub fn from_emoji(emoji: &str) -> Option<Self> {
        // Algunos clientes envían el selector de variación U+FE0F
        let emoji = emoji.trim_end_matches('\u{fe0f}');
        [
            PagerControl::First,
            PagerControl::Prev,
            PagerControl::Next,
            PagerControl::Last,
            PagerControl::Refresh,
            PagerControl::Close,
        ]
        .into_iter()
        .find(|control| control.emoji().to_string() == emoji)
    }
}

/// What the caller must do after a control was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerAction {
    /// Show the given page (1-based).
    Show(usize),
    /// Re-read the live queue and start over from page 1.
    Reload,
    /// Delete the view.
    Close,
    /// Control not applicable on this page.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page: usize,
    pages: usize,
}

impl Pager {
    pub fn new(total_items: usize, per_page: usize) -> Self {
        Self {
            page: 1,
            pages: page_count(total_items, per_page),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Transition table.
    pub fn apply(&mut self, control: PagerControl) -> PagerAction {
        let target = match control {
            PagerControl::Next if self.page < self.pages => self.page + 1,
            PagerControl::Last if self.page < self.pages => self.pages,
            PagerControl::Prev if self.page > 1 => self.page - 1,
            PagerControl::First if self.page > 1 => 1,
            PagerControl::Refresh => return PagerAction::Reload,
            PagerControl::Close => return PagerAction::Close,
            _ => return PagerAction::Ignore,
        };

        self.page = target;
        PagerAction::Show(target)
    }

    /// Resets to page 1 over a queue that now holds `total_items`.
    pub fn reload(&mut self, total_items: usize, per_page: usize) {
        *self = Self::new(total_items, per_page);
    }

    /// Controls offered on the current page, in display order.
    pub fn controls(&self) -> Vec<PagerControl> {
        let mut controls = Vec::with_capacity(6);
        if self.page > 1 {
            controls.push(PagerControl::First);
            controls.push(PagerControl::Prev);
        }
        if self.page < self.pages {
            controls.push(PagerControl::Next);
            controls.push(PagerControl::Last);
        }
        controls.push(PagerControl::Refresh);
        controls.push(PagerControl::Close);
        controls
    }

    /// Zero-based item range of the current page.
    pub fn range(&self, total_items: usize, per_page: usize) -> std::ops::Range<usize> {
        let start = (self.page - 1) * per_page;
        start.min(total_items)..(start + per_page).min(total_items)
    }
}

fn page_count(total_items: usize, per_page: usize) -> usize {
    if total_items == 0 || per_page == 0 {
        1
    } else {
        (total_items + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(Pager::new(0, 10).pages(), 1);
        assert_eq!(Pager::new(10, 10).pages(), 1);
        assert_eq!(Pager::new(11, 10).pages(), 2);
        assert_eq!(Pager::new(35, 10).pages(), 4);
    }

    #[test]
    fn walks_forward_and_back() {
        let mut pager = Pager::new(35, 10);
        assert_eq!(pager.apply(PagerControl::Prev), PagerAction::Ignore);
        assert_eq!(pager.apply(PagerControl::Next), PagerAction::Show(2));
        assert_eq!(pager.apply(PagerControl::Last), PagerAction::Show(4));
        assert_eq!(pager.apply(PagerControl::Next), PagerAction::Ignore);
        assert_eq!(pager.apply(PagerControl::Prev), PagerAction::Show(3));
        assert_eq!(pager.apply(PagerControl::First), PagerAction::Show(1));
        assert_eq!(pager.apply(PagerControl::First), PagerAction::Ignore);
    }

    #[test]
    fn refresh_and_close_apply_on_any_page() {
        let mut pager = Pager::new(5, 10);
        assert_eq!(pager.apply(PagerControl::Refresh), PagerAction::Reload);
        assert_eq!(pager.apply(PagerControl::Close), PagerAction::Close);
    }

    #[test]
    fn controls_follow_position() {
        use PagerControl::*;

        let mut pager = Pager::new(25, 10);
        assert_eq!(pager.controls(), vec![Next, Last, Refresh, Close]);
        pager.apply(Next);
        assert_eq!(pager.controls(), vec![First, Prev, Next, Last, Refresh, Close]);
        pager.apply(Last);
        assert_eq!(pager.controls(), vec![First, Prev, Refresh, Close]);

        assert_eq!(Pager::new(3, 10).controls(), vec![Refresh, Close]);
    }

    #[test]
    fn reload_starts_over() {
        let mut pager = Pager::new(25, 10);
        pager.apply(PagerControl::Last);
        pager.reload(8, 10);
        assert_eq!((pager.page(), pager.pages()), (1, 1));
    }

    #[test]
    fn range_clamps_last_page() {
        let mut pager = Pager::new(25, 10);
        pager.apply(PagerControl::Last);
        assert_eq!(pager.range(25, 10), 20..25);
    }

    #[test]
    fn emoji_round_trip_and_variation_selector() {
        assert_eq!(PagerControl::from_emoji("▶"), Some(PagerControl::Next));
        assert_eq!(PagerControl::from_emoji("▶\u{fe0f}"), Some(PagerControl::Next));
        assert_eq!(PagerControl::from_emoji("❌"), Some(PagerControl::Close));
        assert_eq!(PagerControl::from_emoji("👍"), None);
    }
}
