//! # Prompt Module
//!
//! Numbered-choice prompts used by the search and music commands.
//!
//! A handler with several candidates hands them to a [`ChoicePrompt`], which
//! shows them as an enumerated list in the invoking channel and waits for the
//! invoking user to reply with a number. The wait ends in one of three
//! terminal [`Outcome`]s:
//!
//! - `Selected(candidate)`: the user replied with `k` in `1..=N`
//! - `Cancelled`: the user replied `0`, or sent another bot command
//! - `TimedOut`: nothing resolved the prompt before the deadline
//!
//! Resolution is decided by pure functions ([`resolve_choice`] and
//! [`resolve_answer`]) evaluated against each inbound message in arrival
//! order. The controller itself only drives the wait: one suspension per
//! prompt step, bounded by a deadline fixed when the session is created.
//!
//! The chat platform is reached through [`PromptSurface`] (send and delete the
//! prompt message) and a [`Stream`] of [`InboundMessage`]s, see [`discord`].

pub mod discord;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Maximum number of candidates shown in a single prompt.
pub const MAX_CANDIDATES: usize = 10;

/// Timeout for single-step numbered choices.
pub const DEFAULT_CHOICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for free-text follow-up questions.
pub const DEFAULT_FOLLOW_UP_TIMEOUT: Duration = Duration::from_secs(60);

/// Errores que no son un resultado normal del prompt
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("no hay opciones para mostrar")]
    NoCandidates,
    #[error("el flujo de mensajes se cerró antes de resolver la selección")]
    InboundClosed,
    #[error("error de Discord: {0}")]
    Discord(#[from] serenity::Error),
}

/// Something that can be listed as an option in a prompt.
pub trait Candidate {
    fn label(&self) -> String;
}

impl Candidate for String {
    fn label(&self) -> String {
        self.clone()
    }
}

impl Candidate for &str {
    fn label(&self) -> String {
        (*self).to_string()
    }
}

/// The (channel, user) pair a prompt session listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptScope {
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

impl PromptScope {
    pub fn new(channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            channel_id,
            user_id,
        }
    }

    pub fn contains(&self, message: &InboundMessage) -> bool {
        message.channel_id == self.channel_id && message.author_id == self.user_id
    }
}

/// Mensaje entrante, reducido a lo que necesita el prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
}

/// Result of evaluating one inbound message against an open prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    NoMatch,
    Selected(T),
    Cancelled,
}

/// Terminal state of a prompt session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Selected(T),
    Cancelled,
    TimedOut,
}

impl<T> Outcome<T> {
    /// Returns the selected value, discarding cancellation and timeout.
    pub fn selected(self) -> Option<T> {
        match self {
            Outcome::Selected(value) => Some(value),
            Outcome::Cancelled | Outcome::TimedOut => None,
        }
    }
}

/// Evaluates a reply to a numbered choice over `count` candidates.
///
/// Returns the zero-based index of the chosen candidate. A numeric body
/// outside `0..=count` is ignored.
pub fn resolve_choice(
    message: &InboundMessage,
    scope: &PromptScope,
    count: usize,
    prefix: &str,
) -> Resolution<usize> {
    if !scope.contains(message) {
        return Resolution::NoMatch;
    }

    let body = message.content.trim();
    if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) {
        return match body.parse::<usize>() {
            Ok(0) => Resolution::Cancelled,
            Ok(k) if k <= count => Resolution::Selected(k - 1),
            _ => Resolution::NoMatch,
        };
    }

    if is_command_like(body, prefix) {
        Resolution::Cancelled
    } else {
        Resolution::NoMatch
    }
}

/// Evaluates a reply to a free-text question.
///
/// Any non-empty body is the answer, except the bare prefix or a new
/// command, which cancel.
pub fn resolve_answer(
    message: &InboundMessage,
    scope: &PromptScope,
    prefix: &str,
) -> Resolution<String> {
    if !scope.contains(message) {
        return Resolution::NoMatch;
    }

    let body = message.content.trim();
    if body.is_empty() {
        return Resolution::NoMatch;
    }

    if body == prefix || is_command_like(body, prefix) {
        Resolution::Cancelled
    } else {
        Resolution::Selected(body.to_string())
    }
}

fn is_command_like(body: &str, prefix: &str) -> bool {
    !prefix.is_empty() && body.len() > prefix.len() && body.starts_with(prefix)
}

/// Contenido visible de un prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptView {
    pub title: String,
    pub body: String,
    pub footer: String,
}

impl PromptView {
    /// Enumerated list, 1-based, one candidate per line.
    pub fn choices<T: Candidate>(title: &str, candidates: &[T], timeout: Duration) -> Self {
        let body = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| format!("{}. {}", i + 1, candidate.label()))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            title: title.to_string(),
            body,
            footer: format!(
                "Cancelación automática en {} segundos\nEnvía 0 para cancelar",
                timeout.as_secs()
            ),
        }
    }

    pub fn question(title: &str, body: &str, timeout: Duration) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            footer: format!(
                "Cancelación automática en {} segundos\nEnvía otro comando para cancelar",
                timeout.as_secs()
            ),
        }
    }
}

/// Where prompts are displayed and cleaned up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptSurface: Send + Sync {
    /// Sends the prompt and returns the id of the sent message.
    async fn show(&self, view: &PromptView) -> Result<MessageId, PromptError>;

    /// Deletes a previously shown prompt.
    async fn dismiss(&self, message_id: MessageId) -> Result<(), PromptError>;
}

/// Controller for one prompt step scoped to a channel and user.
///
/// The inbound stream should be subscribed before calling [`choose`] or
/// [`ask`] so that fast replies are not missed.
///
/// [`choose`]: ChoicePrompt::choose
/// [`ask`]: ChoicePrompt::ask
pub struct ChoicePrompt<'a, S: PromptSurface + ?Sized> {
    surface: &'a S,
    scope: PromptScope,
    prefix: &'a str,
    timeout: Duration,
}

impl<'a, S: PromptSurface + ?Sized> ChoicePrompt<'a, S> {
    pub fn new(surface: &'a S, scope: PromptScope, prefix: &'a str) -> Self {
        Self {
            surface,
            scope,
            prefix,
            timeout: DEFAULT_CHOICE_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shows `candidates` and waits for a numbered reply.
    pub async fn choose<T, I>(
        &self,
        title: &str,
        mut candidates: Vec<T>,
        inbound: I,
    ) -> Result<Outcome<T>, PromptError>
    where
        T: Candidate,
        I: Stream<Item = InboundMessage> + Unpin,
    {
        if candidates.is_empty() {
            return Err(PromptError::NoCandidates);
        }
        candidates.truncate(MAX_CANDIDATES);

        let deadline = Instant::now() + self.timeout;
        let count = candidates.len();
        let view = PromptView::choices(title, &candidates, self.timeout);

        let outcome = self
            .run(&view, deadline, inbound, |message| {
                resolve_choice(message, &self.scope, count, self.prefix)
            })
            .await?;

        Ok(match outcome {
            Outcome::Selected(index) => Outcome::Selected(candidates.swap_remove(index)),
            Outcome::Cancelled => Outcome::Cancelled,
            Outcome::TimedOut => Outcome::TimedOut,
        })
    }

    /// Shows a question and waits for a free-text reply.
    pub async fn ask<I>(
        &self,
        title: &str,
        description: &str,
        inbound: I,
    ) -> Result<Outcome<String>, PromptError>
    where
        I: Stream<Item = InboundMessage> + Unpin,
    {
        let deadline = Instant::now() + self.timeout;
        let view = PromptView::question(title, description, self.timeout);

        self.run(&view, deadline, inbound, |message| {
            resolve_answer(message, &self.scope, self.prefix)
        })
        .await
    }

    async fn run<R, I, F>(
        &self,
        view: &PromptView,
        deadline: Instant,
        mut inbound: I,
        resolve: F,
    ) -> Result<Outcome<R>, PromptError>
    where
        I: Stream<Item = InboundMessage> + Unpin,
        F: Fn(&InboundMessage) -> Resolution<R>,
    {
        let prompt_id = self.surface.show(view).await?;
        debug!(
            "💬 Prompt {} abierto para usuario {} en canal {}",
            prompt_id, self.scope.user_id, self.scope.channel_id
        );

        let wait = async {
            while let Some(message) = inbound.next().await {
                match resolve(&message) {
                    Resolution::NoMatch => continue,
                    Resolution::Selected(value) => return Ok(Outcome::Selected(value)),
                    Resolution::Cancelled => return Ok(Outcome::Cancelled),
                }
            }
            Err(PromptError::InboundClosed)
        };

        let outcome = match tokio::time::timeout_at(deadline, wait).await {
            Ok(result) => result?,
            Err(_) => {
                info!("⌛ Prompt {} expirado sin respuesta", prompt_id);
                return Ok(Outcome::TimedOut);
            }
        };

        if let Err(e) = self.surface.dismiss(prompt_id).await {
            warn!("No se pudo borrar el prompt {}: {}", prompt_id, e);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use pretty_assertions::assert_eq;

    const PROMPT_ID: u64 = 500;

    fn scope() -> PromptScope {
        PromptScope::new(ChannelId::new(7), UserId::new(42))
    }

    fn msg(channel: u64, user: u64, body: &str) -> InboundMessage {
        InboundMessage {
            channel_id: ChannelId::new(channel),
            author_id: UserId::new(user),
            content: body.to_string(),
        }
    }

    fn greek() -> Vec<String> {
        vec!["Alpha".to_string(), "Beta".to_string(), "Gamma".to_string()]
    }

    /// Surface that expects one prompt and `dismissals` deletions of it.
    fn surface(dismissals: usize) -> MockPromptSurface {
        let mut surface = MockPromptSurface::new();
        surface
            .expect_show()
            .times(1)
            .returning(|_| Ok(MessageId::new(PROMPT_ID)));
        surface
            .expect_dismiss()
            .withf(|id| *id == MessageId::new(PROMPT_ID))
            .times(dismissals)
            .returning(|_| Ok(()));
        surface
    }

    #[test]
    fn every_index_selects_its_candidate() {
        for n in 1..=MAX_CANDIDATES {
            for k in 1..=n {
                let reply = msg(7, 42, &k.to_string());
                assert_eq!(
                    resolve_choice(&reply, &scope(), n, "!"),
                    Resolution::Selected(k - 1)
                );
            }
        }
    }

    #[test]
    fn zero_cancels_regardless_of_count() {
        for n in 1..=MAX_CANDIDATES {
            assert_eq!(
                resolve_choice(&msg(7, 42, "0"), &scope(), n, "!"),
                Resolution::Cancelled
            );
        }
    }

    #[test]
    fn out_of_range_number_is_ignored() {
        assert_eq!(
            resolve_choice(&msg(7, 42, "4"), &scope(), 3, "!"),
            Resolution::NoMatch
        );
        assert_eq!(
            resolve_choice(&msg(7, 42, "99999999999999999999999"), &scope(), 3, "!"),
            Resolution::NoMatch
        );
    }

    #[test]
    fn new_command_cancels_choice() {
        assert_eq!(
            resolve_choice(&msg(7, 42, "!play foo"), &scope(), 3, "!"),
            Resolution::Cancelled
        );
        assert_eq!(
            resolve_choice(&msg(7, 42, "mp!q"), &scope(), 3, "mp!"),
            Resolution::Cancelled
        );
    }

    #[test]
    fn bare_prefix_and_chatter_are_ignored() {
        for body in ["!", "hello", "2nd", "-1", ""] {
            assert_eq!(
                resolve_choice(&msg(7, 42, body), &scope(), 3, "!"),
                Resolution::NoMatch,
                "body {:?}",
                body
            );
        }
    }

    #[test]
    fn other_user_or_channel_never_resolves() {
        for body in ["1", "0", "!play foo"] {
            assert_eq!(
                resolve_choice(&msg(7, 99, body), &scope(), 3, "!"),
                Resolution::NoMatch
            );
            assert_eq!(
                resolve_choice(&msg(8, 42, body), &scope(), 3, "!"),
                Resolution::NoMatch
            );
        }
    }

    #[test]
    fn answer_accepts_text_and_cancels_on_commands() {
        assert_eq!(
            resolve_answer(&msg(7, 42, "  dark souls "), &scope(), "!"),
            Resolution::Selected("dark souls".to_string())
        );
        assert_eq!(
            resolve_answer(&msg(7, 42, "0"), &scope(), "!"),
            Resolution::Selected("0".to_string())
        );
        assert_eq!(
            resolve_answer(&msg(7, 42, "!"), &scope(), "!"),
            Resolution::Cancelled
        );
        assert_eq!(
            resolve_answer(&msg(7, 42, "!wiki elden ring"), &scope(), "!"),
            Resolution::Cancelled
        );
        assert_eq!(
            resolve_answer(&msg(7, 42, "   "), &scope(), "!"),
            Resolution::NoMatch
        );
        assert_eq!(
            resolve_answer(&msg(7, 99, "dark souls"), &scope(), "!"),
            Resolution::NoMatch
        );
    }

    #[test]
    fn choice_view_lists_candidates_from_one() {
        let view = PromptView::choices("Elige", &greek(), DEFAULT_CHOICE_TIMEOUT);
        assert_eq!(view.body, "1. Alpha\n2. Beta\n3. Gamma");
        assert!(view.footer.contains("30 segundos"));
        assert!(view.footer.contains("0 para cancelar"));
    }

    #[tokio::test]
    async fn reply_selects_and_deletes_prompt() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 99, "1")).unwrap();
        tx.unbounded_send(msg(7, 42, "hola")).unwrap();
        tx.unbounded_send(msg(7, 42, "2")).unwrap();

        let prompt = ChoicePrompt::new(&surface, scope(), "!");
        let outcome = prompt.choose("Elige", greek(), rx).await.unwrap();

        assert_eq!(outcome, Outcome::Selected("Beta".to_string()));
    }

    #[tokio::test]
    async fn zero_reply_cancels_and_deletes_prompt() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 42, "0")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", greek(), rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn command_reply_cancels() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 42, "!play foo")).unwrap();
        tx.unbounded_send(msg(7, 42, "1")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", greek(), rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_and_keeps_prompt() {
        let surface = surface(0);
        let (_tx, rx) = mpsc::unbounded::<InboundMessage>();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", greek(), rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_traffic_does_not_extend_deadline() {
        let surface = surface(0);
        let (tx, rx) = mpsc::unbounded();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            tx.unbounded_send(msg(7, 99, "1")).unwrap();
            tx.unbounded_send(msg(7, 42, "qué")).unwrap();
            tokio::time::sleep(Duration::from_secs(15)).await;
            let _ = tx.unbounded_send(msg(7, 42, "1"));
        });

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", greek(), rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_within_custom_timeout_wins() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            tx.unbounded_send(msg(7, 42, "3")).unwrap();
        });

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .timeout(DEFAULT_FOLLOW_UP_TIMEOUT)
            .choose("Elige", greek(), rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Selected("Gamma".to_string()));
    }

    #[tokio::test]
    async fn only_first_ten_candidates_are_offered() {
        let surface = surface(1);
        let candidates: Vec<String> = (1..=12).map(|i| format!("track {}", i)).collect();
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 42, "11")).unwrap();
        tx.unbounded_send(msg(7, 42, "10")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", candidates, rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Selected("track 10".to_string()));
    }

    #[tokio::test]
    async fn empty_candidates_are_rejected_without_sending() {
        let mut surface = MockPromptSurface::new();
        surface.expect_show().times(0);
        let (_tx, rx) = mpsc::unbounded::<InboundMessage>();

        let result = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", Vec::<String>::new(), rx)
            .await;

        assert!(matches!(result, Err(PromptError::NoCandidates)));
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let surface = surface(0);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 42, "hola")).unwrap();
        drop(tx);

        let result = ChoicePrompt::new(&surface, scope(), "!")
            .choose("Elige", greek(), rx)
            .await;

        assert!(matches!(result, Err(PromptError::InboundClosed)));
    }

    #[tokio::test]
    async fn question_returns_free_text() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(8, 42, "otro canal")).unwrap();
        tx.unbounded_send(msg(7, 42, "malenia")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .timeout(DEFAULT_FOLLOW_UP_TIMEOUT)
            .ask("Escribe tu búsqueda", "Buscar en Elden Ring Wiki", rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Selected("malenia".to_string()));
    }

    #[tokio::test]
    async fn question_cancelled_by_prefix() {
        let surface = surface(1);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 42, "!")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .ask("Escribe tu búsqueda", "Buscar", rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_question_times_out() {
        let surface = surface(0);
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(msg(7, 99, "malenia")).unwrap();

        let outcome = ChoicePrompt::new(&surface, scope(), "!")
            .timeout(DEFAULT_FOLLOW_UP_TIMEOUT)
            .ask("Escribe tu búsqueda", "Buscar", rx)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::TimedOut);
        drop(tx);
    }
}
