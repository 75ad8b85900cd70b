//! Waiting for the bot to finish a reply.
//!
//! The assistant service has no push channel: after a user message is
//! appended, the whole chat list is re-fetched on a fixed interval until a bot
//! entry after that user message exists and is no longer `in-progress`. Older
//! replies further back in the thread never end the wait. The wait is one
//! awaitable with a built-in timeout; dropping the future cancels it.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::api_client::AssistantSession;
use crate::errors::AppError;
use crate::models::ChatRecord;

/// Anything that can hand back the full chat list.
#[async_trait]
pub trait ChatSource: Send + Sync {
    async fn fetch_chats(&self) -> Result<Vec<ChatRecord>, AppError>;
}

#[async_trait]
impl ChatSource for AssistantSession {
    async fn fetch_chats(&self) -> Result<Vec<ChatRecord>, AppError> {
        self.get_chats().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// How a wait ended. Callers clear their loading state in every case.
#[derive(Debug)]
pub enum ReplyOutcome {
    /// The reply to the latest user message finished generating.
    Completed(ChatRecord),
    /// The timeout elapsed first; `last_seen` is the freshest copy fetched, if any.
    TimedOut { last_seen: Option<ChatRecord> },
    /// A fetch failed. Polling stops at the first error.
    Failed(AppError),
}

impl ReplyOutcome {
    pub fn status(&self) -> ReplyStatus {
        match self {
            ReplyOutcome::Completed(_) => ReplyStatus::Completed,
            ReplyOutcome::TimedOut { .. } => ReplyStatus::TimedOut,
            ReplyOutcome::Failed(_) => ReplyStatus::Failed,
        }
    }

    pub fn chat(&self) -> Option<&ChatRecord> {
        match self {
            ReplyOutcome::Completed(chat) => Some(chat),
            ReplyOutcome::TimedOut { last_seen } => last_seen.as_ref(),
            ReplyOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Completed,
    TimedOut,
    Failed,
}

/// Polls `source` until the bot reply in `chat_id` is done, the timeout
/// elapses, or a fetch fails.
///
/// The first fetch happens one interval after the call, giving the service a
/// moment to register the new message. A chat missing from the list, or one
/// where the bot has not answered the latest user entry yet, keeps the loop
/// going.
pub async fn await_bot_reply<S>(source: &S, chat_id: &str, settings: PollSettings) -> ReplyOutcome
where
    S: ChatSource + ?Sized,
{
    let mut last_seen: Option<ChatRecord> = None;

    let poll = async {
        let mut ticker = tokio::time::interval(settings.interval);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let chats = match source.fetch_chats().await {
                Ok(chats) => chats,
                Err(e) => {
                    tracing::warn!(chat_id, error = %e, "Chat polling stopped after fetch error");
                    return ReplyOutcome::Failed(e);
                }
            };

            let Some(chat) = chats.into_iter().find(|c| c.id == chat_id) else {
                tracing::debug!(chat_id, "Chat not in list yet");
                continue;
            };

            let done = chat
                .reply_to_latest_user()
                .map(|bot| !bot.in_progress)
                .unwrap_or(false);
            if done {
                tracing::debug!(chat_id, "Bot reply completed");
                return ReplyOutcome::Completed(chat);
            }

            last_seen = Some(chat);
        }
    };

    let result = tokio::time::timeout(settings.timeout, poll).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(
                chat_id,
                timeout_secs = settings.timeout.as_secs_f64(),
                "Gave up waiting for bot reply"
            );
            ReplyOutcome::TimedOut { last_seen }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BotMessage, ConversationMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves a scripted sequence of responses, repeating the last one.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<ChatRecord>, AppError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<ChatRecord>, AppError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatSource for ScriptedSource {
        async fn fetch_chats(&self) -> Result<Vec<ChatRecord>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn chat(id: &str, in_progress: Option<bool>) -> ChatRecord {
        let mut conversation = vec![ConversationMessage::User("oi".into())];
        if let Some(in_progress) = in_progress {
            let mut bot = BotMessage::text("...");
            bot.in_progress = in_progress;
            conversation.push(ConversationMessage::Bot(bot));
        }
        ChatRecord {
            id: id.to_string(),
            phone: None,
            intervention: false,
            conversation,
            updated_at: None,
        }
    }

    fn thread(id: &str, conversation: Vec<ConversationMessage>) -> ChatRecord {
        ChatRecord {
            id: id.to_string(),
            phone: None,
            intervention: false,
            conversation,
            updated_at: None,
        }
    }

    fn bot(message: &str, in_progress: bool) -> ConversationMessage {
        let mut bot = BotMessage::text(message);
        bot.in_progress = in_progress;
        ConversationMessage::Bot(bot)
    }

    fn fast() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_completes_when_in_progress_clears() {
        let source = ScriptedSource::new(vec![
            Ok(vec![chat("c1", Some(true))]),
            Ok(vec![chat("c2", Some(false)), chat("c1", Some(true))]),
            Ok(vec![chat("c1", Some(false))]),
        ]);

        let outcome = await_bot_reply(&source, "c1", fast()).await;

        assert_eq!(outcome.status(), ReplyStatus::Completed);
        assert_eq!(outcome.chat().map(|c| c.id.as_str()), Some("c1"));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_waits_for_first_bot_entry() {
        let source = ScriptedSource::new(vec![
            Ok(vec![]),
            Ok(vec![chat("c1", None)]),
            Ok(vec![chat("c1", Some(false))]),
        ]);

        let outcome = await_bot_reply(&source, "c1", fast()).await;
        assert_eq!(outcome.status(), ReplyStatus::Completed);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_times_out_while_in_progress() {
        let source = ScriptedSource::new(vec![Ok(vec![chat("c1", Some(true))])]);
        let settings = PollSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(80),
        };

        let outcome = await_bot_reply(&source, "c1", settings).await;

        assert_eq!(outcome.status(), ReplyStatus::TimedOut);
        assert!(outcome.chat().map(|c| c.bot_in_progress()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_older_finished_reply_does_not_complete() {
        let asked = vec![
            ConversationMessage::User("primeira pergunta".into()),
            bot("Resposta", false),
            ConversationMessage::User("segunda pergunta".into()),
        ];
        let mut answering = asked.clone();
        answering.push(bot("...", true));
        let mut answered = asked.clone();
        answered.push(bot("Nova resposta", false));

        let source = ScriptedSource::new(vec![
            Ok(vec![thread("c1", asked)]),
            Ok(vec![thread("c1", answering)]),
            Ok(vec![thread("c1", answered)]),
        ]);

        let outcome = await_bot_reply(&source, "c1", fast()).await;

        assert_eq!(outcome.status(), ReplyStatus::Completed);
        assert_eq!(source.calls(), 3);
        assert_eq!(outcome.chat().map(|c| c.conversation.len()), Some(4));
    }

    #[tokio::test]
    async fn test_unanswered_message_times_out_despite_older_reply() {
        let source = ScriptedSource::new(vec![Ok(vec![thread(
            "c1",
            vec![
                ConversationMessage::User("oi".into()),
                bot("Olá!", false),
                ConversationMessage::User("tem saia?".into()),
            ],
        )])]);
        let settings = PollSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(80),
        };

        let outcome = await_bot_reply(&source, "c1", settings).await;
        assert_eq!(outcome.status(), ReplyStatus::TimedOut);
        assert!(source.calls() > 1);
    }

    #[tokio::test]
    async fn test_stops_on_first_error_without_retry() {
        let source = ScriptedSource::new(vec![
            Err(AppError::Transport("connection reset".into())),
            Ok(vec![chat("c1", Some(false))]),
        ]);

        let outcome = await_bot_reply(&source, "c1", fast()).await;

        assert_eq!(outcome.status(), ReplyStatus::Failed);
        assert_eq!(source.calls(), 1);
    }
}
