//! Chat list view for the operator dashboard.

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde::Serialize;

use crate::models::ChatRecord;

const PREVIEW_CHARS: usize = 80;

/// Normalizes a customer phone to E.164 (Brazilian region by default).
///
/// Returns the trimmed input unchanged when it cannot be parsed as a valid number.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    match phonenumber::parse(Some(CountryId::BR), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => number.format().mode(Mode::E164).to_string(),
        Ok(_) => {
            tracing::debug!("Phone {} parsed but is not valid, keeping raw value", trimmed);
            trimmed.to_string()
        }
        Err(e) => {
            tracing::debug!("Failed to parse phone '{}': {:?}", trimmed, e);
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub phone: Option<String>,
    pub intervention: bool,
    pub message_count: usize,
    pub last_message: Option<String>,
    pub bot_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
}

impl From<&ChatRecord> for ChatSummary {
    fn from(chat: &ChatRecord) -> Self {
        let last_message = chat.conversation.last().map(|m| {
            let preview = m.preview();
            if preview.chars().count() > PREVIEW_CHARS {
                let cut: String = preview.chars().take(PREVIEW_CHARS).collect();
                format!("{}…", cut)
            } else {
                preview
            }
        });
        let latest_bot = chat.latest_bot_message();

        Self {
            id: chat.id.clone(),
            phone: chat.phone.as_deref().map(normalize_phone),
            intervention: chat.intervention,
            message_count: chat.conversation.len(),
            last_message,
            bot_in_progress: chat.bot_in_progress(),
            progress_message: latest_bot
                .filter(|bot| bot.in_progress)
                .and_then(|bot| bot.progress_message.clone()),
        }
    }
}

/// Summaries, most recently updated first; chats without a timestamp keep their order at the end.
pub fn summarize(chats: &[ChatRecord]) -> Vec<ChatSummary> {
    let mut ordered: Vec<&ChatRecord> = chats.iter().collect();
    ordered.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    ordered.into_iter().map(ChatSummary::from).collect()
}
