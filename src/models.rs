use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::IntoParams;

// ============ Profile ============

/// Structured shipping address collected by the intake flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
}

impl Address {
    pub fn is_complete(&self) -> bool {
        [&self.postal_code, &self.city, &self.state, &self.country]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// One stored answer.
///
/// Untagged so the stored blob stays a plain JSON object of key → value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Number(f64),
    Text(String),
    Choices(Vec<String>),
    Address(Address),
}

/// Question key → answer. Persisted wholesale under the `profile` store key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(pub BTreeMap<String, ProfileValue>);

impl Profile {
    pub fn get(&self, key: &str) -> Option<&ProfileValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ProfileValue) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// ============ Conversation ============

/// Picture sent by the bot, usually a product photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(alias = "image", alias = "link")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Entry of a product carousel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(alias = "image", alias = "link")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Body of a bot message: plain text, a list of images, or one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BotPayload {
    Text(String),
    ImageList(Vec<ProductImage>),
    ImageAttachment(ImageAttachment),
}

impl BotPayload {
    /// Short text for chat list previews.
    pub fn preview(&self) -> String {
        match self {
            BotPayload::Text(text) => text.clone(),
            BotPayload::ImageAttachment(image) => image
                .caption
                .clone()
                .unwrap_or_else(|| "[image]".to_string()),
            BotPayload::ImageList(items) => format!("[{} products]", items.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMessage {
    pub message: BotPayload,
    /// Quick-reply options offered with the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<Vec<String>>,
    #[serde(rename = "in-progress", default)]
    pub in_progress: bool,
    #[serde(
        rename = "progress-message",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_message: Option<String>,
}

impl BotMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: BotPayload::Text(message.into()),
            choice: None,
            in_progress: false,
            progress_message: None,
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choice = Some(choices);
        self
    }
}

/// `{"user": text}` or `{"bot": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMessage {
    User(String),
    Bot(BotMessage),
}

impl ConversationMessage {
    pub fn as_bot(&self) -> Option<&BotMessage> {
        match self {
            ConversationMessage::Bot(bot) => Some(bot),
            ConversationMessage::User(_) => None,
        }
    }

    pub fn preview(&self) -> String {
        match self {
            ConversationMessage::User(text) => text.clone(),
            ConversationMessage::Bot(bot) => bot.message.preview(),
        }
    }
}

/// A conversation plus its metadata, as returned by `/getChats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub intervention: bool,
    #[serde(default)]
    pub conversation: Vec<ConversationMessage>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatRecord {
    /// The most recent bot entry, if the bot has spoken at all.
    pub fn latest_bot_message(&self) -> Option<&BotMessage> {
        self.conversation.iter().rev().find_map(|m| m.as_bot())
    }

    /// The newest bot entry that follows the newest user entry.
    ///
    /// `None` while the latest user message is still unanswered, even if an
    /// older bot reply exists further back.
    pub fn reply_to_latest_user(&self) -> Option<&BotMessage> {
        let start = self
            .conversation
            .iter()
            .rposition(|m| matches!(m, ConversationMessage::User(_)))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.conversation[start..]
            .iter()
            .rev()
            .find_map(|m| m.as_bot())
    }

    /// True while the latest bot entry is still being generated.
    pub fn bot_in_progress(&self) -> bool {
        self.latest_bot_message()
            .map(|bot| bot.in_progress)
            .unwrap_or(false)
    }
}

/// `/getChats` answers either a bare array or `{ "chats": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatListResponse {
    List(Vec<ChatRecord>),
    Wrapped { chats: Vec<ChatRecord> },
}

impl ChatListResponse {
    pub fn into_chats(self) -> Vec<ChatRecord> {
        match self {
            ChatListResponse::List(chats) | ChatListResponse::Wrapped { chats } => chats,
        }
    }
}

// ============ Auth ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(default)]
    pub country: Option<String>,
}

/// Body sent to `/signupUser`: the email plus geo/IP metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SignupPayload {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninResponse {
    pub token: String,
    #[serde(default, alias = "_id", alias = "userId")]
    pub id: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// ============ Analytics ============

/// Date-range and categorical filters for dashboard views.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FilterParams {
    #[serde(default)]
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FilterParams {
    /// Query pairs forwarded to the analytics endpoints.
    pub fn upstream_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(start) = self.start_date {
            query.push(("startDate", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            query.push(("endDate", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(ref kind) = self.kind {
            query.push(("type", kind.clone()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    #[serde(alias = "name")]
    pub stage: String,
    #[serde(alias = "value")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub price: f64,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.price * item.quantity as f64)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotProduct {
    #[serde(alias = "_id", alias = "productId")]
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "count")]
    pub hits: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour: String,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub chats: u64,
}
