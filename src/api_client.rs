use failsafe::futures::CircuitBreaker;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::circuit_breaker::{create_upstream_circuit_breaker, is_transient, UpstreamBreaker};
use crate::errors::AppError;
use crate::models::{
    Cart, ChatListResponse, ChatRecord, ConversationMessage, FilterParams, FunnelStage,
    HotProduct, HourlyBucket, Profile, SigninRequest, SigninResponse, SignupPayload,
};

/// Message used when an error body carries nothing readable.
const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

/// Statuses on `/getChats` that mean the session is gone.
const CHAT_LIST_LOGIN_STATUSES: &[u16] = &[401, 500];
const LOGIN_STATUSES: &[u16] = &[401];

/// Analytics endpoints answer either a bare array or `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    List(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::List(items) | ListResponse::Wrapped { data: items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatResponse {
    Chat(ChatRecord),
    Wrapped { chat: ChatRecord },
}

/// Client for the assistant service's public endpoints.
///
/// Authenticated endpoints live on [`AssistantSession`], obtained with
/// [`AssistantApi::authorized`].
#[derive(Clone)]
pub struct AssistantApi {
    client: reqwest::Client,
    base_url: String,
    breaker: UpstreamBreaker,
}

impl AssistantApi {
    /// Creates a new `AssistantApi`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the assistant service.
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create assistant API client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: create_upstream_circuit_breaker(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Binds a bearer token for the authenticated endpoints.
    pub fn authorized(&self, token: impl Into<String>) -> AssistantSession {
        AssistantSession {
            api: self.clone(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers an email with its geo/IP metadata.
    pub async fn signup_user(&self, payload: &SignupPayload) -> Result<serde_json::Value, AppError> {
        tracing::info!("Registering new user via /signupUser");
        let request = self.client.post(self.url("/signupUser")).json(payload);
        self.execute(request, "/signupUser", &[]).await
    }

    /// Exchanges email and password for a bearer token.
    pub async fn signin(&self, credentials: &SigninRequest) -> Result<SigninResponse, AppError> {
        tracing::info!("Signing in via /signin");
        let request = self.client.post(self.url("/signin")).json(credentials);
        self.execute(request, "/signin", LOGIN_STATUSES).await
    }

    /// Sends a request through the circuit breaker and decodes the JSON answer.
    ///
    /// Non-2xx answers are decoded into `Unauthorized` (for `login_statuses`)
    /// or `Upstream` with the message found in the body.
    async fn execute<T>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
        login_statuses: &'static [u16],
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned + Send,
    {
        let call = async move {
            let response = request.send().await.map_err(|e| {
                AppError::Transport(format!("{} request failed: {}", endpoint, e))
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                AppError::Transport(format!("{} body could not be read: {}", endpoint, e))
            })?;

            if !status.is_success() {
                return Err(decode_error(endpoint, status.as_u16(), &body, login_statuses));
            }

            let body = if body.trim().is_empty() { "null" } else { body.as_str() };
            serde_json::from_str::<T>(body).map_err(|e| {
                AppError::upstream(format!("Failed to parse {} response: {}", endpoint, e))
            })
        };

        match self.breaker.call_with(is_transient, call).await {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Assistant API circuit open, rejecting {}", endpoint);
                Err(AppError::upstream(
                    "Assistant service temporarily unavailable",
                ))
            }
        }
    }
}

/// Turns a non-2xx answer into an `AppError`, reading `message` or `error` from a JSON body.
pub fn decode_error(endpoint: &str, status: u16, body: &str, login_statuses: &[u16]) -> AppError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "msg"]
                .iter()
                .find_map(|field| value.get(field).and_then(|m| m.as_str()).map(str::to_string))
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_ERROR.to_string());

    if login_statuses.contains(&status) {
        tracing::warn!("{} answered {}, session must log in again", endpoint, status);
        return AppError::Unauthorized(message);
    }

    tracing::error!("{} returned {}: {}", endpoint, status, message);
    AppError::Upstream {
        status: Some(status),
        message,
    }
}

/// Assistant API calls made on behalf of a signed-in user.
#[derive(Clone)]
pub struct AssistantSession {
    api: AssistantApi,
    token: String,
}

impl AssistantSession {
    fn get(&self, path: &str) -> RequestBuilder {
        self.api
            .client
            .get(self.api.url(path))
            .header("Authorization", format!("Bearer {}", self.token))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.api
            .client
            .post(self.api.url(path))
            .header("Authorization", format!("Bearer {}", self.token))
    }

    /// Persists the intake answers.
    pub async fn update_user(
        &self,
        email: Option<&str>,
        profile: &Profile,
    ) -> Result<serde_json::Value, AppError> {
        tracing::info!("Submitting profile ({} answers) to /updateUser", profile.len());
        let body = json!({
            "email": email,
            "profile": profile,
        });
        self.api
            .execute(self.post("/updateUser").json(&body), "/updateUser", LOGIN_STATUSES)
            .await
    }

    /// Fetches every conversation. 401 and 500 both mean "log in again".
    pub async fn get_chats(&self) -> Result<Vec<ChatRecord>, AppError> {
        tracing::debug!("Fetching chat list");
        let chats: ChatListResponse = self
            .api
            .execute(self.get("/getChats"), "/getChats", CHAT_LIST_LOGIN_STATUSES)
            .await?;
        Ok(chats.into_chats())
    }

    pub async fn create_chat(&self, message: Option<&str>) -> Result<ChatRecord, AppError> {
        tracing::info!("Creating new chat");
        let body = match message {
            Some(text) => json!({ "conversation": [ConversationMessage::User(text.to_string())] }),
            None => json!({ "conversation": [] }),
        };
        let created: ChatResponse = self
            .api
            .execute(self.post("/createChat").json(&body), "/createChat", LOGIN_STATUSES)
            .await?;
        Ok(match created {
            ChatResponse::Chat(chat) | ChatResponse::Wrapped { chat } => chat,
        })
    }

    /// Appends messages to a conversation.
    pub async fn update_chat(
        &self,
        chat_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<serde_json::Value, AppError> {
        tracing::info!("Appending {} message(s) to chat {}", messages.len(), chat_id);
        let path = format!("/updateChat/{}", chat_id);
        let body = json!({ "messages": messages });
        self.api
            .execute(self.post(&path).json(&body), "/updateChat", LOGIN_STATUSES)
            .await
    }

    /// Relays an operator message to the end customer.
    pub async fn send_message(
        &self,
        chat_id: &str,
        phone: Option<&str>,
        message: &str,
    ) -> Result<serde_json::Value, AppError> {
        tracing::info!("Relaying operator message to chat {}", chat_id);
        let body = json!({
            "chatId": chat_id,
            "phone": phone,
            "message": message,
        });
        self.api
            .execute(self.post("/sendMessage").json(&body), "/sendMessage", LOGIN_STATUSES)
            .await
    }

    /// Flips the human-takeover flag on a conversation.
    pub async fn toggle_intervention(&self, chat_id: &str) -> Result<serde_json::Value, AppError> {
        tracing::info!("Toggling intervention on chat {}", chat_id);
        let body = json!({ "chatId": chat_id });
        self.api
            .execute(
                self.post("/toggleIntervention").json(&body),
                "/toggleIntervention",
                LOGIN_STATUSES,
            )
            .await
    }

    async fn analytics<T>(
        &self,
        endpoint: &'static str,
        filters: &FilterParams,
    ) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        tracing::debug!("Fetching {} with {:?}", endpoint, filters);
        let request = self.get(endpoint).query(&filters.upstream_query());
        let response: ListResponse<T> = self.api.execute(request, endpoint, LOGIN_STATUSES).await?;
        Ok(response.into_vec())
    }

    pub async fn get_funnel_analytics(
        &self,
        filters: &FilterParams,
    ) -> Result<Vec<FunnelStage>, AppError> {
        self.analytics("/getFunilAnalytics", filters).await
    }

    pub async fn get_cart_analytics(&self, filters: &FilterParams) -> Result<Vec<Cart>, AppError> {
        self.analytics("/getCartAnalytics", filters).await
    }

    pub async fn get_hot_products(
        &self,
        filters: &FilterParams,
    ) -> Result<Vec<HotProduct>, AppError> {
        self.analytics("/getHotProducts", filters).await
    }

    pub async fn get_last24_analytics(
        &self,
        filters: &FilterParams,
    ) -> Result<Vec<HourlyBucket>, AppError> {
        self.analytics("/getLast24Analytics", filters).await
    }
}
