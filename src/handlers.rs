use crate::api_client::{AssistantApi, AssistantSession};
use crate::auth::{client_ip, BearerToken};
use crate::chat_sync::{await_bot_reply, PollSettings, ReplyOutcome, ReplyStatus};
use crate::chats::{summarize, ChatSummary};
use crate::config::Config;
use crate::dashboard::{self, CartsView, DashboardCache, FunnelView, HotsView, Last24View};
use crate::errors::{AppError, ResultExt};
use crate::i18n::Language;
use crate::intake::{self, AddressInput, AddressUpdate, Answer, IntakeFlow, IntakeSnapshot};
use crate::models::*;
use crate::postal::{PostalLookup, ViaCepClient};
use crate::storage::{owner_key, KeyValueStore, SessionStores, StoreKey};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Client for the assistant service.
    pub api: AssistantApi,
    /// Postal code to city/state lookup used by the address question.
    pub postal: Arc<dyn PostalLookup>,
    /// One client store per user; tokens map to their owner at sign-in.
    pub stores: SessionStores,
    /// Live intake flows per owner. A flow evicted here resumes from the stored profile.
    pub intake_flows: Cache<String, Arc<Mutex<IntakeFlow>>>,
    /// Analytics responses, per session and filter set.
    pub dashboard_cache: DashboardCache,
    pub poll: PollSettings,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let api = AssistantApi::new(config.assistant_api_url.clone())?;
        let postal: Arc<dyn PostalLookup> =
            Arc::new(ViaCepClient::new(config.postal_lookup_url.clone())?);
        Ok(Self::with_postal(config, api, postal))
    }

    /// Builds the state around an existing API client and postal lookup.
    pub fn with_postal(config: Config, api: AssistantApi, postal: Arc<dyn PostalLookup>) -> Self {
        let intake_flows = Cache::builder()
            .time_to_idle(Duration::from_secs(3600))
            .max_capacity(10_000)
            .build();

        Self {
            stores: SessionStores::new(config.session_store_dir.clone()),
            dashboard_cache: DashboardCache::new(config.analytics_cache_ttl),
            poll: PollSettings {
                interval: config.chat_poll_interval,
                timeout: config.chat_poll_timeout,
            },
            config,
            api,
            postal,
            intake_flows,
        }
    }

    fn session(&self, token: &BearerToken) -> AssistantSession {
        self.api.authorized(token.as_str())
    }

    async fn store(&self, token: &BearerToken) -> Result<Arc<dyn KeyValueStore>, AppError> {
        self.stores.for_token(&token.session_key()).await
    }

    fn language(&self, store: &dyn KeyValueStore) -> Result<Language, AppError> {
        Ok(store
            .get(StoreKey::Country)?
            .filter(|c| !c.trim().is_empty())
            .map(|c| Language::from_country(&c))
            .unwrap_or(self.config.default_language))
    }

    /// The live intake flow for this session, resumed from the store on first use.
    async fn intake_flow(&self, token: &BearerToken) -> Result<Arc<Mutex<IntakeFlow>>, AppError> {
        let owner = self.stores.owner_of(&token.session_key()).await;
        let store = self.stores.for_session(&owner).await?;
        let lang = self.language(store.as_ref())?;
        self.intake_flows
            .try_get_with(owner, async move {
                IntakeFlow::load(store, lang).map(|flow| Arc::new(Mutex::new(flow)))
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())
    }
}

/// Health check endpoint.
///
/// Returns the service status and version.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is healthy")))]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "vitrine-console",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Auth ============

/// POST /api/v1/auth/signup
///
/// Registers an email with the assistant service, attaching the caller IP and
/// country reported by the edge proxy.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    responses(
        (status = 200, description = "Email registered"),
        (status = 400, description = "Invalid email"),
        (status = 502, description = "Assistant service error")
    )
)]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SignupRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let email = request.email.trim().to_string();
    if !intake::is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    let country = request.country.or_else(|| {
        headers
            .get("cf-ipcountry")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let payload = SignupPayload {
        email,
        country,
        ip: client_ip(&headers),
    };

    let response = state.api.signup_user(&payload).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/signin
///
/// Exchanges credentials for a token and seeds the user's client store with
/// `token`, `email`, `id` and `country`. The store is filed under the user,
/// so a later sign-in with a fresh token finds the same profile and theme.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signin",
    responses(
        (status = 200, description = "Signed in; body carries the token"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn signin(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SigninRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let email = request.email.trim().to_string();
    let response = state
        .api
        .signin(&SigninRequest {
            email: email.clone(),
            password: request.password,
        })
        .await?;

    let token = BearerToken(response.token.clone());
    let owner = owner_key(response.id.as_deref(), &email);
    state.stores.bind(&token.session_key(), &owner).await;
    let store = state.stores.for_session(&owner).await?;
    store.set(StoreKey::Token, &response.token)?;
    store.set(StoreKey::Email, &email)?;
    if let Some(ref id) = response.id {
        store.set(StoreKey::Id, id)?;
    }
    if let Some(ref country) = response.country {
        store.set(StoreKey::Country, country)?;
    }
    state.intake_flows.invalidate(&owner).await;

    tracing::info!("Session opened for user {:?}", response.id);

    Ok(Json(json!({
        "token": response.token,
        "id": response.id,
        "email": email,
        "country": response.country,
    })))
}

// ============ Preferences ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemePreference {
    pub theme: String,
}

const THEMES: &[&str] = &["light", "dark"];

/// GET /api/v1/preferences/theme
#[utoipa::path(get, path = "/api/v1/preferences/theme", responses((status = 200, description = "Stored theme")))]
pub async fn get_theme(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ThemePreference>, AppError> {
    let store = state.store(&token).await?;
    let theme = store
        .get(StoreKey::Theme)?
        .filter(|t| THEMES.contains(&t.as_str()))
        .unwrap_or_else(|| THEMES[0].to_string());
    Ok(Json(ThemePreference { theme }))
}

/// PUT /api/v1/preferences/theme
#[utoipa::path(
    put,
    path = "/api/v1/preferences/theme",
    responses((status = 200, description = "Theme saved"), (status = 400, description = "Unknown theme"))
)]
pub async fn put_theme(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(preference): Json<ThemePreference>,
) -> Result<Json<ThemePreference>, AppError> {
    let theme = preference.theme.trim().to_lowercase();
    if !THEMES.contains(&theme.as_str()) {
        return Err(AppError::BadRequest(format!(
            "theme must be one of: {}",
            THEMES.join(", ")
        )));
    }
    state.store(&token).await?.set(StoreKey::Theme, &theme)?;
    Ok(Json(ThemePreference { theme }))
}

// ============ Intake ============

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub answer: Answer,
}

/// Where the UI should go once the profile is complete.
#[derive(Debug, Clone, Serialize)]
pub struct RedirectHint {
    pub to: String,
    pub after_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeStepResponse {
    pub advanced: bool,
    pub messages: Vec<ConversationMessage>,
    pub snapshot: IntakeSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectHint>,
}

/// GET /api/v1/intake
///
/// Current intake state and transcript. A fresh session resumes at the first
/// unanswered question of the stored profile.
#[utoipa::path(get, path = "/api/v1/intake", responses((status = 200, description = "Intake snapshot")))]
pub async fn intake_state(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<IntakeSnapshot>, AppError> {
    let flow = state.intake_flow(&token).await?;
    let flow = flow.lock().await;
    Ok(Json(flow.snapshot()))
}

/// POST /api/v1/intake/answer
///
/// Answers the active prompt. Invalid input comes back with `advanced: false`
/// and one validation message. The step that completes the profile submits it
/// in the background and returns a redirect hint.
#[utoipa::path(
    post,
    path = "/api/v1/intake/answer",
    responses(
        (status = 200, description = "Step applied or rejected with a validation message"),
        (status = 400, description = "Profile already complete")
    )
)]
pub async fn intake_answer(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<IntakeStepResponse>, AppError> {
    let flow = state.intake_flow(&token).await?;
    let mut flow = flow.lock().await;

    let outcome = flow.answer(request.answer)?;

    let redirect = match outcome.completed {
        Some(profile) => {
            submit_profile(state.session(&token), flow.email().map(str::to_string), profile);
            Some(RedirectHint {
                to: state.config.intake_redirect_to.clone(),
                after_ms: state.config.intake_redirect_delay.as_millis() as u64,
            })
        }
        None => None,
    };

    Ok(Json(IntakeStepResponse {
        advanced: outcome.advanced,
        messages: outcome.messages,
        snapshot: flow.snapshot(),
        redirect,
    }))
}

/// Sends the finished profile without holding up the response.
fn submit_profile(session: AssistantSession, email: Option<String>, profile: Profile) {
    tokio::spawn(async move {
        match session.update_user(email.as_deref(), &profile).await {
            Ok(_) => tracing::info!("Profile submitted ({} answers)", profile.len()),
            Err(e) => tracing::error!("Profile submission failed, redirect not affected: {}", e),
        }
    });
}

/// POST /api/v1/intake/address
///
/// Edits the address draft. An 8-digit postal code fills city, state and
/// country from the postal lookup; the question still has to be answered.
#[utoipa::path(
    post,
    path = "/api/v1/intake/address",
    responses(
        (status = 200, description = "Updated draft and lookup status"),
        (status = 400, description = "Active question is not the address")
    )
)]
pub async fn intake_address(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(input): Json<AddressInput>,
) -> Result<Json<AddressUpdate>, AppError> {
    let flow = state.intake_flow(&token).await?;
    let mut flow = flow.lock().await;
    let update = flow.update_address(input, state.postal.as_ref()).await?;
    Ok(Json(update))
}

/// POST /api/v1/intake/redo
#[utoipa::path(
    post,
    path = "/api/v1/intake/redo",
    responses(
        (status = 200, description = "Profile cleared, back to the email confirmation"),
        (status = 400, description = "Profile is not complete")
    )
)]
pub async fn intake_redo(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<IntakeStepResponse>, AppError> {
    let flow = state.intake_flow(&token).await?;
    let mut flow = flow.lock().await;
    let outcome = flow.redo()?;

    Ok(Json(IntakeStepResponse {
        advanced: outcome.advanced,
        messages: outcome.messages,
        snapshot: flow.snapshot(),
        redirect: None,
    }))
}

// ============ Chats ============

#[derive(Debug, Clone, Serialize)]
pub struct ChatListView {
    pub chats: Vec<ChatSummary>,
    pub count: usize,
}

/// GET /api/v1/chats
#[utoipa::path(
    get,
    path = "/api/v1/chats",
    responses(
        (status = 200, description = "Conversation summaries, most recent first"),
        (status = 401, description = "Session expired")
    )
)]
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
) -> Result<Json<ChatListView>, AppError> {
    let chats = state.session(&token).get_chats().await?;
    let chats = summarize(&chats);
    Ok(Json(ChatListView {
        count: chats.len(),
        chats,
    }))
}

/// GET /api/v1/chats/:id
///
/// Full thread of one conversation.
#[utoipa::path(
    get,
    path = "/api/v1/chats/{id}",
    params(("id" = String, Path, description = "Chat id")),
    responses((status = 200, description = "Conversation"), (status = 404, description = "Unknown chat"))
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<String>,
) -> Result<Json<ChatRecord>, AppError> {
    state
        .session(&token)
        .get_chats()
        .await?
        .into_iter()
        .find(|chat| chat.id == id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Chat {} not found", id)))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /api/v1/chats
#[utoipa::path(post, path = "/api/v1/chats", responses((status = 200, description = "Created conversation")))]
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(request): Json<CreateChatRequest>,
) -> Result<Json<ChatRecord>, AppError> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    let chat = state.session(&token).create_chat(message).await?;
    Ok(Json(chat))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    pub text: String,
    /// Customer phone for operator relays; looked up from the chat when absent.
    #[serde(default)]
    pub phone: Option<String>,
}

impl MessageRequest {
    fn text(&self) -> Result<&str, AppError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("text cannot be empty".to_string()));
        }
        Ok(text)
    }
}

/// Result of sending a message and waiting for the bot.
///
/// `loading` is always `false`: the wait has ended whichever way it went.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReplyResponse {
    pub loading: bool,
    pub status: ReplyStatus,
    pub timed_out: bool,
    pub chat: Option<ChatRecord>,
}

/// POST /api/v1/chats/:id/messages
///
/// Appends the user message, then polls the chat list until the bot reply is
/// done or the poll timeout elapses.
#[utoipa::path(
    post,
    path = "/api/v1/chats/{id}/messages",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Wait finished: completed, timed out, or failed"),
        (status = 401, description = "Session expired")
    )
)]
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatReplyResponse>, AppError> {
    let text = request.text()?;
    let session = state.session(&token);

    session
        .update_chat(&id, &[ConversationMessage::User(text.to_string())])
        .await
        .with_context(|| format!("Failed to append message to chat {}", id))?;

    let outcome = await_bot_reply(&session, &id, state.poll).await;
    let status = outcome.status();

    let chat = match outcome {
        ReplyOutcome::Failed(e) if e.requires_login() => return Err(e),
        ReplyOutcome::Failed(e) => {
            tracing::warn!("Polling chat {} ended early: {}", id, e);
            None
        }
        ReplyOutcome::Completed(chat) => Some(chat),
        ReplyOutcome::TimedOut { last_seen } => last_seen,
    };

    Ok(Json(ChatReplyResponse {
        loading: false,
        timed_out: status == ReplyStatus::TimedOut,
        status,
        chat,
    }))
}

/// POST /api/v1/chats/:id/operator-message
///
/// Relays an operator message to the end customer.
#[utoipa::path(
    post,
    path = "/api/v1/chats/{id}/operator-message",
    params(("id" = String, Path, description = "Chat id")),
    responses((status = 200, description = "Message relayed"))
)]
pub async fn operator_message(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let text = request.text()?;
    let session = state.session(&token);

    let phone = match request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => Some(phone.to_string()),
        None => session
            .get_chats()
            .await?
            .into_iter()
            .find(|chat| chat.id == id)
            .and_then(|chat| chat.phone),
    };

    let response = session.send_message(&id, phone.as_deref(), text).await?;
    Ok(Json(response))
}

/// POST /api/v1/chats/:id/intervention
#[utoipa::path(
    post,
    path = "/api/v1/chats/{id}/intervention",
    params(("id" = String, Path, description = "Chat id")),
    responses((status = 200, description = "Intervention flag toggled"))
)]
pub async fn toggle_intervention(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let response = state.session(&token).toggle_intervention(&id).await?;
    Ok(Json(response))
}

// ============ Dashboard ============

/// GET /api/v1/dashboard/funnel
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/funnel",
    responses((status = 200, description = "Funnel stages with conversion rates"))
)]
pub async fn dashboard_funnel(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Query(filters): Query<FilterParams>,
) -> Result<Json<FunnelView>, AppError> {
    dashboard::validate_filters(&filters)?;
    let session = state.session(&token);
    let stages = state
        .dashboard_cache
        .get_or_fetch(&token.session_key(), "/getFunilAnalytics", &filters, || {
            session.get_funnel_analytics(&filters)
        })
        .await?;
    Ok(Json(dashboard::funnel_view(stages)))
}

/// GET /api/v1/dashboard/carts
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/carts",
    responses((status = 200, description = "Carts filtered by status"))
)]
pub async fn dashboard_carts(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Query(filters): Query<FilterParams>,
) -> Result<Json<CartsView>, AppError> {
    dashboard::validate_filters(&filters)?;
    let session = state.session(&token);
    let carts = state
        .dashboard_cache
        .get_or_fetch(&token.session_key(), "/getCartAnalytics", &filters, || {
            session.get_cart_analytics(&filters)
        })
        .await?;
    Ok(Json(dashboard::carts_view(carts, &filters)))
}

/// GET /api/v1/dashboard/hots
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/hots",
    responses((status = 200, description = "Most requested products"))
)]
pub async fn dashboard_hots(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Query(filters): Query<FilterParams>,
) -> Result<Json<HotsView>, AppError> {
    dashboard::validate_filters(&filters)?;
    let session = state.session(&token);
    let products = state
        .dashboard_cache
        .get_or_fetch(&token.session_key(), "/getHotProducts", &filters, || {
            session.get_hot_products(&filters)
        })
        .await?;
    Ok(Json(dashboard::hots_view(products, &filters)))
}

/// GET /api/v1/dashboard/last24
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/last24",
    responses((status = 200, description = "Hourly activity for the last 24 hours"))
)]
pub async fn dashboard_last24(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Query(filters): Query<FilterParams>,
) -> Result<Json<Last24View>, AppError> {
    dashboard::validate_filters(&filters)?;
    let session = state.session(&token);
    let buckets = state
        .dashboard_cache
        .get_or_fetch(&token.session_key(), "/getLast24Analytics", &filters, || {
            session.get_last24_analytics(&filters)
        })
        .await?;
    Ok(Json(dashboard::last24_view(buckets)))
}
