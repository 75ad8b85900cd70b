//! Vitrine Console Library
//!
//! Backend for the admin console and chat front of the fashion shopping
//! assistant: the profile intake wizard, the chat polling loop, the dashboard
//! analytics views and the client to the assistant service.
//!
//! # Modules
//!
//! - `api_client`: assistant service client (circuit breaker, error decoding).
//! - `auth`: bearer token extraction.
//! - `cache_validator`: checksummed cache entries.
//! - `chat_sync`: waiting for a bot reply.
//! - `chats`: chat list view.
//! - `circuit_breaker`: upstream circuit breaker.
//! - `config`: configuration management.
//! - `dashboard`: analytics views and their cache.
//! - `errors`: error handling types.
//! - `handlers`: HTTP request handlers.
//! - `i18n`: localized strings.
//! - `intake`: profile intake flow.
//! - `models`: wire and profile data models.
//! - `postal`: postal code lookup.
//! - `questionnaire`: the question catalog.
//! - `routes`: router and OpenAPI document.
//! - `storage`: per-session client key-value store.

pub mod api_client;
pub mod auth;
pub mod cache_validator;
pub mod chat_sync;
pub mod chats;
pub mod circuit_breaker;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod handlers;
pub mod i18n;
pub mod intake;
pub mod models;
pub mod postal;
pub mod questionnaire;
pub mod routes;
pub mod storage;
