//! Analytics views: fetch from the assistant service, filter, summarize.

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::cache_validator::{cache_key, ValidatedCacheEntry};
use crate::errors::AppError;
use crate::models::{Cart, FilterParams, FunnelStage, HotProduct, HourlyBucket};

pub const DEFAULT_HOTS_LIMIT: usize = 10;
const MAX_HOTS_LIMIT: usize = 100;

/// Rejects inverted date ranges.
pub fn validate_filters(filters: &FilterParams) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
        if start > end {
            return Err(AppError::BadRequest(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }
    if filters.limit == Some(0) {
        return Err(AppError::BadRequest("limit must be positive".to_string()));
    }
    Ok(())
}

fn percent(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some((part as f64 / whole as f64 * 10_000.0).round() / 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStageView {
    pub stage: String,
    pub count: u64,
    /// Share of the previous stage that reached this one.
    pub conversion_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelView {
    pub stages: Vec<FunnelStageView>,
    pub overall_conversion_pct: Option<f64>,
}

pub fn funnel_view(stages: Vec<FunnelStage>) -> FunnelView {
    let first = stages.first().map(|s| s.count).unwrap_or(0);
    let last = stages.last().map(|s| s.count).unwrap_or(0);

    let mut previous: Option<u64> = None;
    let stages = stages
        .into_iter()
        .map(|stage| {
            let conversion_pct = previous.and_then(|prev| percent(stage.count, prev));
            previous = Some(stage.count);
            FunnelStageView {
                stage: stage.stage,
                count: stage.count,
                conversion_pct,
            }
        })
        .collect::<Vec<_>>();

    let overall_conversion_pct = if stages.len() > 1 {
        percent(last, first)
    } else {
        None
    };

    FunnelView {
        stages,
        overall_conversion_pct,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub id: String,
    pub phone: Option<String>,
    pub status: String,
    pub item_count: u32,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartsView {
    pub carts: Vec<CartView>,
    pub count: usize,
    pub total_value: f64,
}

/// Carts whose status matches `filters.kind` (`all` or absent keeps everything).
pub fn carts_view(carts: Vec<Cart>, filters: &FilterParams) -> CartsView {
    let wanted = filters
        .kind
        .as_deref()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && k != "all");

    let carts: Vec<CartView> = carts
        .into_iter()
        .filter(|cart| {
            wanted
                .as_deref()
                .map(|status| cart.status.to_lowercase() == status)
                .unwrap_or(true)
        })
        .map(|cart| CartView {
            total: cart.total(),
            item_count: cart.items.iter().map(|i| i.quantity).sum(),
            id: cart.id,
            phone: cart.phone,
            status: cart.status,
        })
        .collect();

    let total_value = carts.iter().map(|c| c.total).sum();
    CartsView {
        count: carts.len(),
        carts,
        total_value,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotsView {
    pub products: Vec<HotProduct>,
    pub total_hits: u64,
}

/// Most requested products, optionally within one category.
pub fn hots_view(products: Vec<HotProduct>, filters: &FilterParams) -> HotsView {
    let category = filters
        .category
        .as_deref()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_HOTS_LIMIT)
        .min(MAX_HOTS_LIMIT);

    let mut products: Vec<HotProduct> = products
        .into_iter()
        .filter(|p| match (&category, &p.category) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => actual.to_lowercase() == *wanted,
            (Some(_), None) => false,
        })
        .collect();
    products.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.name.cmp(&b.name)));

    let total_hits = products.iter().map(|p| p.hits).sum();
    products.truncate(limit);

    HotsView {
        products,
        total_hits,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Last24View {
    pub buckets: Vec<HourlyBucket>,
    pub total_messages: u64,
    pub total_chats: u64,
    pub busiest_hour: Option<String>,
}

pub fn last24_view(buckets: Vec<HourlyBucket>) -> Last24View {
    let total_messages = buckets.iter().map(|b| b.messages).sum();
    let total_chats = buckets.iter().map(|b| b.chats).sum();
    let busiest_hour = buckets
        .iter()
        .filter(|b| b.messages > 0)
        .max_by_key(|b| b.messages)
        .map(|b| b.hour.clone());

    Last24View {
        buckets,
        total_messages,
        total_chats,
        busiest_hour,
    }
}

/// Short-lived cache of raw analytics answers, per session and query.
#[derive(Clone)]
pub struct DashboardCache {
    entries: Cache<String, ValidatedCacheEntry>,
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(5_000)
            .build();
        Self { entries }
    }

    /// Serves `endpoint` for `session` from cache, or runs `fetch` and stores the result.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        session: &str,
        endpoint: &str,
        filters: &FilterParams,
        fetch: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let query = serde_json::to_string(&filters.upstream_query())?;
        let key = cache_key(&[session, endpoint, query.as_str()]);

        if let Some(entry) = self.entries.get(&key).await {
            if let Some(value) = entry.unwrap_validated::<T>() {
                tracing::debug!("{} served from cache", endpoint);
                return Ok(value);
            }
            self.entries.invalidate(&key).await;
        }

        let value = fetch().await?;
        match ValidatedCacheEntry::wrap(&value) {
            Ok(entry) => self.entries.insert(key, entry).await,
            Err(e) => tracing::warn!("Not caching {} response: {}", endpoint, e),
        }
        Ok(value)
    }
}
