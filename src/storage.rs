//! Client key-value store.
//!
//! Stands in for the browser's local storage: one store per session, holding
//! the keys listed in [`StoreKey`]. The intake flow and the handlers only see
//! the [`KeyValueStore`] trait, so the backend can be swapped freely.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::models::Profile;

/// Keys written by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Token,
    Email,
    Country,
    Theme,
    Profile,
    Id,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Token => "token",
            StoreKey::Email => "email",
            StoreKey::Country => "country",
            StoreKey::Theme => "theme",
            StoreKey::Profile => "profile",
            StoreKey::Id => "id",
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AppError>;
    fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: StoreKey) -> Result<(), AppError>;
    fn clear(&self) -> Result<(), AppError>;
}

/// Typed helpers on top of the raw string store.
pub trait KeyValueStoreExt: KeyValueStore {
    /// Reads the stored profile. A missing or unreadable blob is treated as `{}`.
    fn load_profile(&self) -> Result<Profile, AppError> {
        match self.get(StoreKey::Profile)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable stored profile: {}", e);
                Profile::default()
            })),
            None => Ok(Profile::default()),
        }
    }

    /// Overwrites the stored profile wholesale.
    fn save_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let raw = serde_json::to_string(profile)?;
        self.set(StoreKey::Profile, &raw)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStoreExt for T {}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<&'static str, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AppError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Storage("memory store poisoned".to_string()))?;
        Ok(entries.get(key.as_str()).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Storage("memory store poisoned".to_string()))?;
        entries.insert(key.as_str(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Storage("memory store poisoned".to_string()))?;
        entries.remove(key.as_str());
        Ok(())
    }

    fn clear(&self) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Storage("memory store poisoned".to_string()))?;
        entries.clear();
        Ok(())
    }
}

/// Store backed by one JSON object file, rewritten after every change.
///
/// Files hold a handful of short keys, so the rewrite is a small synchronous
/// write. It happens outside the entry lock: readers never wait on the disk,
/// and each snapshot carries a version so a slower writer cannot overwrite a
/// newer file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    version: AtomicU64,
    written: Mutex<u64>,
}

impl JsonFileStore {
    /// Opens (or lazily creates) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AppError::Storage(format!("corrupt store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            version: AtomicU64::new(0),
            written: Mutex::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, raw: &str, version: u64) -> Result<(), AppError> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| AppError::Storage("file store poisoned".to_string()))?;
        if *written >= version {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        *written = version;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let (raw, version) = {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| AppError::Storage("file store poisoned".to_string()))?;
            f(&mut entries);
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            (serde_json::to_string_pretty(&*entries)?, version)
        };
        self.flush(&raw, version)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AppError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Storage("file store poisoned".to_string()))?;
        Ok(entries.get(key.as_str()).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), AppError> {
        self.update(|entries| {
            entries.insert(key.as_str().to_string(), value.to_string());
        })
    }

    fn remove(&self, key: StoreKey) -> Result<(), AppError> {
        self.update(|entries| {
            entries.remove(key.as_str());
        })
    }

    fn clear(&self) -> Result<(), AppError> {
        self.update(|entries| entries.clear())
    }
}

/// Stable session key for a bearer token. The raw token never hits disk as a file name.
pub fn session_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store key for a signed-in user: the upstream id, else the normalized email.
///
/// Tokens rotate on every sign-in while the user stays the same, so client
/// state is filed under this key rather than under the token.
pub fn owner_key(id: Option<&str>, email: &str) -> String {
    let identity = match id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("id:{}", id),
        None => format!("email:{}", email.trim().to_lowercase()),
    };
    session_key(&identity)
}

/// Hands out one client store per user.
#[derive(Clone)]
pub struct SessionStores {
    dir: Option<PathBuf>,
    open: Cache<String, Arc<dyn KeyValueStore>>,
    /// Token hash to owner key, filled at sign-in.
    owners: Cache<String, String>,
}

impl SessionStores {
    /// `dir = None` keeps every store in memory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        let open = Cache::builder()
            .time_to_idle(std::time::Duration::from_secs(24 * 3600))
            .max_capacity(10_000)
            .build();
        let owners = Cache::builder()
            .time_to_idle(std::time::Duration::from_secs(24 * 3600))
            .max_capacity(50_000)
            .build();
        Self { dir, open, owners }
    }

    /// Records that `token_key` belongs to `owner`.
    pub async fn bind(&self, token_key: &str, owner: &str) {
        self.owners
            .insert(token_key.to_string(), owner.to_string())
            .await;
    }

    /// Owner of a token. A token never seen at sign-in owns its own store.
    pub async fn owner_of(&self, token_key: &str) -> String {
        self.owners
            .get(token_key)
            .await
            .unwrap_or_else(|| token_key.to_string())
    }

    /// The store behind a bearer token's session key.
    pub async fn for_token(&self, token_key: &str) -> Result<Arc<dyn KeyValueStore>, AppError> {
        let owner = self.owner_of(token_key).await;
        self.for_session(&owner).await
    }

    /// Returns the store for `session`, opening it on first use.
    pub async fn for_session(&self, session: &str) -> Result<Arc<dyn KeyValueStore>, AppError> {
        let dir = self.dir.clone();
        let key = session.to_string();
        self.open
            .try_get_with(session.to_string(), async move {
                let store: Arc<dyn KeyValueStore> = match dir {
                    Some(dir) => Arc::new(JsonFileStore::open(dir.join(format!("{}.json", key)))?),
                    None => Arc::new(MemoryStore::new()),
                };
                Ok::<_, AppError>(store)
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())
    }
}
