//! Author profile cache.
//!
//! Callers hand in whatever address form they have. Lookups never block on
//! the network: a miss (or a match with nothing to render) schedules a
//! background fetch and returns what the cache knows right now.

use crate::address;
use crate::contract::ForumContract;
use lumio_io::{ActorId, ProfileView};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

const PREFIX_MATCH_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    Found(ProfileView),
    /// The contract has no profile for this wallet.
    Empty(ActorId),
    /// Nothing fetched yet.
    Unknown,
}

impl ProfileLookup {
    pub fn profile(&self) -> Option<&ProfileView> {
        match self {
            Self::Found(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    fn is_thin(&self) -> bool {
        match self {
            Self::Found(profile) => profile.is_thin(),
            Self::Empty(_) | Self::Unknown => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub lookup: ProfileLookup,
    pub refresh_scheduled: bool,
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Loaded(ProfileView),
    Empty(ActorId),
}

impl CacheEntry {
    fn wallet(&self) -> &ActorId {
        match self {
            Self::Loaded(profile) => &profile.wallet,
            Self::Empty(wallet) => wallet,
        }
    }

    fn to_lookup(&self) -> ProfileLookup {
        match self {
            Self::Loaded(profile) => ProfileLookup::Found(profile.clone()),
            Self::Empty(wallet) => ProfileLookup::Empty(*wallet),
        }
    }
}

#[derive(Clone)]
pub struct ProfileResolver {
    contract: Arc<dyn ForumContract>,
    cache: Arc<RwLock<BTreeMap<String, CacheEntry>>>,
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl ProfileResolver {
    pub fn new(contract: Arc<dyn ForumContract>) -> Self {
        Self {
            contract,
            cache: Arc::new(RwLock::new(BTreeMap::new())),
            inflight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the cached profile and schedules a fetch when the cache has
    /// nothing useful. Never waits for that fetch.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let canonical = address::canonicalize(raw).ok();
        let lookup = self.lookup(raw, canonical.as_deref());
        let refresh_scheduled = match canonical {
            Some(canonical) if lookup.is_thin() => self.spawn_refresh(raw, canonical),
            _ => false,
        };
        Resolution {
            lookup,
            refresh_scheduled,
        }
    }

    /// Cache-only lookup.
    pub fn cached(&self, raw: &str) -> ProfileLookup {
        let canonical = address::canonicalize(raw).ok();
        self.lookup(raw, canonical.as_deref())
    }

    /// Fetches from the contract and caches the result. Fetch errors are
    /// logged and leave the cache untouched.
    pub async fn refresh(&self, raw: &str) -> ProfileLookup {
        let account = match address::parse_account(raw) {
            Ok(account) => account,
            Err(err) => {
                tracing::debug!(address = raw, error = %err, "skipping profile fetch");
                return self.lookup(raw, None);
            }
        };
        match self.contract.get_profile(&account).await {
            Ok(Some(profile)) => self.store(raw, &account, CacheEntry::Loaded(profile)),
            Ok(None) => self.store(raw, &account, CacheEntry::Empty(account)),
            Err(err) => {
                tracing::warn!(account = %account, error = %err, "failed to load profile");
            }
        }
        self.lookup(raw, Some(&account.to_hex()))
    }

    /// Seeds the cache with a profile obtained elsewhere.
    pub fn insert(&self, profile: ProfileView) {
        let wallet = profile.wallet;
        self.store(&wallet.to_hex(), &wallet, CacheEntry::Loaded(profile));
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, raw: &str, canonical: Option<&str>) -> ProfileLookup {
        let Ok(cache) = self.cache.read() else {
            tracing::warn!("profile cache lock poisoned");
            return ProfileLookup::Unknown;
        };

        if let Some(entry) = canonical.and_then(|key| cache.get(key)) {
            return entry.to_lookup();
        }

        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        if let Some(entry) = cache.get(trimmed).or_else(|| cache.get(&lowered)) {
            return entry.to_lookup();
        }

        let needle = canonical.map(str::to_string).unwrap_or(lowered);
        if let Some(entry) = cache
            .values()
            .find(|entry| entry.wallet().to_hex().eq_ignore_ascii_case(&needle))
        {
            return entry.to_lookup();
        }

        if needle.chars().count() >= PREFIX_MATCH_LEN {
            let prefix: String = needle.chars().take(PREFIX_MATCH_LEN).collect();
            if let Some((_, entry)) = cache.iter().find(|(key, entry)| {
                key.to_lowercase().starts_with(&prefix) || entry.wallet().to_hex().starts_with(&prefix)
            }) {
                return entry.to_lookup();
            }
        }

        ProfileLookup::Unknown
    }

    fn store(&self, raw: &str, account: &ActorId, entry: CacheEntry) {
        let Ok(mut cache) = self.cache.write() else {
            tracing::warn!("profile cache lock poisoned");
            return;
        };
        let mut keys = vec![account.to_hex(), raw.trim().to_string(), entry.wallet().to_hex()];
        keys.sort();
        keys.dedup();
        for key in keys.into_iter().filter(|key| !key.is_empty()) {
            let keep_existing = matches!(
                (&entry, cache.get(&key)),
                (CacheEntry::Empty(_), Some(CacheEntry::Loaded(_)))
            );
            if !keep_existing {
                cache.insert(key, entry.clone());
            }
        }
    }

    fn spawn_refresh(&self, raw: &str, canonical: String) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(account = %canonical, "no runtime, profile fetch not scheduled");
            return false;
        };
        match self.inflight.lock() {
            Ok(mut inflight) => {
                if !inflight.insert(canonical.clone()) {
                    return false;
                }
            }
            Err(_) => return false,
        }

        let resolver = self.clone();
        let raw = raw.to_string();
        handle.spawn(async move {
            resolver.refresh(&raw).await;
            if let Ok(mut inflight) = resolver.inflight.lock() {
                inflight.remove(&canonical);
            }
        });
        true
    }
}
