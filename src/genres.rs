use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::GENRE_CACHE_TTL;
use crate::models::Genre;
use crate::store::{read_json, KeyValueStore, GENRES_CACHE_KEY, GENRES_TIMESTAMP_KEY};
use crate::tmdb::CatalogApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreSource {
    Cache,
    Remote,
    // Remote refresh failed; an expired cache entry was served instead.
    StaleCache,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreLookup {
    pub genres: Vec<Genre>,
    pub source: GenreSource,
    pub error: Option<String>,
}

struct CacheEntry {
    genres: Vec<Genre>,
    fetched_at: Option<i64>,
}

impl CacheEntry {
    fn is_fresh(&self, now_millis: i64) -> bool {
        self.fetched_at
            .is_some_and(|at| now_millis - at < GENRE_CACHE_TTL.as_millis() as i64)
    }
}

#[derive(Clone)]
pub struct GenreCache {
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn CatalogApi>,
}

impl GenreCache {
    pub fn new(store: Arc<dyn KeyValueStore>, catalog: Arc<dyn CatalogApi>) -> Self {
        Self { store, catalog }
    }

    pub async fn get_genres(&self) -> GenreLookup {
        self.get_genres_at(Utc::now().timestamp_millis()).await
    }

    pub async fn get_genres_at(&self, now_millis: i64) -> GenreLookup {
        let cached = self.read_entry();
        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(now_millis)) {
            debug!("Serving {} genres from cache", entry.genres.len());
            return GenreLookup {
                genres: entry.genres.clone(),
                source: GenreSource::Cache,
                error: None,
            };
        }

        match self.catalog.genres().await {
            Ok(genres) => {
                info!("Fetched {} genres from catalog", genres.len());
                self.write_entry(&genres, now_millis);
                GenreLookup {
                    genres,
                    source: GenreSource::Remote,
                    error: None,
                }
            }
            Err(e) => {
                error!("Error fetching genres: {:#}", e);
                match cached {
                    Some(entry) => {
                        warn!("Falling back to {} cached genres", entry.genres.len());
                        GenreLookup {
                            genres: entry.genres,
                            source: GenreSource::StaleCache,
                            error: Some(e.to_string()),
                        }
                    }
                    None => GenreLookup {
                        genres: Vec::new(),
                        source: GenreSource::Unavailable,
                        error: Some(e.to_string()),
                    },
                }
            }
        }
    }

    fn read_entry(&self) -> Option<CacheEntry> {
        let genres: Vec<Genre> = read_json(self.store.as_ref(), GENRES_CACHE_KEY)?;
        let fetched_at = match self.store.get(GENRES_TIMESTAMP_KEY) {
            Ok(raw) => raw.and_then(|s| s.trim().parse::<i64>().ok()),
            Err(e) => {
                warn!("Failed to read genre cache timestamp: {:#}", e);
                None
            }
        };
        Some(CacheEntry { genres, fetched_at })
    }

    fn write_entry(&self, genres: &[Genre], now_millis: i64) {
        let encoded = match serde_json::to_string(genres) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to encode genres for cache: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(GENRES_CACHE_KEY, &encoded)
            .and_then(|_| self.store.set(GENRES_TIMESTAMP_KEY, &now_millis.to_string()))
        {
            warn!("Failed to write genre cache: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_is_strictly_younger_than_ttl() {
        let ttl = GENRE_CACHE_TTL.as_millis() as i64;
        let entry = CacheEntry {
            genres: Vec::new(),
            fetched_at: Some(1_000),
        };
        assert!(entry.is_fresh(1_000));
        assert!(entry.is_fresh(1_000 + ttl - 1));
        assert!(!entry.is_fresh(1_000 + ttl));

        let undated = CacheEntry {
            genres: Vec::new(),
            fetched_at: None,
        };
        assert!(!undated.is_fresh(1_000));
    }
}
