use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::models::Movie;
use crate::store::{subscribe, KeyValueStore, Subscription, FAVORITES_KEY};

pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    favorites: Arc<watch::Sender<Vec<Movie>>>,
    _sync: Subscription,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = match load(store.as_ref()) {
            Ok(list) => list,
            Err(e) => {
                error!("Error loading favorites from storage: {:#}", e);
                Vec::new()
            }
        };
        let favorites = Arc::new(watch::channel(initial).0);

        let target = favorites.clone();
        let sync = subscribe(store.as_ref(), FAVORITES_KEY, move |raw| {
            let Some(raw) = raw else {
                return;
            };
            match serde_json::from_str::<Vec<Movie>>(&raw) {
                Ok(list) => {
                    debug!("Favorites changed elsewhere ({} entries)", list.len());
                    target.send_replace(list);
                }
                Err(e) => error!("Error parsing favorites from storage event: {}", e),
            }
        });

        Self {
            store,
            favorites,
            _sync: sync,
        }
    }

    pub fn favorites(&self) -> Vec<Movie> {
        self.favorites.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Movie>> {
        self.favorites.subscribe()
    }

    pub fn is_favorite(&self, id: i64) -> bool {
        self.favorites.borrow().iter().any(|m| m.id == id)
    }

    pub fn add_to_favorites(&self, movie: &Movie) {
        let result = load(self.store.as_ref()).and_then(|mut current| {
            if current.iter().any(|m| m.id == movie.id) {
                return Ok(None);
            }
            current.push(movie.clone());
            save(self.store.as_ref(), &current)?;
            Ok(Some(current))
        });
        match result {
            Ok(Some(updated)) => {
                info!("Added '{}' to favorites", movie.title);
                self.favorites.send_replace(updated);
            }
            Ok(None) => debug!("'{}' is already a favorite", movie.title),
            Err(e) => error!("Error adding to favorites: {:#}", e),
        }
    }

    pub fn remove_from_favorites(&self, id: i64) {
        let result = load(self.store.as_ref()).and_then(|mut current| {
            current.retain(|m| m.id != id);
            save(self.store.as_ref(), &current)?;
            Ok(current)
        });
        match result {
            Ok(updated) => {
                info!("Removed movie {} from favorites", id);
                self.favorites.send_replace(updated);
            }
            Err(e) => error!("Error removing from favorites: {:#}", e),
        }
    }
}

fn load(store: &dyn KeyValueStore) -> Result<Vec<Movie>> {
    let Some(raw) = store.get(FAVORITES_KEY)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
        Ok(list) => Ok(list),
        Err(e) => {
            warn!("Discarding malformed favorites: {}", e);
            store
                .remove(FAVORITES_KEY)
                .context("Failed to remove malformed favorites")?;
            Ok(Vec::new())
        }
    }
}

fn save(store: &dyn KeyValueStore, favorites: &[Movie]) -> Result<()> {
    let encoded = serde_json::to_string(favorites).context("Failed to encode favorites")?;
    store.set(FAVORITES_KEY, &encoded)
}
