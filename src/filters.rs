use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ALL_GENRES;
use crate::genres::GenreCache;
use crate::models::Genre;
use crate::store::{read_json, KeyValueStore, SELECTED_GENRE_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenreSelection {
    #[default]
    All,
    Genre { id: i64, name: String },
}

impl GenreSelection {
    pub fn new(name: &str, id: Option<i64>) -> Self {
        match id {
            Some(id) if name != ALL_GENRES => GenreSelection::Genre {
                id,
                name: name.to_string(),
            },
            _ => GenreSelection::All,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GenreSelection::All => ALL_GENRES,
            GenreSelection::Genre { name, .. } => name,
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            GenreSelection::All => None,
            GenreSelection::Genre { id, .. } => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSnapshot {
    pub search_text: String,
    pub selection: GenreSelection,
}

impl FilterSnapshot {
    pub fn selected_genre_name(&self) -> &str {
        self.selection.name()
    }

    pub fn selected_genre_id(&self) -> Option<i64> {
        self.selection.id()
    }

    pub fn is_filtered(&self) -> bool {
        !self.search_text.is_empty() || self.selection != GenreSelection::All
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreState {
    pub genres: Vec<Genre>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSelection {
    genre: String,
    #[serde(rename = "genreId", default)]
    genre_id: Option<i64>,
}

pub struct FilterState {
    store: Arc<dyn KeyValueStore>,
    filters: watch::Sender<FilterSnapshot>,
    genres: watch::Receiver<GenreState>,
    genre_task: JoinHandle<()>,
}

impl FilterState {
    pub fn new(store: Arc<dyn KeyValueStore>, cache: GenreCache) -> Self {
        let selection = restore_selection(store.as_ref());
        let (filters, _) = watch::channel(FilterSnapshot {
            search_text: String::new(),
            selection,
        });

        let (genres_tx, genres) = watch::channel(GenreState {
            genres: Vec::new(),
            is_loading: true,
            error: None,
        });
        let genre_task = tokio::spawn(async move {
            let lookup = cache.get_genres().await;
            debug!(
                "Genres loaded ({:?}, {} entries)",
                lookup.source,
                lookup.genres.len()
            );
            genres_tx.send_replace(GenreState {
                genres: lookup.genres,
                is_loading: false,
                error: lookup.error,
            });
        });

        Self {
            store,
            filters,
            genres,
            genre_task,
        }
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        self.filters.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterSnapshot> {
        self.filters.subscribe()
    }

    pub fn search_text(&self) -> String {
        self.filters.borrow().search_text.clone()
    }

    pub fn selection(&self) -> GenreSelection {
        self.filters.borrow().selection.clone()
    }

    pub fn genres(&self) -> Vec<Genre> {
        self.genres.borrow().genres.clone()
    }

    pub fn is_loading_genres(&self) -> bool {
        self.genres.borrow().is_loading
    }

    pub fn genre_state(&self) -> GenreState {
        self.genres.borrow().clone()
    }

    pub fn subscribe_genres(&self) -> watch::Receiver<GenreState> {
        self.genres.clone()
    }

    pub async fn genres_loaded(&self) -> GenreState {
        let mut rx = self.genres.clone();
        let result = rx.wait_for(|s| !s.is_loading).await.map(|s| s.clone());
        match result {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }

    pub fn set_search_query(&self, text: impl Into<String>) {
        let text = text.into();
        self.filters.send_if_modified(|f| {
            if f.search_text == text {
                return false;
            }
            f.search_text = text;
            true
        });
    }

    pub fn set_selected_genre(&self, name: &str, id: Option<i64>) {
        let selection = GenreSelection::new(name, id);
        let changed = self.filters.send_if_modified(|f| {
            if f.selection == selection {
                return false;
            }
            f.selection = selection.clone();
            true
        });
        if changed {
            debug!("Genre selection set to '{}'", selection.name());
        }
        self.persist_selection(&selection);
    }

    pub fn clear_filters(&self) {
        self.filters.send_if_modified(|f| {
            if !f.is_filtered() {
                return false;
            }
            *f = FilterSnapshot::default();
            true
        });
        if let Err(e) = self.store.remove(SELECTED_GENRE_KEY) {
            warn!("Failed to clear saved genre selection: {:#}", e);
        }
    }

    fn persist_selection(&self, selection: &GenreSelection) {
        let result = match selection {
            GenreSelection::All => self.store.remove(SELECTED_GENRE_KEY),
            GenreSelection::Genre { id, name } => {
                let persisted = PersistedSelection {
                    genre: name.clone(),
                    genre_id: Some(*id),
                };
                serde_json::to_string(&persisted)
                    .map_err(anyhow::Error::from)
                    .and_then(|encoded| self.store.set(SELECTED_GENRE_KEY, &encoded))
            }
        };
        if let Err(e) = result {
            warn!("Error saving genre selection: {:#}", e);
        }
    }
}

impl Drop for FilterState {
    fn drop(&mut self) {
        self.genre_task.abort();
    }
}

fn restore_selection(store: &dyn KeyValueStore) -> GenreSelection {
    let Some(saved) = read_json::<PersistedSelection>(store, SELECTED_GENRE_KEY) else {
        return GenreSelection::All;
    };
    let selection = GenreSelection::new(&saved.genre, saved.genre_id);
    let consistent = (saved.genre == ALL_GENRES) == saved.genre_id.is_none();
    if !consistent {
        warn!(
            "Discarding inconsistent saved genre '{}' ({:?})",
            saved.genre, saved.genre_id
        );
        if let Err(e) = store.remove(SELECTED_GENRE_KEY) {
            warn!("Failed to remove saved genre selection: {:#}", e);
        }
        return GenreSelection::All;
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn selection_keeps_name_and_id_together() {
        assert_eq!(GenreSelection::new("All", Some(28)), GenreSelection::All);
        assert_eq!(GenreSelection::new("Action", None), GenreSelection::All);
        let action = GenreSelection::new("Action", Some(28));
        assert_eq!(action.name(), "Action");
        assert_eq!(action.id(), Some(28));
        assert_eq!(GenreSelection::All.name(), "All");
        assert_eq!(GenreSelection::All.id(), None);
    }

    #[test]
    fn restores_valid_selection() {
        let store = MemoryStore::new().context();
        store
            .set(SELECTED_GENRE_KEY, r#"{"genre":"Comedy","genreId":35}"#)
            .unwrap();
        assert_eq!(
            restore_selection(&store),
            GenreSelection::Genre {
                id: 35,
                name: "Comedy".to_string()
            }
        );
        assert!(store.get(SELECTED_GENRE_KEY).unwrap().is_some());
    }

    #[test]
    fn malformed_selections_reset_and_are_removed() {
        let payloads = [
            "not json",
            "42",
            "null",
            r#"{"genre":5,"genreId":28}"#,
            r#"{"genre":"Action","genreId":"28"}"#,
            r#"{"genre":"Action","genreId":null}"#,
            r#"{"genre":"Action"}"#,
            r#"{"genre":"All","genreId":28}"#,
            r#"{"genreId":28}"#,
        ];
        for payload in payloads {
            let store = MemoryStore::new().context();
            store.set(SELECTED_GENRE_KEY, payload).unwrap();
            assert_eq!(restore_selection(&store), GenreSelection::All, "{payload}");
            assert_eq!(store.get(SELECTED_GENRE_KEY).unwrap(), None, "{payload}");
        }
    }
}
