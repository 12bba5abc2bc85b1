use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PAGE_SIZE;
use crate::filters::{FilterSnapshot, GenreSelection};
use crate::models::{Movie, MoviePage};
use crate::store::{KeyValueStore, WELCOME_SEEN_KEY};
use crate::tmdb::{normalize_movie, CatalogApi};

pub const LOAD_ERROR: &str = "Failed to load movies. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovieQuery {
    Search(String),
    Genre(i64),
    Popular,
}

impl MovieQuery {
    pub fn from_filters(filters: &FilterSnapshot) -> Self {
        if !filters.search_text.is_empty() {
            return MovieQuery::Search(filters.search_text.clone());
        }
        match &filters.selection {
            GenreSelection::Genre { id, .. } => MovieQuery::Genre(*id),
            GenreSelection::All => MovieQuery::Popular,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieListState {
    pub items: Vec<Movie>,
    pub current_page: u32,
    pub total_results: u32,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub error: Option<String>,
    pub has_started_browsing: bool,
}

impl Default for MovieListState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current_page: 1,
            total_results: 0,
            is_loading: false,
            is_loading_more: false,
            error: None,
            has_started_browsing: false,
        }
    }
}

impl MovieListState {
    pub fn has_more(&self) -> bool {
        u64::from(self.current_page) * u64::from(PAGE_SIZE) < u64::from(self.total_results)
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    // Query of the most recently issued refresh.
    query: Option<MovieQuery>,
    // Generation whose first page is the one on screen.
    loaded: Option<u64>,
}

#[derive(Debug, Clone)]
struct Ticket {
    generation: u64,
    query: MovieQuery,
}

pub struct MovieListController {
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn KeyValueStore>,
    filters: watch::Receiver<FilterSnapshot>,
    state: watch::Sender<MovieListState>,
    inner: Mutex<Inner>,
}

impl MovieListController {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn KeyValueStore>,
        filters: watch::Receiver<FilterSnapshot>,
    ) -> Self {
        let welcome_seen = match store.get(WELCOME_SEEN_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("Failed to read welcome flag: {:#}", e);
                false
            }
        };
        let (state, _) = watch::channel(MovieListState {
            has_started_browsing: welcome_seen,
            ..MovieListState::default()
        });
        Self {
            catalog,
            store,
            filters,
            state,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn state(&self) -> MovieListState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MovieListState> {
        self.state.subscribe()
    }

    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more()
    }

    pub async fn start_browsing(&self) {
        if let Err(e) = self.store.set(WELCOME_SEEN_KEY, "true") {
            warn!("Failed to persist welcome flag: {:#}", e);
        }
        self.mark_browsing();
        self.refresh().await;
    }

    pub async fn refresh(&self) {
        let ticket = self.begin_refresh();
        self.complete_refresh(ticket).await;
    }

    pub async fn load_more(&self) -> bool {
        let (ticket, page) = {
            let inner = self.lock_inner();
            let Some(query) = inner.query.clone() else {
                return false;
            };
            if inner.loaded != Some(inner.generation) {
                debug!("No first page for {:?} yet, not loading more", query);
                return false;
            }
            let mut page = 0;
            let started = self.state.send_if_modified(|s| {
                if s.is_loading || s.is_loading_more || !s.has_more() {
                    return false;
                }
                s.is_loading_more = true;
                page = s.current_page + 1;
                true
            });
            if !started {
                return false;
            }
            let ticket = Ticket {
                generation: inner.generation,
                query,
            };
            (ticket, page)
        };

        debug!("Loading page {} for {:?}", page, ticket.query);
        let result = self.fetch(&ticket.query, page).await;

        let inner = self.lock_inner();
        if inner.generation != ticket.generation {
            debug!("Discarding stale page {} for {:?}", page, ticket.query);
            return false;
        }
        self.state.send_modify(|s| {
            s.is_loading_more = false;
            match result {
                Ok(data) => {
                    if s.current_page + 1 != page {
                        warn!("Ignoring out-of-order page {}", page);
                        return;
                    }
                    s.items.extend(data.results.into_iter().map(normalize_movie));
                    s.current_page = page;
                    s.total_results = data.total_results;
                    s.error = None;
                }
                Err(e) => {
                    error!("Error fetching movies: {:#}", e);
                    s.error = Some(LOAD_ERROR.to_string());
                }
            }
        });
        true
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    pub async fn run(self: Arc<Self>) {
        let mut filters = self.filters.clone();
        loop {
            let snapshot = filters.borrow_and_update().clone();
            if snapshot.is_filtered() {
                self.mark_browsing();
            }
            let query = MovieQuery::from_filters(&snapshot);
            let browsing = self.state.borrow().has_started_browsing;
            let issued = self.lock_inner().query.clone();
            if browsing && issued.as_ref() != Some(&query) {
                let ticket = self.begin_refresh();
                let this = self.clone();
                tokio::spawn(async move { this.complete_refresh(ticket).await });
            }
            if filters.changed().await.is_err() {
                debug!("Filter state dropped, stopping movie list sync");
                break;
            }
        }
    }

    fn begin_refresh(&self) -> Ticket {
        let query = MovieQuery::from_filters(&self.filters.borrow());
        let mut inner = self.lock_inner();
        inner.generation += 1;
        inner.query = Some(query.clone());
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.is_loading_more = false;
        });
        Ticket {
            generation: inner.generation,
            query,
        }
    }

    async fn complete_refresh(&self, ticket: Ticket) {
        info!("Fetching movies for {:?}", ticket.query);
        let result = self.fetch(&ticket.query, 1).await;

        let mut inner = self.lock_inner();
        if inner.generation != ticket.generation {
            debug!("Discarding stale first page for {:?}", ticket.query);
            return;
        }
        if result.is_ok() {
            inner.loaded = Some(ticket.generation);
        }
        self.state.send_modify(|s| {
            s.is_loading = false;
            match result {
                Ok(data) => {
                    s.items = data.results.into_iter().map(normalize_movie).collect();
                    s.total_results = data.total_results;
                    s.current_page = 1;
                    s.error = None;
                }
                Err(e) => {
                    error!("Error fetching movies: {:#}", e);
                    s.error = Some(LOAD_ERROR.to_string());
                }
            }
        });
    }

    async fn fetch(&self, query: &MovieQuery, page: u32) -> Result<MoviePage> {
        match query {
            MovieQuery::Search(text) => self.catalog.search_movies(text, page).await,
            MovieQuery::Genre(id) => self.catalog.movies_by_genre(*id, page).await,
            MovieQuery::Popular => self.catalog.popular_movies(page).await,
        }
    }

    fn mark_browsing(&self) {
        self.state.send_if_modified(|s| {
            if s.has_started_browsing {
                return false;
            }
            s.has_started_browsing = true;
            true
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
