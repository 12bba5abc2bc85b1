#![allow(dead_code)]

use anyhow::anyhow;
use cinescope::models::{Genre, Movie, MovieDetails, MoviePage};
use cinescope::store::{KeyValueStore, MemoryStore, GENRES_CACHE_KEY, GENRES_TIMESTAMP_KEY};
use cinescope::tmdb::CatalogApi;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Catalog double: pages keyed like `popular:1`, `genre:28:2`, `search:matrix:1`.
/// Keys without a page fail; gated keys wait for `release`.
#[derive(Default)]
pub struct FakeCatalog {
    pub genres: Mutex<Option<Vec<Genre>>>,
    pub genre_calls: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
    pub pages: Mutex<HashMap<String, MoviePage>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeCatalog {
    pub fn with_genres(genres: Vec<Genre>) -> Self {
        let fake = Self::default();
        *fake.genres.lock().unwrap() = Some(genres);
        fake
    }

    pub fn add_page(&self, key: &str, page: MoviePage) {
        self.pages.lock().unwrap().insert(key.to_string(), page);
    }

    pub fn gate(&self, key: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, key: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(key) {
            gate.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn genre_calls(&self) -> usize {
        self.genre_calls.load(Ordering::SeqCst)
    }

    async fn page(&self, key: String) -> anyhow::Result<MoviePage> {
        self.requests.lock().unwrap().push(key.clone());
        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("Internal error: something went wrong"))
    }
}

#[async_trait::async_trait]
impl CatalogApi for FakeCatalog {
    async fn popular_movies(&self, page: u32) -> anyhow::Result<MoviePage> {
        self.page(format!("popular:{page}")).await
    }

    async fn movies_by_genre(&self, genre_id: i64, page: u32) -> anyhow::Result<MoviePage> {
        self.page(format!("genre:{genre_id}:{page}")).await
    }

    async fn search_movies(&self, query: &str, page: u32) -> anyhow::Result<MoviePage> {
        self.page(format!("search:{query}:{page}")).await
    }

    async fn movie_details(&self, id: i64) -> anyhow::Result<MovieDetails> {
        Err(anyhow!("no details for {}", id))
    }

    async fn genres(&self) -> anyhow::Result<Vec<Genre>> {
        self.genre_calls.fetch_add(1, Ordering::SeqCst);
        self.genres
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("No response received from the API"))
    }
}

pub fn genre(id: i64, name: &str) -> Genre {
    Genre {
        id,
        name: name.to_string(),
    }
}

pub fn movie(id: i64, title: &str) -> Movie {
    Movie {
        id,
        title: title.to_string(),
        poster_path: Some(format!("/{id}.jpg")),
        release_date: "2001-01-01".to_string(),
        vote_average: 7.0,
        genre_ids: vec![28],
        overview: format!("About {title}"),
    }
}

/// A page holding movies `first..first + count`.
pub fn page_of(first: i64, count: i64, page: u32, total_results: u32) -> MoviePage {
    MoviePage {
        results: (first..first + count)
            .map(|id| movie(id, &format!("Movie {id}")))
            .collect(),
        page,
        total_results,
        total_pages: total_results.div_ceil(20),
    }
}

pub fn memory_store() -> (MemoryStore, Arc<dyn KeyValueStore>) {
    let shared = MemoryStore::new();
    let ctx: Arc<dyn KeyValueStore> = Arc::new(shared.context());
    (shared, ctx)
}

pub fn seed_genre_cache(store: &dyn KeyValueStore, genres: &[Genre], fetched_at: i64) {
    store
        .set(GENRES_CACHE_KEY, &serde_json::to_string(genres).unwrap())
        .unwrap();
    store
        .set(GENRES_TIMESTAMP_KEY, &fetched_at.to_string())
        .unwrap();
}

pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .map(|v| v.clone())
        .expect("state channel closed")
}

/// Lets spawned tasks run without advancing towards any real deadline.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
