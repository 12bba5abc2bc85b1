use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_SORT: &str = "popularity.desc";

pub const PAGE_SIZE: u32 = 20;
pub const GENRE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(700);

pub const ALL_GENRES: &str = "All";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STORE_PATH: &str = "cinescope-store.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub timeout: Duration,
    pub store_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .context("TMDB_API_KEY not set")?;
        let base_url = env::var("TMDB_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| TMDB_BASE.to_string());
        let language = env::var("TMDB_LANGUAGE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let timeout_secs = parse_timeout_secs(env::var("TMDB_TIMEOUT_SECS").ok())?;
        let store_path = env::var("CINESCOPE_STORE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            language,
            timeout: Duration::from_secs(timeout_secs),
            store_path,
        })
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

fn parse_timeout_secs(raw: Option<String>) -> Result<u64> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("TMDB_TIMEOUT_SECS is not a number: '{}'", value)),
        None => Ok(DEFAULT_TIMEOUT_SECS),
    }
}
