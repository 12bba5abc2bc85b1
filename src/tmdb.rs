use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::{Config, DEFAULT_SORT, IMAGE_BASE, PAGE_SIZE};
use crate::models::{CastMember, Genre, Movie, MovieDetails, MoviePage, Video};

const MAX_CAST: usize = 10;
const MAX_SIMILAR: usize = 4;

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn popular_movies(&self, page: u32) -> Result<MoviePage>;
    async fn movies_by_genre(&self, genre_id: i64, page: u32) -> Result<MoviePage>;
    async fn search_movies(&self, query: &str, page: u32) -> Result<MoviePage>;
    async fn movie_details(&self, id: i64) -> Result<MovieDetails>;
    async fn genres(&self) -> Result<Vec<Genre>>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl TmdbClient {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = format!("cinescope/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env()?)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}{}?api_key={}&language={}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.language)
        );
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn discover(&self, genre_id: Option<i64>, page: u32) -> Result<MoviePage> {
        let mut params = vec![
            ("page", page.to_string()),
            ("sort_by", DEFAULT_SORT.to_string()),
        ];
        if let Some(id) = genre_id {
            params.push(("with_genres", id.to_string()));
        }
        let url = self.url("/discover/movie", &params);
        let data: PageResponse = self.get_json(&url).await?;
        Ok(data.into_page())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = match self.client.get(url).send().await {
            Ok(res) => res,
            Err(e) if e.is_builder() => {
                error!("TMDB request setup failed: {}", e);
                return Err(anyhow!("Error setting up the request"));
            }
            Err(e) => {
                error!("TMDB request got no response: {}", e);
                return Err(anyhow!("No response received from the API"));
            }
        };
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            error!("TMDB error response (status {}): {}", status, text);
            return Err(anyhow!(status_message(&text)));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn popular_movies(&self, page: u32) -> Result<MoviePage> {
        self.discover(None, page).await
    }

    async fn movies_by_genre(&self, genre_id: i64, page: u32) -> Result<MoviePage> {
        self.discover(Some(genre_id), page).await
    }

    async fn search_movies(&self, query: &str, page: u32) -> Result<MoviePage> {
        let url = self.url(
            "/search/movie",
            &[("query", query.to_string()), ("page", page.to_string())],
        );
        let data: PageResponse = self.get_json(&url).await?;
        Ok(data.into_page())
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
        let url = self.url(
            &format!("/movie/{id}"),
            &[("append_to_response", "credits,similar,videos".to_string())],
        );
        let data: DetailResponse = self.get_json(&url).await?;
        debug!("Fetched details for movie {}", data.id);
        Ok(normalize_details(data))
    }

    async fn genres(&self) -> Result<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreList {
            genres: Vec<Genre>,
        }

        let url = self.url("/genre/movie/list", &[]);
        let data: GenreList = self.get_json(&url).await?;
        Ok(data.genres)
    }
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    results: Vec<Movie>,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    total_results: u32,
}

fn first_page() -> u32 {
    1
}

impl PageResponse {
    fn into_page(self) -> MoviePage {
        MoviePage {
            total_pages: total_pages(self.total_results),
            results: self.results,
            page: self.page,
            total_results: self.total_results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    id: i64,
    title: String,
    poster_path: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    genres: Vec<Genre>,
    runtime: Option<i64>,
    backdrop_path: Option<String>,
    videos: Option<Videos>,
    credits: Option<Credits>,
    similar: Option<PageResponse>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
}

fn normalize_details(detail: DetailResponse) -> MovieDetails {
    let videos = detail
        .videos
        .map(|v| v.results)
        .unwrap_or_default()
        .into_iter()
        .filter(is_trailer)
        .collect();
    let cast = detail
        .credits
        .map(|c| c.cast)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_CAST)
        .collect();
    let similar = detail
        .similar
        .map(|p| p.results)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_SIMILAR)
        .map(|m| Movie {
            vote_average: round_rating(m.vote_average),
            genre_ids: Vec::new(),
            overview: String::new(),
            ..m
        })
        .collect();

    MovieDetails {
        id: detail.id,
        title: detail.title,
        poster_path: detail.poster_path,
        release_date: detail.release_date.unwrap_or_default(),
        vote_average: round_rating(detail.vote_average),
        overview: detail.overview,
        genres: detail.genres,
        runtime_minutes: detail.runtime.unwrap_or_default(),
        backdrop_path: detail.backdrop_path,
        videos,
        cast,
        similar,
    }
}

fn is_trailer(video: &Video) -> bool {
    video.site == "YouTube" && (video.video_type == "Trailer" || video.video_type == "Teaser")
}

fn status_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        status_message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.status_message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "An error occurred with the API".to_string())
}

pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn normalize_movie(movie: Movie) -> Movie {
    Movie {
        vote_average: round_rating(movie.vote_average),
        ..movie
    }
}

pub fn total_pages(total_results: u32) -> u32 {
    total_results.div_ceil(PAGE_SIZE)
}

pub fn poster_url(path: Option<&str>, size: &str) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{IMAGE_BASE}/{size}{p}"))
}

pub fn trailer_url(video: &Video) -> String {
    format!("https://www.youtube.com/watch?v={}", video.key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> TmdbClient {
        TmdbClient::new(&Config::with_base_url("k3y", "http://localhost:9/3/")).expect("client")
    }

    #[test]
    fn rounds_ratings_to_one_decimal() {
        assert_eq!(round_rating(7.26), 7.3);
        assert_eq!(round_rating(7.24), 7.2);
        assert_eq!(round_rating(10.0), 10.0);
        assert_eq!(round_rating(0.0), 0.0);
    }

    #[test]
    fn builds_urls_with_key_language_and_encoded_params() {
        let url = client().url(
            "/search/movie",
            &[("query", "star wars & co".to_string()), ("page", "2".to_string())],
        );
        assert_eq!(
            url,
            "http://localhost:9/3/search/movie?api_key=k3y&language=en-US&query=star%20wars%20%26%20co&page=2"
        );
    }

    #[test]
    fn extracts_status_message_or_generic_fallback() {
        let body = r#"{"status_code":7,"status_message":"Invalid API key: You must be granted a valid key."}"#;
        assert_eq!(
            status_message(body),
            "Invalid API key: You must be granted a valid key."
        );
        assert_eq!(status_message("<html>"), "An error occurred with the API");
    }

    #[test]
    fn computes_total_pages_from_results() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(20), 1);
        assert_eq!(total_pages(21), 2);
        assert_eq!(total_pages(100), 5);
    }

    #[test]
    fn normalizes_details_payload() {
        let cast: Vec<_> = (0..15)
            .map(|i| json!({"id": i, "name": format!("Actor {i}"), "character": "X", "profile_path": null, "order": i}))
            .collect();
        let similar: Vec<_> = (0..6)
            .map(|i| json!({"id": 100 + i, "title": format!("Similar {i}"), "poster_path": null, "release_date": "2020-01-01", "vote_average": 6.66, "genre_ids": [1], "overview": "text"}))
            .collect();
        let value = json!({
            "id": 603,
            "title": "The Matrix",
            "poster_path": "/p.jpg",
            "release_date": "1999-03-30",
            "vote_average": 8.219,
            "overview": "Neo",
            "genres": [{"id": 28, "name": "Action"}],
            "runtime": 136,
            "backdrop_path": null,
            "videos": {"results": [
                {"id": "a", "key": "k1", "name": "Trailer", "site": "YouTube", "type": "Trailer"},
                {"id": "b", "key": "k2", "name": "Clip", "site": "YouTube", "type": "Clip"},
                {"id": "c", "key": "k3", "name": "Vimeo", "site": "Vimeo", "type": "Trailer"},
                {"id": "d", "key": "k4", "name": "Teaser", "site": "YouTube", "type": "Teaser"}
            ]},
            "credits": {"cast": cast},
            "similar": {"results": similar, "page": 1, "total_results": 6}
        });
        let raw: DetailResponse = serde_json::from_value(value).expect("detail deserialize");
        let details = normalize_details(raw);

        assert_eq!(details.vote_average, 8.2);
        assert_eq!(details.runtime_minutes, 136);
        assert_eq!(details.cast.len(), 10);
        assert_eq!(details.similar.len(), 4);
        assert!(details.similar.iter().all(|m| m.genre_ids.is_empty() && m.overview.is_empty()));
        assert_eq!(details.similar[0].vote_average, 6.7);
        let keys: Vec<_> = details.videos.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k4"]);
        assert_eq!(
            trailer_url(&details.videos[0]),
            "https://www.youtube.com/watch?v=k1"
        );
    }

    #[test]
    fn builds_poster_urls() {
        assert_eq!(
            poster_url(Some("/abc.jpg"), "w500").as_deref(),
            Some("https://image.tmdb.org/t/p/w500/abc.jpg")
        );
        assert_eq!(poster_url(None, "w500"), None);
        assert_eq!(poster_url(Some(""), "original"), None);
    }
}
