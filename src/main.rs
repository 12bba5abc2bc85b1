use anyhow::{anyhow, bail, Context, Result};
use cinescope::config::{Config, ALL_GENRES};
use cinescope::favorites::FavoritesStore;
use cinescope::filters::FilterState;
use cinescope::genres::GenreCache;
use cinescope::models::Movie;
use cinescope::movies::MovieListController;
use cinescope::store::{JsonFileStore, KeyValueStore};
use cinescope::theme::ThemePreference;
use cinescope::tmdb::{poster_url, trailer_url, CatalogApi, TmdbClient};
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cinescope browse [pages] | search <text> [--pages N] | genre <name|All> [--pages N] \
| genres | clear | detail <id> | favorites | fav-add <id> | fav-rm <id> | theme [toggle]";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Browse { pages: u32 },
    Search { text: String, pages: u32 },
    Genre { name: String, pages: u32 },
    Genres,
    Clear,
    Detail { id: i64 },
    Favorites,
    FavAdd { id: i64 },
    FavRm { id: i64 },
    Theme { toggle: bool },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("missing command\n{}", USAGE))?;
        let (words, pages) = split_pages(rest)?;
        let command = match name.as_str() {
            "browse" => Command::Browse {
                pages: match words.first() {
                    Some(n) => n.parse::<u32>().context("pages must be a number")?.clamp(1, 25),
                    None => pages,
                },
            },
            "search" if !words.is_empty() => Command::Search {
                text: words.join(" "),
                pages,
            },
            "genre" if !words.is_empty() => Command::Genre {
                name: words.join(" "),
                pages,
            },
            "genres" => Command::Genres,
            "clear" => Command::Clear,
            "detail" => Command::Detail { id: parse_id(&words)? },
            "favorites" => Command::Favorites,
            "fav-add" => Command::FavAdd { id: parse_id(&words)? },
            "fav-rm" => Command::FavRm { id: parse_id(&words)? },
            "theme" => Command::Theme {
                toggle: words.first().map(String::as_str) == Some("toggle"),
            },
            other => bail!("unknown or incomplete command '{}'\n{}", other, USAGE),
        };
        Ok(command)
    }
}

fn split_pages(args: &[String]) -> Result<(Vec<String>, u32)> {
    let mut words = Vec::new();
    let mut pages = 1;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--pages" {
            let value = iter.next().ok_or_else(|| anyhow!("--pages needs a value"))?;
            pages = value.parse().context("--pages must be a number")?;
        } else {
            words.push(arg.clone());
        }
    }
    Ok((words, pages.clamp(1, 25)))
}

fn parse_id(words: &[String]) -> Result<i64> {
    words
        .first()
        .ok_or_else(|| anyhow!("missing TMDB id"))?
        .parse()
        .context("TMDB id must be a number")
}

#[tokio::main]
async fn main() -> Result<()> {
    match dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    let config = Config::from_env()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&config.store_path)?);
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbClient::new(&config)?);

    run(command, store, catalog).await
}

async fn run(
    command: Command,
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn CatalogApi>,
) -> Result<()> {
    let cache = GenreCache::new(store.clone(), catalog.clone());
    let filters = FilterState::new(store.clone(), cache);
    let favorites = FavoritesStore::new(store.clone());

    match command {
        Command::Browse { pages } => {
            browse(&filters, &favorites, store, catalog, pages).await?;
        }
        Command::Search { text, pages } => {
            filters.set_search_query(text);
            browse(&filters, &favorites, store, catalog, pages).await?;
        }
        Command::Genre { name, pages } => {
            if name.eq_ignore_ascii_case(ALL_GENRES) {
                filters.set_selected_genre(ALL_GENRES, None);
            } else {
                let loaded = filters.genres_loaded().await;
                let genre = loaded
                    .genres
                    .iter()
                    .find(|g| g.name.eq_ignore_ascii_case(&name))
                    .ok_or_else(|| {
                        let known = loaded
                            .genres
                            .iter()
                            .map(|g| g.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ");
                        anyhow!("unknown genre '{}' (known: {})", name, known)
                    })?;
                filters.set_selected_genre(&genre.name, Some(genre.id));
            }
            browse(&filters, &favorites, store, catalog, pages).await?;
        }
        Command::Genres => {
            let loaded = filters.genres_loaded().await;
            if let Some(err) = &loaded.error {
                warn!("Genre list may be stale: {}", err);
            }
            let selected = filters.selection();
            for genre in &loaded.genres {
                let marker = if selected.id() == Some(genre.id) { "*" } else { " " };
                println!("{} {:>6}  {}", marker, genre.id, genre.name);
            }
        }
        Command::Clear => {
            filters.clear_filters();
            println!("Filters cleared");
        }
        Command::Detail { id } => {
            let details = catalog.movie_details(id).await?;
            println!("{} ({})", details.title, details.release_date);
            println!(
                "Rating {:.1}  Runtime {} min  Genres {}",
                details.vote_average,
                details.runtime_minutes,
                details
                    .genres
                    .iter()
                    .map(|g| g.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if let Some(url) = poster_url(details.poster_path.as_deref(), "original") {
                println!("Poster {}", url);
            }
            println!();
            println!("{}", details.overview);
            if !details.cast.is_empty() {
                println!();
                for member in &details.cast {
                    println!("  {} as {}", member.name, member.character);
                }
            }
            for video in &details.videos {
                println!("Trailer {}", trailer_url(video));
            }
            if !details.similar.is_empty() {
                println!();
                println!("Similar:");
                print_movies(&details.similar, &favorites);
            }
        }
        Command::Favorites => print_movies(&favorites.favorites(), &favorites),
        Command::FavAdd { id } => {
            let details = catalog.movie_details(id).await?;
            favorites.add_to_favorites(&details.summary());
            println!("'{}' is in your favorites", details.title);
        }
        Command::FavRm { id } => {
            favorites.remove_from_favorites(id);
            println!("Movie {} removed from favorites", id);
        }
        Command::Theme { toggle } => {
            let mut theme = ThemePreference::load(store, false);
            if toggle {
                theme.toggle();
            }
            println!("Dark mode {}", if theme.dark_mode() { "on" } else { "off" });
        }
    }
    Ok(())
}

async fn browse(
    filters: &FilterState,
    favorites: &FavoritesStore,
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn CatalogApi>,
    pages: u32,
) -> Result<()> {
    let controller = MovieListController::new(catalog, store, filters.subscribe());
    controller.start_browsing().await;
    for _ in 1..pages {
        if !controller.load_more().await {
            break;
        }
    }

    let state = controller.state();
    if let Some(err) = state.error {
        bail!(err);
    }
    let snapshot = filters.snapshot();
    println!(
        "{} of {} results (search '{}', genre {})",
        state.items.len(),
        state.total_results,
        snapshot.search_text,
        snapshot.selected_genre_name()
    );
    print_movies(&state.items, favorites);
    Ok(())
}

fn print_movies(movies: &[Movie], favorites: &FavoritesStore) {
    for movie in movies {
        let star = if favorites.is_favorite(movie.id) { "★" } else { " " };
        println!(
            "{} {:>8}  {:<50} {:>4}  {:.1}",
            star,
            movie.id,
            movie.title,
            movie.year().unwrap_or("----"),
            movie.vote_average
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            Command::parse(&args(&["search", "the", "matrix", "--pages", "3"])).unwrap(),
            Command::Search {
                text: "the matrix".to_string(),
                pages: 3
            }
        );
        assert_eq!(
            Command::parse(&args(&["browse", "2"])).unwrap(),
            Command::Browse { pages: 2 }
        );
        assert_eq!(
            Command::parse(&args(&["fav-add", "603"])).unwrap(),
            Command::FavAdd { id: 603 }
        );
        assert_eq!(
            Command::parse(&args(&["theme", "toggle"])).unwrap(),
            Command::Theme { toggle: true }
        );
        assert!(Command::parse(&args(&["search"])).is_err());
        assert!(Command::parse(&args(&["detail", "abc"])).is_err());
        assert!(Command::parse(&[]).is_err());
    }
}
