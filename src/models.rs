use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: String,
    pub vote_average: f64,
    pub overview: String,
    pub genres: Vec<Genre>,
    pub runtime_minutes: i64,
    pub backdrop_path: Option<String>,
    pub videos: Vec<Video>,
    pub cast: Vec<CastMember>,
    pub similar: Vec<Movie>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: String,
    pub key: String,
    pub name: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: String,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoviePage {
    pub results: Vec<Movie>,
    pub page: u32,
    pub total_results: u32,
    pub total_pages: u32,
}

impl MovieDetails {
    pub fn summary(&self) -> Movie {
        Movie {
            id: self.id,
            title: self.title.clone(),
            poster_path: self.poster_path.clone(),
            release_date: self.release_date.clone(),
            vote_average: self.vote_average,
            genre_ids: self.genres.iter().map(|g| g.id).collect(),
            overview: self.overview.clone(),
        }
    }
}

impl Movie {
    pub fn year(&self) -> Option<&str> {
        self.release_date
            .split('-')
            .next()
            .filter(|y| y.len() == 4)
    }
}
