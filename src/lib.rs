pub mod config;
pub mod debounce;
pub mod favorites;
pub mod filters;
pub mod genres;
pub mod models;
pub mod movies;
pub mod store;
pub mod theme;
pub mod tmdb;
