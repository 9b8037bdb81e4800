pub mod auth;
pub mod client;
pub mod types;

pub use auth::OAuthApp;
pub use client::YouTubeClient;
