// src/config.rs
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Page size used when a listing request carries no `limit`.
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Directory recipe images are written to.
    #[serde(default = "default_media_root")]
    pub media_root: String,
    /// Prefix of the image URLs handed to clients.
    #[serde(default = "default_media_url")]
    pub media_url: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_token_ttl_hours() -> i64 {
    24
}

const fn default_page_size() -> i64 {
    6
}

fn default_media_root() -> String {
    "media".to_string()
}

fn default_media_url() -> String {
    "/media".to_string()
}

// Recipe bodies carry base64 images.
const fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
