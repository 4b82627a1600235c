use std::path::PathBuf;

use serde::Deserialize;

/// Upper bound for a single profile picture.
pub const MAX_PICTURE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub server: ServerConfig,
    /// Root for the static pages and `/css`, `/js`, `/img` assets.
    pub public_dir: PathBuf,
    /// Root for uploaded files; pictures live under `profiles/`.
    pub upload_dir: PathBuf,
    pub max_picture_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| database_url_from_parts());
        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(3001),
        };
        Ok(Self {
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            server,
            public_dir: std::env::var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            max_picture_bytes: MAX_PICTURE_BYTES,
        })
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.upload_dir.join("profiles")
    }
}

fn database_url_from_parts() -> String {
    let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    compose_database_url(
        &var("DB_USER", "postgres"),
        &var("DB_PASSWORD", ""),
        &var("DB_HOST", "localhost"),
        &var("DB_PORT", "5433"),
        &var("DB_NAME", "unimap_db"),
    )
}

fn compose_database_url(user: &str, password: &str, host: &str, port: &str, name: &str) -> String {
    if password.is_empty() {
        format!("postgres://{user}@{host}:{port}/{name}")
    } else {
        format!("postgres://{user}:{password}@{host}:{port}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_url_with_and_without_password() {
        assert_eq!(
            compose_database_url("postgres", "", "localhost", "5433", "unimap_db"),
            "postgres://postgres@localhost:5433/unimap_db"
        );
        assert_eq!(
            compose_database_url("app", "s3cret", "db", "5432", "unimap"),
            "postgres://app:s3cret@db:5432/unimap"
        );
    }
}
