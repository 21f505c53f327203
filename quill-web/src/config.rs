use quill_common::{pagination::Paginator, util::PositiveDuration};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

/// Process configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Config {
    pub server_address: IpAddr,
    pub server_port: u16,
    /// Without a database URL everything is kept in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: usize,
    #[serde(default = "default_index_cache_seconds")]
    pub index_cache_seconds: u64,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub worker_id: u8,
    #[serde(default)]
    pub process_id: u8,
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_posts_per_page() -> usize {
    quill_common::pagination::DEFAULT_PAGE_SIZE
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn default_session_ttl_seconds() -> u64 {
    14 * 24 * 60 * 60
}

impl Config {
    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    /// A page size of zero falls back to the default.
    #[must_use]
    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.posts_per_page).unwrap_or_default()
    }

    #[must_use]
    pub fn index_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.index_cache_seconds)
    }

    /// `None` means sessions never expire.
    #[must_use]
    pub fn session_ttl(&self) -> Option<PositiveDuration> {
        PositiveDuration::from_seconds(self.session_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use std::path::Path;

    #[test]
    fn defaults_apply_to_missing_variables() {
        let vars = [
            ("SERVER_ADDRESS".to_owned(), "127.0.0.1".to_owned()),
            ("SERVER_PORT".to_owned(), "8000".to_owned()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.socket_address().to_string(), "127.0.0.1:8000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.media_root, Path::new("media"));
        assert_eq!(config.paginator().page_size(), 10);
        assert_eq!(config.index_cache_ttl().as_secs(), 20);
        assert_eq!(
            config.session_ttl().map(|ttl| ttl.whole_seconds()),
            Some(1_209_600)
        );
    }

    #[test]
    fn overrides() {
        let vars = [
            ("SERVER_ADDRESS".to_owned(), "::1".to_owned()),
            ("SERVER_PORT".to_owned(), "80".to_owned()),
            ("POSTS_PER_PAGE".to_owned(), "0".to_owned()),
            ("SESSION_TTL_SECONDS".to_owned(), "0".to_owned()),
            ("WORKER_ID".to_owned(), "3".to_owned()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.paginator().page_size(), 10);
        assert!(config.session_ttl().is_none());
        assert_eq!(config.worker_id, 3);
        assert_eq!(config.process_id, 0);
    }
}
