use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::fs;

use crate::env;
use crate::error::LauncherError;
use crate::version::DEFAULT_VERSION;

const CATALOG_URL: &str =
    "https://raw.githubusercontent.com/anduslauncher/gamelist/master/games.json";

/// Stable identifier of a game within the catalog. The remote document uses
/// both integer and string ids, so both are accepted and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "RawGameId")]
pub struct GameId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGameId {
    Number(u64),
    Text(String),
}

impl From<RawGameId> for GameId {
    fn from(raw: RawGameId) -> Self {
        match raw {
            RawGameId::Number(value) => GameId(value.to_string()),
            RawGameId::Text(value) => GameId(value),
        }
    }
}

impl GameId {
    pub fn new(value: impl Into<String>) -> Self {
        GameId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of platforms the catalog schema can describe, resolved
/// once at startup. Everything that is not Windows launches the Linux
/// artifacts, mirroring the catalog's own two-key scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Win,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Win
        } else {
            Platform::Linux
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Platform::Win => "win",
            Platform::Linux => "linux",
        }
    }
}

fn default_version() -> String {
    DEFAULT_VERSION.to_owned()
}

/// One immutable catalog entry, shaped after the remote document schema.
/// A missing `download_link_*`/`exec_*` pair means the game is not
/// available on that platform.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ID")]
    pub id: GameId,
    pub name: String,
    pub developer: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "devstatus", default)]
    pub dev_status: String,
    #[serde(rename = "icon", default)]
    pub icon_url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub download_link_win: Option<String>,
    #[serde(default)]
    pub download_link_linux: Option<String>,
    #[serde(default)]
    pub exec_win: Option<String>,
    #[serde(default)]
    pub exec_linux: Option<String>,
    #[serde(rename = "website", default)]
    pub website: Option<String>,
    #[serde(rename = "rss_feed", default)]
    pub rss_feed: Option<String>,
}

impl CatalogEntry {
    pub fn download_url(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Win => self.download_link_win.as_deref(),
            Platform::Linux => self.download_link_linux.as_deref(),
        }
    }

    pub fn executable(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Win => self.exec_win.as_deref(),
            Platform::Linux => self.exec_linux.as_deref(),
        }
    }
}

/// The full game list, in presentation order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    pub games: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn find(&self, id: &GameId) -> Option<&CatalogEntry> {
        self.games.iter().find(|entry| &entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

fn parse_document(text: &str) -> Result<Catalog, String> {
    let catalog: Catalog =
        serde_json::from_str(text).map_err(|e| format!("catalog parse error: {e}"))?;
    Ok(catalog)
}

/// Fetches the remote catalog and keeps a local copy for offline use. The
/// remote document is the source of truth; the cache is only consulted when
/// the network fetch fails.
pub struct CatalogRepository {
    client: Client,
    remote_url: String,
    cache_path: PathBuf,
    current: Option<Catalog>,
}

impl CatalogRepository {
    pub fn new() -> Self {
        Self::with_source(CATALOG_URL, env::catalog_cache_path())
    }

    pub fn with_source(remote_url: impl Into<String>, cache_path: PathBuf) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|err| {
                warn!("catalog: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self {
            client,
            remote_url: remote_url.into(),
            cache_path,
            current: None,
        }
    }

    /// Fetch the catalog from the remote URL, persisting it to the cache
    /// file on success. A failed fetch falls back to the cache; only when
    /// both are unusable does the call fail.
    pub async fn refresh(&mut self) -> Result<Catalog, LauncherError> {
        match self.fetch_remote().await {
            Ok((text, catalog)) => {
                if let Err(err) = self.persist_cache(&text).await {
                    warn!("catalog: unable to persist cache: {err}");
                }
                info!("catalog: loaded {} entries from remote", catalog.len());
                self.current = Some(catalog.clone());
                Ok(catalog)
            }
            Err(reason) => {
                warn!("catalog: remote fetch failed ({reason}); trying local cache");
                match self.load_cache().await {
                    Ok(catalog) => {
                        info!("catalog: loaded {} entries from cache", catalog.len());
                        self.current = Some(catalog.clone());
                        Ok(catalog)
                    }
                    Err(cache_err) => Err(LauncherError::CatalogUnavailable(format!(
                        "{reason}; cache: {cache_err}"
                    ))),
                }
            }
        }
    }

    /// The last successfully loaded catalog, without touching the network.
    pub fn cached(&self) -> Option<&Catalog> {
        self.current.as_ref()
    }

    async fn fetch_remote(&self) -> Result<(String, Catalog), String> {
        let resp = self
            .client
            .get(&self.remote_url)
            .send()
            .await
            .map_err(|e| format!("catalog request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("catalog status error: {e}"))?;
        let text = resp
            .text()
            .await
            .map_err(|e| format!("catalog body error: {e}"))?;
        let catalog = parse_document(&text)?;
        Ok((text, catalog))
    }

    async fn load_cache(&self) -> Result<Catalog, String> {
        let bytes = fs::read(&self.cache_path)
            .await
            .map_err(|e| format!("cache read error: {e}"))?;
        let text = String::from_utf8_lossy(&bytes);
        parse_document(&text)
    }

    // The raw remote text is persisted unchanged so the cache file keeps the
    // exact remote schema. Written to a temp file first so a crash mid-write
    // cannot leave a torn document behind.
    async fn persist_cache(&self, text: &str) -> Result<(), String> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("cache dir error: {e}"))?;
        }
        let tmp = self.cache_path.with_extension("json.tmp");
        fs::write(&tmp, text.as_bytes())
            .await
            .map_err(|e| format!("cache write error: {e}"))?;
        fs::rename(&tmp, &self.cache_path)
            .await
            .map_err(|e| format!("cache rename error: {e}"))?;
        debug!("catalog: cache updated at {}", self.cache_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "games": [
            {
                "ID": 1,
                "name": "Starfall",
                "developer": "Orbit Works",
                "description": "A drifting puzzle game.",
                "devstatus": "Beta",
                "icon": "https://example.com/starfall.png",
                "version": "1.2.0",
                "download_link_linux": "https://example.com/starfall.zip",
                "exec_linux": "starfall/run",
                "website": "https://example.com",
                "rss_feed": "https://example.com/feed.xml"
            },
            {
                "ID": "mole-quest",
                "name": "Mole Quest",
                "developer": "Burrow Bros",
                "download_link_win": "https://example.com/mole.zip",
                "exec_win": "mole.exe"
            }
        ]
    }"#;

    #[test]
    fn parses_remote_document_shape() {
        let catalog = parse_document(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let starfall = &catalog.games[0];
        assert_eq!(starfall.id, GameId::new("1"));
        assert_eq!(starfall.version, "1.2.0");
        assert_eq!(
            starfall.download_url(Platform::Linux),
            Some("https://example.com/starfall.zip")
        );
        assert_eq!(starfall.executable(Platform::Linux), Some("starfall/run"));
        assert_eq!(starfall.download_url(Platform::Win), None);

        let mole = &catalog.games[1];
        assert_eq!(mole.id, GameId::new("mole-quest"));
        // Version absent in the document defaults to 0.0.0.
        assert_eq!(mole.version, DEFAULT_VERSION);
        assert!(mole.website.is_none());
    }

    #[test]
    fn find_locates_entries_by_id() {
        let catalog = parse_document(SAMPLE).unwrap();
        assert!(catalog.find(&GameId::new("mole-quest")).is_some());
        assert!(catalog.find(&GameId::new("99")).is_none());
    }

    #[test]
    fn rejects_documents_without_games_array() {
        assert!(parse_document("{}").is_err());
        assert!(parse_document("not json").is_err());
    }

    #[tokio::test]
    async fn refresh_falls_back_to_cache_when_remote_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("games.json");
        std::fs::write(&cache_path, SAMPLE).unwrap();

        // Port 9 (discard) refuses connections immediately.
        let mut repo = CatalogRepository::with_source("http://127.0.0.1:9/games.json", cache_path);
        let catalog = repo.refresh().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(repo.cached().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn refresh_fails_when_remote_and_cache_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = CatalogRepository::with_source(
            "http://127.0.0.1:9/games.json",
            dir.path().join("missing.json"),
        );
        let err = repo.refresh().await.unwrap_err();
        assert!(matches!(err, LauncherError::CatalogUnavailable(_)));
        assert!(repo.cached().is_none());
    }
}
