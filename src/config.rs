use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_NUM_CLUSTERS: i64 = 6;

const ENV_FILES: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first readable `.env` file. Variables already set in the process win.
///
/// Returns the file that was applied, if any.
pub fn load_env() -> Option<&'static str> {
    let candidates = ENV_FILES.iter().copied().filter(|p| Path::new(p).is_file());
    for path in candidates {
        match load_env_from_file(path) {
            Ok(applied) => {
                info!("Applied {} variable(s) from {}", applied, path);
                return Some(path);
            }
            Err(e) => warn!("Skipping {}: {:#}", path, e),
        }
    }
    debug!("No .env file found; client settings come from the process environment");
    None
}

/// Applies one env file and counts how many variables it actually set.
fn load_env_from_file(file_path: &str) -> Result<usize> {
    let contents = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read env file {}", file_path))?;
    let mut applied = 0;
    for (key, value) in parse_env_lines(&contents) {
        if std::env::var_os(&key).is_none() {
            debug!("{} = {} (from {})", key, value, file_path);
            std::env::set_var(key, value);
            applied += 1;
        }
    }
    Ok(applied)
}

/// `KEY=value` pairs from an env file; comments, blanks and lines without `=` are skipped.
fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let idx = line.find('=')?;
            let key = line[..idx].trim();
            let value = line[idx + 1..].trim().trim_matches('"');
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

/// Settings for talking to the clustering backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub num_clusters: i64,
    pub lat_col: Option<String>,
    pub lon_col: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            num_clusters: DEFAULT_NUM_CLUSTERS,
            lat_col: None,
            lon_col: None,
        }
    }
}

impl ClientConfig {
    /// Builds the configuration from `TRANSPORT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = non_empty("TRANSPORT_API_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let num_clusters = match non_empty("TRANSPORT_NUM_CLUSTERS") {
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!(
                    "TRANSPORT_NUM_CLUSTERS='{}' is not an integer, using {}",
                    raw, DEFAULT_NUM_CLUSTERS
                );
                DEFAULT_NUM_CLUSTERS
            }),
            None => DEFAULT_NUM_CLUSTERS,
        };

        let config = ClientConfig {
            base_url,
            num_clusters,
            lat_col: non_empty("TRANSPORT_LAT_COL"),
            lon_col: non_empty("TRANSPORT_LON_COL"),
        };
        info!(
            "Client config: URL={}, k={}, lat_col={:?}, lon_col={:?}",
            config.base_url, config.num_clusters, config.lat_col, config.lon_col
        );
        config
    }
}
