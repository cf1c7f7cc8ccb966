//! Server configuration: TOML file merged with command-line overrides

use anyhow::{Context, Result};
use cadence_router::HubConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Contents of the `--config` file
///
/// ```toml
/// listen = "0.0.0.0:7440"
/// data_dir = "/var/lib/cadence"
///
/// [hub]
/// handoff_timeout_ms = 10000
///
/// [tokens]
/// "secret-token" = "alice"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub data_dir: Option<PathBuf>,
    pub hub: HubConfig,
    /// Bearer token -> identity id
    pub tokens: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Split a `TOKEN=IDENTITY` pair
pub fn parse_token(pair: &str) -> Result<(String, String)> {
    let (token, identity) = pair
        .split_once('=')
        .with_context(|| format!("expected TOKEN=IDENTITY, got `{}`", pair))?;
    let (token, identity) = (token.trim(), identity.trim());
    anyhow::ensure!(
        !token.is_empty() && !identity.is_empty(),
        "empty token or identity in `{}`",
        pair
    );
    Ok((token.to_string(), identity.to_string()))
}
