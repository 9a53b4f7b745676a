use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;
use status_core::{DEFAULT_POLL_INTERVAL, DEFAULT_SIMULATED_PHONE};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "bridge-status.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub poll_interval_secs: u64,
    pub simulate_phone: String,
    pub request_timeout_secs: Option<u64>,
    pub html_output: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            simulate_phone: DEFAULT_SIMULATED_PHONE.into(),
            request_timeout_secs: None,
            html_output: None,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    poll_interval_secs: Option<u64>,
    simulate_phone: Option<String>,
    request_timeout_secs: Option<u64>,
    html_output: Option<PathBuf>,
}

/// Defaults, then the TOML file, then environment variables.
///
/// An explicitly named config file must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if let Some(raw) = read_config_file(path, config_path.is_some())? {
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    settings.server_url = validate_server_url(&settings.server_url)?;
    if settings.poll_interval_secs == 0 {
        bail!("poll interval must be at least one second");
    }
    Ok(settings)
}

/// A missing file is only tolerated when it was not asked for by name.
fn read_config_file(path: &Path, required: bool) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_secs {
        settings.poll_interval_secs = v;
    }
    if let Some(v) = file_cfg.simulate_phone {
        settings.simulate_phone = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = Some(v);
    }
    if let Some(v) = file_cfg.html_output {
        settings.html_output = Some(v);
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("BRIDGE_STATUS_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("APP__POLL_INTERVAL_SECS") {
        settings.poll_interval_secs = v
            .parse()
            .with_context(|| format!("APP__POLL_INTERVAL_SECS is not a number: '{v}'"))?;
    }

    if let Some(v) = lookup("APP__SIMULATE_PHONE") {
        settings.simulate_phone = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = Some(
            v.parse()
                .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?,
        );
    }

    if let Some(v) = lookup("APP__HTML_OUTPUT") {
        settings.html_output = Some(PathBuf::from(v));
    }

    Ok(())
}

pub fn validate_server_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).with_context(|| format!("invalid server url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("server url must use http or https, got '{}'", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("server url '{raw}' has no host");
    }
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
