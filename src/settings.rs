//! Application settings.
//!
//! Resolution order (later wins): built-in defaults, settings file
//! (JSON or YAML, optionally nested under a top-level `settings` key),
//! then `SettingsOverrides` (CLI flags, which clap also fills from
//! `GRAPH_*` environment variables).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_TENANT: &str = "common";
const DEFAULT_SCOPES: &[&str] = &["user.read", "mail.read", "mail.send", "files.readwrite"];
const DEFAULT_UPLOAD_PATH: &str = "file.txt";
const DEFAULT_PLAYGROUND_PATH: &str = "/me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub client_id: String,
    pub tenant_id: String,
    pub authority_host: Option<String>,
    pub graph_user_scopes: Vec<String>,
    pub graph_endpoint: String,
    /// Local file sent by "Upload Item To Folder".
    pub upload_path: String,
    /// Name the uploaded file gets in the drive root.
    pub upload_name: String,
    /// Relative Graph path requested by "Make a Graph call".
    pub playground_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            client_id: String::new(),
            tenant_id: DEFAULT_TENANT.to_string(),
            authority_host: None,
            graph_user_scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            upload_name: DEFAULT_UPLOAD_PATH.to_string(),
            playground_path: DEFAULT_PLAYGROUND_PATH.to_string(),
        }
    }
}

/// Values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
    pub authority_host: Option<String>,
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    client_id: Option<String>,
    tenant_id: Option<String>,
    authority_host: Option<String>,
    graph_user_scopes: Option<Vec<String>>,
    graph_endpoint: Option<String>,
    upload_path: Option<String>,
    upload_name: Option<String>,
    playground_path: Option<String>,
}

impl Settings {
    /// Load from `path` (or `appsettings.json` when present) and apply overrides.
    pub fn load(path: Option<&Path>, overrides: SettingsOverrides) -> Result<Self> {
        let file = match path {
            Some(p) => Some(read_settings_file(p)?),
            None => {
                let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if fallback.is_file() {
                    Some(read_settings_file(&fallback)?)
                } else {
                    debug!("no settings file; using defaults and overrides");
                    None
                }
            }
        };
        Self::resolve(file.unwrap_or_default(), overrides)
    }

    fn resolve(file: SettingsFile, overrides: SettingsOverrides) -> Result<Self> {
        let defaults = Settings::default();
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let upload_path = non_empty(file.upload_path).unwrap_or(defaults.upload_path);
        let upload_name = non_empty(file.upload_name).unwrap_or_else(|| {
            Path::new(&upload_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| DEFAULT_UPLOAD_PATH.to_string())
        });

        let scopes: Vec<String> = overrides
            .scopes
            .or(file.graph_user_scopes)
            .unwrap_or(defaults.graph_user_scopes)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let settings = Settings {
            client_id: non_empty(overrides.client_id)
                .or(non_empty(file.client_id))
                .unwrap_or_default(),
            tenant_id: non_empty(overrides.tenant_id)
                .or(non_empty(file.tenant_id))
                .unwrap_or(defaults.tenant_id),
            authority_host: non_empty(overrides.authority_host).or(non_empty(file.authority_host)),
            graph_user_scopes: scopes,
            graph_endpoint: non_empty(file.graph_endpoint).unwrap_or(defaults.graph_endpoint),
            upload_path,
            upload_name,
            playground_path: non_empty(file.playground_path).unwrap_or(defaults.playground_path),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            bail!("clientId is not configured (settings file, GRAPH_CLIENT_ID or --client-id)");
        }
        if self.tenant_id.contains('/') {
            bail!("tenantId must be a tenant name or GUID, got '{}'", self.tenant_id);
        }
        if self.graph_user_scopes.is_empty() {
            bail!("graphUserScopes must contain at least one scope");
        }
        self.authority_url()
            .with_context(|| format!("invalid authorityHost '{}'", self.authority_host()))?;
        self.graph_endpoint_url()
            .with_context(|| format!("invalid graphEndpoint '{}'", self.graph_endpoint))?;
        Ok(())
    }

    pub fn authority_host(&self) -> &str {
        self.authority_host.as_deref().unwrap_or(DEFAULT_AUTHORITY_HOST)
    }

    /// Authority as a joinable base (always ends with `/`).
    pub fn authority_url(&self) -> Result<Url> {
        let host = self.authority_host();
        let normalized = if host.ends_with('/') {
            host.to_string()
        } else {
            format!("{host}/")
        };
        http_url(&normalized)
    }

    pub fn graph_endpoint_url(&self) -> Result<Url> {
        http_url(&self.graph_endpoint)
    }
}

fn http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("'{raw}' is not a URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("unsupported scheme '{other}' in '{raw}'"),
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file: {}", path.display()))?;
    let lower = path.to_string_lossy().to_ascii_lowercase();

    let value: serde_json::Value = if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        let yaml_v: serde_yaml::Value =
            serde_yaml::from_str(&raw).context("failed to parse YAML settings file")?;
        serde_json::to_value(yaml_v).context("failed to convert YAML to JSON")?
    } else {
        serde_json::from_str(&raw).context("failed to parse JSON settings file")?
    };

    if !value.is_object() {
        bail!("settings file root must be an object");
    }
    let section = match value.get("settings") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    debug!(path = %path.display(), "settings file loaded");
    serde_json::from_value(section).context("settings file has unexpected shape")
}
