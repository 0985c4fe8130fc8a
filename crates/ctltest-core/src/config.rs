//! Harness configuration: request parsing mode, routing and session options

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default upper bound for copied bodies and parsed forms (64 MiB).
pub const DEFAULT_MAX_MEMORY: u64 = 1 << 26;

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Copy the raw request body into the context before form parsing
    #[serde(default = "default_true")]
    pub copy_request_body: bool,

    /// Maximum number of body bytes copied or parsed
    #[serde(default = "default_max_memory")]
    pub max_memory: u64,

    /// Keep the request path as-is instead of lower-casing it
    #[serde(default = "default_true")]
    pub router_case_sensitive: bool,

    /// Content-Type of the synthesized default request
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Cookie carrying the session id (empty: no session cookie is sent)
    #[serde(default)]
    pub session_cookie_name: String,

    /// Route pattern used to derive path parameters, e.g. "/users/:id" or "/files/*"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_memory() -> u64 {
    DEFAULT_MAX_MEMORY
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            copy_request_body: true,
            max_memory: DEFAULT_MAX_MEMORY,
            router_case_sensitive: true,
            default_content_type: default_content_type(),
            session_cookie_name: String::new(),
            route: None,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// The format follows the extension: `.json`, `.yaml`/`.yml`, anything else is TOML.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            _ => toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load from default location (.ctltest.toml)
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load the first default config file found in `dir`, or defaults if none exists.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".ctltest.toml", ".ctltest.json", "ctltest.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Set the route pattern
    #[must_use]
    pub fn with_route(mut self, pattern: impl Into<String>) -> Self {
        self.route = Some(pattern.into());
        self
    }

    /// Enable or disable raw body capture
    #[must_use]
    pub fn with_copy_request_body(mut self, copy: bool) -> Self {
        self.copy_request_body = copy;
        self
    }

    /// Set path case sensitivity
    #[must_use]
    pub fn with_case_sensitive(mut self, sensitive: bool) -> Self {
        self.router_case_sensitive = sensitive;
        self
    }

    /// Set the body size bound
    #[must_use]
    pub fn with_max_memory(mut self, max_memory: u64) -> Self {
        self.max_memory = max_memory;
        self
    }

    /// `max_memory` clamped to the address space.
    #[must_use]
    pub fn max_memory_bytes(&self) -> usize {
        usize::try_from(self.max_memory).unwrap_or(usize::MAX)
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# ctltest configuration

# Copy the raw request body into the context (default: true)
copy_request_body = true

# Upper bound for copied bodies and parsed forms, in bytes (default: 64 MiB)
max_memory = 67108864

# Keep request paths as-is; false lower-cases them (default: true)
router_case_sensitive = true

# Content-Type of the synthesized GET request
default_content_type = "application/json"

# Cookie that carries the session id (empty: none)
# session_cookie_name = "sessionid"

# Route pattern for path parameters; "*" captures the splat remainder
# route = "/files/*"
"#
    }
}

/// JSON Schema of the config file format.
pub fn config_schema() -> String {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
