//! Response generation configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a matched capture is turned into a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Static,
    Template,
    Transform,
    Faker,
    Ai,
    Intelligent,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Static => "static",
            ResponseMode::Template => "template",
            ResponseMode::Transform => "transform",
            ResponseMode::Faker => "faker",
            ResponseMode::Ai => "ai",
            ResponseMode::Intelligent => "intelligent",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(ResponseMode::Static),
            "template" => Ok(ResponseMode::Template),
            "transform" => Ok(ResponseMode::Transform),
            "faker" => Ok(ResponseMode::Faker),
            "ai" => Ok(ResponseMode::Ai),
            "intelligent" => Ok(ResponseMode::Intelligent),
            other => Err(format!("unknown response mode '{other}'")),
        }
    }
}

/// Built-in transformers selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerName {
    /// Adds `timestamp` to JSON object bodies
    AddTimestamp,
    /// Overwrites body fields whose keys appear in the request context
    ReplaceIds,
    /// Adds permissive CORS headers
    CorsHeaders,
    /// Re-serializes JSON bodies with indentation
    PrettyJson,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseConfig {
    #[serde(default)]
    pub mode: ResponseMode,
    /// Applied in order by the transform mode
    #[serde(default)]
    pub transformers: Vec<TransformerName>,
    /// Fixed seed makes faker output reproducible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faker_seed: Option<u64>,
}
