use serde::{Deserialize, Serialize};

/// Which pipeline a config belongs to. Stored lowercase; parsing is
/// case-insensitive so legacy mixed-case rows keep resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Generic,
    Llm,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Generic => "generic",
            ServiceKind::Llm => "llm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "generic" => Some(ServiceKind::Generic),
            "llm" => Some(ServiceKind::Llm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLocation {
    #[default]
    Header,
    Query,
}

impl KeyLocation {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("query") {
            KeyLocation::Query
        } else {
            KeyLocation::Header
        }
    }
}

/// One upstream credential from a config's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i32,
    pub value: String,
    pub is_active: bool,
}

/// Runtime view of a stored proxy configuration, keys preloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub kind: ServiceKind,
    pub api_key_location: KeyLocation,
    pub api_key_name: Option<String>,
    pub is_active: bool,
    /// Generic pipeline: the single allowed method.
    pub method: Option<String>,
    /// Generic pipeline: full target URL.
    pub target_url: Option<String>,
    /// LLM pipeline: upstream URL prefix.
    pub target_base_url: Option<String>,
    /// The upstream's wire format (`openai_compatible` when unset).
    pub api_format: String,
    /// The client's wire format; `none` disables translation.
    pub output_format: String,
    pub keys: Vec<ApiKey>,
}

impl ServiceConfig {
    pub fn active_keys(&self) -> Vec<&ApiKey> {
        self.keys.iter().filter(|key| key.is_active).collect()
    }
}
