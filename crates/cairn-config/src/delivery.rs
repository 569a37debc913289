//! Delivery API feature flags.
//!
//! These settings belong to the content application, not to schema
//! validation. cairn loads, validates and reports them; consumers elsewhere
//! act on them.

use crate::ConfigError;
use facet::Facet;

/// Whether the Delivery API (and its media APIs) are enabled by default.
pub const DEFAULT_ENABLED: bool = false;

/// Whether the Delivery API is publicly reachable without an API key by default.
pub const DEFAULT_PUBLIC_ACCESS: bool = true;

/// Whether rich text is rendered as JSON instead of HTML by default.
pub const DEFAULT_RICH_TEXT_OUTPUT_AS_JSON: bool = false;

/// Typed configuration options for the Delivery API.
#[derive(Facet, Debug, Clone, PartialEq)]
#[facet(default)]
pub struct DeliveryApiSettings {
    /// Whether the Delivery API is enabled.
    pub enabled: bool,

    /// Whether the Delivery API (if enabled) is publicly available, or
    /// requires an API key.
    pub public_access: bool,

    /// Key used to authorize access when the API is not public, and for
    /// preview access.
    pub api_key: Option<String>,

    /// Aliases of content types that are never exposed through the Delivery
    /// API, nor added to its query index.
    pub disallowed_content_type_aliases: Vec<String>,

    /// Output rich text values as JSON instead of HTML.
    pub rich_text_output_as_json: bool,

    /// Settings for the media APIs of the Delivery API.
    pub media: MediaSettings,
}

impl Default for DeliveryApiSettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            public_access: DEFAULT_PUBLIC_ACCESS,
            api_key: None,
            disallowed_content_type_aliases: Vec::new(),
            rich_text_output_as_json: DEFAULT_RICH_TEXT_OUTPUT_AS_JSON,
            media: MediaSettings::default(),
        }
    }
}

/// Typed configuration options for the media APIs of the Delivery API.
///
/// The Delivery API settings are the stricter of the two: media cannot be
/// enabled while the Delivery API is disabled, nor public while the Delivery
/// API requires a key.
#[derive(Facet, Debug, Clone, PartialEq)]
#[facet(default)]
pub struct MediaSettings {
    /// Whether the media APIs are enabled.
    pub enabled: bool,

    /// Whether the media APIs (if enabled) are publicly available.
    pub public_access: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            public_access: DEFAULT_PUBLIC_ACCESS,
        }
    }
}

impl DeliveryApiSettings {
    /// Whether an API key is needed to call the Delivery API.
    pub fn requires_api_key(&self) -> bool {
        self.enabled && !self.public_access
    }

    /// Whether the media APIs are effectively enabled.
    pub fn media_enabled(&self) -> bool {
        self.enabled && self.media.enabled
    }

    /// Whether the media APIs are effectively public.
    pub fn media_public_access(&self) -> bool {
        self.public_access && self.media.public_access
    }

    /// Whether content of this type may be exposed. Aliases compare
    /// case-insensitively.
    pub fn is_content_type_allowed(&self, alias: &str) -> bool {
        !self
            .disallowed_content_type_aliases
            .iter()
            .any(|a| a.eq_ignore_ascii_case(alias))
    }

    /// Check the settings for combinations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if self.requires_api_key() && !has_key {
            return Err(ConfigError::Invalid(
                "delivery_api.api_key is required when public_access is false".to_string(),
            ));
        }

        let mut seen: Vec<String> = Vec::new();
        for alias in &self.disallowed_content_type_aliases {
            let folded = alias.trim().to_ascii_lowercase();
            if folded.is_empty() {
                return Err(ConfigError::Invalid(
                    "delivery_api.disallowed_content_type_aliases contains a blank alias"
                        .to_string(),
                ));
            }
            if seen.contains(&folded) {
                return Err(ConfigError::Invalid(format!(
                    "delivery_api.disallowed_content_type_aliases lists '{}' twice",
                    alias
                )));
            }
            seen.push(folded);
        }

        Ok(())
    }
}
