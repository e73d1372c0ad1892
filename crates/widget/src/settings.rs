//! Widget settings codec
//!
//! Customer records have carried their widget branding under several
//! container keys and field names over time. [`decode`] reads any of them
//! into one fully-populated [`WidgetSettings`]; [`encode`] projects settings
//! back onto the canonical wire shape the backend stores.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::color::{clamp_hex_color, is_hex6, pick_readable_text_color};

pub const DEFAULT_BOT_NAME: &str = "Support";
pub const DEFAULT_GREETING_TEXT: &str = "Ich bin hier, falls du Hilfe benötigst!";
pub const DEFAULT_FIRST_MESSAGE: &str = "Hallo! Wie kann ich helfen?";
pub const DEFAULT_COLOR: &str = "#000000";

/// Keys a customer record may keep its settings object under, in priority order
const CONTAINER_KEYS: &[&str] = &["widget_settings", "widget_config", "widget_theme"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    BotName,
    UserLabel,
    GreetingText,
    FirstMessage,
    HeaderColor,
    AccentColor,
    TextColorMode,
    AvatarUrl,
}

/// Aliases inside a settings container object
const NESTED_ALIASES: &[(Field, &[&str])] = &[
    (Field::BotName, &["bot_name", "botName", "bot_name_display", "name"]),
    (Field::UserLabel, &["user_label", "userLabel"]),
    (Field::GreetingText, &["greeting_text", "launcherText", "launcher_text"]),
    (Field::FirstMessage, &["first_message", "botGreeting", "bot_greeting", "greeting"]),
    (Field::HeaderColor, &["header_color", "headerBg", "header_bg"]),
    (Field::AccentColor, &["accent_color", "accent"]),
    (Field::TextColorMode, &["text_color_mode", "textColorMode"]),
    (Field::AvatarUrl, &["avatar_url", "botAvatarUrl", "bot_avatar_url"]),
];

/// Aliases on the customer record itself, used when no container exists
const FLAT_ALIASES: &[(Field, &[&str])] = &[
    (Field::BotName, &["bot_name"]),
    (Field::UserLabel, &["user_label"]),
    (Field::GreetingText, &["greeting_text"]),
    (Field::FirstMessage, &["first_message"]),
    (Field::HeaderColor, &["widget_header_color", "widget_header_bg"]),
    (Field::AccentColor, &["widget_accent_color", "widget_accent"]),
    (Field::TextColorMode, &["text_color_mode"]),
    (Field::AvatarUrl, &["avatar_url", "bot_avatar_url"]),
];

/// How the widget picks its header text color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColorMode {
    /// Black or white, whichever reads better on the header color
    #[default]
    Auto,
    Light,
    Dark,
}

impl TextColorMode {
    /// Parse case-insensitively; anything else, padded values included,
    /// becomes [`TextColorMode::Auto`]
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "light" => Self::Light,
            "dark" => Self::Dark,
            _ => Self::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl std::fmt::Display for TextColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-populated widget branding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSettings {
    pub bot_name: String,
    pub user_label: String,
    pub greeting_text: String,
    pub first_message: String,
    pub header_color: String,
    pub accent_color: String,
    pub text_color_mode: TextColorMode,
    pub avatar_url: Option<String>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            bot_name: DEFAULT_BOT_NAME.to_string(),
            user_label: String::new(),
            greeting_text: DEFAULT_GREETING_TEXT.to_string(),
            first_message: DEFAULT_FIRST_MESSAGE.to_string(),
            header_color: DEFAULT_COLOR.to_string(),
            accent_color: DEFAULT_COLOR.to_string(),
            text_color_mode: TextColorMode::Auto,
            avatar_url: None,
        }
    }
}

impl WidgetSettings {
    /// Text color the widget header will use
    pub fn header_text_color(&self) -> &'static str {
        match self.text_color_mode {
            TextColorMode::Light => crate::color::WHITE,
            TextColorMode::Dark => crate::color::BLACK,
            TextColorMode::Auto => pick_readable_text_color(&self.header_color),
        }
    }

    /// Canonical fields plus the legacy mirror keys and computed header text
    /// color, for display only.
    pub fn preview_json(&self) -> Value {
        let avatar = self.avatar_url.clone().unwrap_or_default();
        json!({
            "bot_name": self.bot_name,
            "user_label": self.user_label,
            "greeting_text": self.greeting_text,
            "first_message": self.first_message,
            "header_color": self.header_color,
            "accent_color": self.accent_color,
            "text_color_mode": self.text_color_mode,
            "avatar_url": avatar,
            "botName": self.bot_name,
            "launcherText": self.greeting_text,
            "botGreeting": self.first_message,
            "headerBg": self.header_color,
            "accent": self.accent_color,
            "botAvatarUrl": avatar,
            "headerText": pick_readable_text_color(&self.header_color),
        })
    }
}

/// Wire shape written back to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSettings {
    pub bot_name: String,
    pub user_label: String,
    pub greeting_text: String,
    pub first_message: String,
    pub header_color: String,
    pub accent_color: String,
    pub text_color_mode: String,
    /// Serialized as an explicit `null` when there is no avatar
    pub avatar_url: Option<String>,
}

/// Project settings onto the canonical field set
pub fn encode(settings: &WidgetSettings) -> CanonicalSettings {
    CanonicalSettings {
        bot_name: settings.bot_name.trim().to_string(),
        user_label: settings.user_label.trim().to_string(),
        greeting_text: settings.greeting_text.trim().to_string(),
        first_message: settings.first_message.trim().to_string(),
        header_color: settings.header_color.trim().to_string(),
        accent_color: settings.accent_color.trim().to_string(),
        text_color_mode: settings.text_color_mode.as_str().to_string(),
        avatar_url: settings
            .avatar_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

/// Read widget settings out of a customer-shaped record.
///
/// Never fails: missing or unusable fields fall back to the defaults.
pub fn decode(record: &Value) -> WidgetSettings {
    let container = CONTAINER_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_object));

    let mut s = match container {
        Some(raw) => decode_nested(raw),
        None => decode_flat(record.as_object()),
    };

    s.bot_name = non_blank_or(&s.bot_name, DEFAULT_BOT_NAME);
    s.user_label = s.user_label.trim().to_string();
    s.greeting_text = non_blank_or(&s.greeting_text, DEFAULT_GREETING_TEXT);
    s.first_message = non_blank_or(&s.first_message, DEFAULT_FIRST_MESSAGE);
    s
}

fn decode_nested(raw: &Map<String, Value>) -> WidgetSettings {
    let mut s = WidgetSettings::default();
    for (field, aliases) in NESTED_ALIASES {
        let Some(value) = first_defined(raw, aliases) else {
            continue;
        };
        let value = value_to_string(value);
        apply(&mut s, *field, value);
    }
    s
}

fn decode_flat(record: Option<&Map<String, Value>>) -> WidgetSettings {
    let mut s = WidgetSettings::default();
    let Some(record) = record else {
        return s;
    };

    for (field, aliases) in FLAT_ALIASES {
        let candidates = aliases
            .iter()
            .filter_map(|key| record.get(*key))
            .map(value_to_string)
            .filter(|v| !v.is_empty());

        let chosen = match field {
            Field::HeaderColor | Field::AccentColor => {
                candidates.map(|v| v.trim().to_string()).find(|v| is_hex6(v))
            }
            _ => candidates.into_iter().next(),
        };

        if let Some(value) = chosen {
            apply(&mut s, *field, value);
        }
    }
    s
}

fn apply(s: &mut WidgetSettings, field: Field, value: String) {
    match field {
        Field::BotName => s.bot_name = value,
        Field::UserLabel => s.user_label = value,
        Field::GreetingText => s.greeting_text = value,
        Field::FirstMessage => s.first_message = value,
        Field::HeaderColor => s.header_color = clamp_hex_color(&value, DEFAULT_COLOR),
        Field::AccentColor => s.accent_color = clamp_hex_color(&value, DEFAULT_COLOR),
        Field::TextColorMode => s.text_color_mode = TextColorMode::parse_lenient(&value),
        Field::AvatarUrl => {
            s.avatar_url = if value.trim().is_empty() { None } else { Some(value) };
        }
    }
}

/// First alias whose value is present and not null
fn first_defined<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_blank_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_color_mode_parsing() {
        assert_eq!(TextColorMode::parse_lenient("LIGHT"), TextColorMode::Light);
        assert_eq!(TextColorMode::parse_lenient("dark"), TextColorMode::Dark);
        assert_eq!(TextColorMode::parse_lenient(" light "), TextColorMode::Auto);
        assert_eq!(TextColorMode::parse_lenient(""), TextColorMode::Auto);
        let s = decode(&json!({ "widget_settings": { "text_color_mode": "dark\n" } }));
        assert_eq!(s.text_color_mode, TextColorMode::Auto);
    }

    #[test]
    fn test_empty_record_yields_defaults() {
        assert_eq!(decode(&json!({})), WidgetSettings::default());
        assert_eq!(decode(&Value::Null), WidgetSettings::default());
    }

    #[test]
    fn test_canonical_round_trip() {
        let canonical = json!({
            "bot_name": "Mia",
            "user_label": "Du",
            "greeting_text": "Fragen?",
            "first_message": "Servus!",
            "header_color": "#123abc",
            "accent_color": "#ff0000",
            "text_color_mode": "dark",
            "avatar_url": "https://cdn.example.com/a.png"
        });
        let settings = decode(&json!({ "widget_settings": canonical.clone() }));
        let encoded = serde_json::to_value(encode(&settings)).unwrap();
        assert_eq!(encoded, canonical);
    }

    #[test]
    fn test_legacy_aliases_populate_canonical_fields() {
        let record = json!({
            "widget_config": {
                "botName": "Legacy Bot",
                "launcherText": "Need help?",
                "bot_greeting": "Hi there",
                "headerBg": "#ABCDEF",
                "accent": "#00ff00",
                "textColorMode": "LIGHT",
                "botAvatarUrl": "https://cdn.example.com/b.png"
            }
        });
        let s = decode(&record);
        assert_eq!(s.bot_name, "Legacy Bot");
        assert_eq!(s.greeting_text, "Need help?");
        assert_eq!(s.first_message, "Hi there");
        assert_eq!(s.header_color, "#abcdef");
        assert_eq!(s.accent_color, "#00ff00");
        assert_eq!(s.text_color_mode, TextColorMode::Light);
        assert_eq!(s.avatar_url.as_deref(), Some("https://cdn.example.com/b.png"));
    }

    #[test]
    fn test_alias_priority_and_nulls() {
        let record = json!({
            "widget_settings": {
                "greeting_text": null,
                "launcherText": "second",
                "launcher_text": "third",
                "bot_name": "  ",
                "header_color": "red"
            }
        });
        let s = decode(&record);
        assert_eq!(s.greeting_text, "second");
        assert_eq!(s.bot_name, DEFAULT_BOT_NAME);
        assert_eq!(s.header_color, DEFAULT_COLOR);
    }

    #[test]
    fn test_container_priority() {
        let record = json!({
            "widget_settings": null,
            "widget_config": { "bot_name": "config" },
            "widget_theme": { "bot_name": "theme" }
        });
        assert_eq!(decode(&record).bot_name, "config");
    }

    #[test]
    fn test_flat_legacy_fields() {
        let record = json!({
            "id": "c1",
            "bot_name": "Flat",
            "widget_header_bg": "#111111",
            "widget_header_color": "nope",
            "widget_accent": "#222222",
            "widget_accent_color": "#333333",
            "text_color_mode": "bogus",
            "bot_avatar_url": "https://x.example/old.png",
            "avatar_url": "https://x.example/new.png"
        });
        let s = decode(&record);
        assert_eq!(s.bot_name, "Flat");
        assert_eq!(s.header_color, "#111111");
        assert_eq!(s.accent_color, "#333333");
        assert_eq!(s.text_color_mode, TextColorMode::Auto);
        assert_eq!(s.avatar_url.as_deref(), Some("https://x.example/new.png"));
    }

    #[test]
    fn test_missing_colors_fall_back() {
        let s = decode(&json!({ "widget_settings": { "header_color": "", "accent_color": null } }));
        assert_eq!(s.header_color, DEFAULT_COLOR);
        assert_eq!(s.accent_color, DEFAULT_COLOR);
    }

    #[test]
    fn test_encode_maps_blank_avatar_to_null() {
        let settings = WidgetSettings {
            bot_name: "  Bot ".to_string(),
            avatar_url: Some("   ".to_string()),
            ..WidgetSettings::default()
        };
        let encoded = serde_json::to_value(encode(&settings)).unwrap();
        assert_eq!(encoded["bot_name"], "Bot");
        assert!(encoded["avatar_url"].is_null());
        assert_eq!(encoded.as_object().unwrap().len(), 8);
    }

    #[test]
    fn test_preview_mirrors_legacy_keys() {
        let settings = WidgetSettings {
            header_color: "#ffffff".to_string(),
            ..WidgetSettings::default()
        };
        let preview = settings.preview_json();
        assert_eq!(preview["headerBg"], "#ffffff");
        assert_eq!(preview["headerText"], "#000000");
        assert_eq!(preview["botName"], DEFAULT_BOT_NAME);
    }

    #[test]
    fn test_header_text_color_respects_mode() {
        let mut s = WidgetSettings::default();
        assert_eq!(s.header_text_color(), "#ffffff");
        s.text_color_mode = TextColorMode::Dark;
        assert_eq!(s.header_text_color(), "#000000");
    }
}
