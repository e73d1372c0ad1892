//! Widget branding helpers for the chatbot admin console
//!
//! This crate holds the pure, I/O-free pieces of the console: the
//! readable-text contrast helper, the widget settings codec that understands
//! the historical field names, and allowed-domain normalization.

pub mod color;
pub mod domains;
pub mod settings;

pub use color::{clamp_hex_color, hex_to_rgb, pick_readable_text_color, relative_luminance};
pub use domains::{normalize_domain_entry, parse_allowed_domains};
pub use settings::{
    decode, encode, CanonicalSettings, TextColorMode, WidgetSettings, DEFAULT_BOT_NAME,
    DEFAULT_COLOR, DEFAULT_FIRST_MESSAGE, DEFAULT_GREETING_TEXT,
};
