//! Widget customization: branding settings, avatar, embed snippet

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chatbot_admin_widget::{decode, encode, WidgetSettings};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::BackendBase;
use crate::customers::{Customer, CustomerDirectory, CustomersClient};
use crate::error::{Error, Result};
use crate::fallback::{probe, routes};
use crate::fetch::AdminFetch;

/// MIME type for an avatar image, by file extension
pub fn avatar_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Encode bytes as a `data:` URL
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Where a settings save response may carry the stored settings
const SAVED_SETTINGS_PATHS: &[&[&str]] = &[
    &["widget_settings"],
    &["customer", "widget_settings"],
    &["customer", "settings"],
    &["settings"],
];

/// Where an avatar response may carry updated settings
const AVATAR_SETTINGS_PATHS: &[&[&str]] = &[&["widget_settings"], &["customer", "widget_settings"]];

/// Where an upload response may carry the avatar URL
const AVATAR_URL_PATHS: &[&[&str]] = &[
    &["avatar_url"],
    &["url"],
    &["customer", "widget_settings", "avatar_url"],
    &["widget_settings", "avatar_url"],
];

fn lookup<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(body, |v, key| v.get(*key))
}

/// Settings object a response carries, in any of its known envelopes
fn response_settings<'a>(body: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(body, path).filter(|v| v.is_object()))
}

/// Result of an avatar upload
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarUpload {
    /// Public URL of the stored image
    pub url: String,
    /// Settings as updated by the backend, if it returned them
    pub widget_settings: Option<WidgetSettings>,
}

/// Client for the widget customizer endpoints
#[derive(Debug, Clone)]
pub struct WidgetClient {
    base: BackendBase,
    fetch: AdminFetch,
    customers: CustomersClient,
    script_url: String,
}

impl WidgetClient {
    pub(crate) fn new(
        base: BackendBase,
        fetch: AdminFetch,
        customers: CustomersClient,
        script_url: &str,
    ) -> Self {
        Self {
            base,
            fetch,
            customers,
            script_url: script_url.to_string(),
        }
    }

    /// Fetch a customer's full record and read its widget settings
    pub async fn load_settings(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
    ) -> Result<(Customer, WidgetSettings)> {
        let fetched = self.customers.get(id).await?;
        directory.upsert(fetched.clone());
        let customer = directory.find(id).cloned().unwrap_or(fetched);
        let settings = customer.decoded_widget_settings();
        Ok((customer, settings))
    }

    /// Save settings in canonical form; returns the settings as stored
    pub async fn save_settings(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
        settings: &WidgetSettings,
    ) -> Result<WidgetSettings> {
        let canonical = serde_json::to_value(encode(settings))?;
        let probed = probe(
            &self.fetch,
            &routes::widget_settings(&self.base, id, &canonical)?,
        )
        .await?;
        debug!(id, url = %probed.url, "widget settings accepted");

        let body = probed.body();
        let stored = response_settings(body, SAVED_SETTINGS_PATHS).cloned();

        let returned = body
            .get("customer")
            .and_then(|c| match Customer::from_value(c) {
                Ok(customer) => Some(customer),
                Err(e) => {
                    warn!(id, error = %e, "unreadable customer in settings response");
                    None
                }
            })
            .filter(|c| !c.id.is_empty());

        match (returned, &stored) {
            (Some(customer), _) => {
                directory.upsert(customer);
            }
            (None, Some(ws)) => {
                directory.patch_widget_settings(id, ws.clone());
            }
            (None, None) => {}
        }

        info!(id, "widget settings saved");
        Ok(match stored {
            Some(ws) => decode(&json!({ "widget_settings": ws })),
            None => decode(&json!({ "widget_settings": canonical })),
        })
    }

    /// Upload an image file as the customer's bot avatar
    pub async fn upload_avatar(&self, id: &str, path: &Path) -> Result<AvatarUpload> {
        let mime = avatar_mime_type(path).ok_or_else(|| {
            Error::validation(format!(
                "{} is not an image (png, jpg, webp, gif or svg)",
                path.display()
            ))
        })?;

        let bytes = tokio::fs::read(path).await?;
        let encoded = data_url(mime, &bytes);

        let probed = probe(&self.fetch, &routes::avatar_upload(&self.base, id, &encoded)?).await?;
        let body = probed.body();

        let url = AVATAR_URL_PATHS
            .iter()
            .filter_map(|path| lookup(body, path))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::general("avatar uploaded, but the response carried no avatar_url"))?;

        info!(id, url = %url, "avatar uploaded");
        Ok(AvatarUpload {
            url,
            widget_settings: self.settings_in(body),
        })
    }

    /// Remove the customer's bot avatar; returns updated settings if the
    /// backend sent them
    pub async fn delete_avatar(&self, id: &str) -> Result<Option<WidgetSettings>> {
        let probed = probe(&self.fetch, &routes::avatar_delete(&self.base, id)?).await?;
        info!(id, "avatar removed");
        Ok(self.settings_in(probed.body()))
    }

    fn settings_in(&self, body: &Value) -> Option<WidgetSettings> {
        response_settings(body, AVATAR_SETTINGS_PATHS)
            .map(|ws| decode(&json!({ "widget_settings": ws })))
    }

    /// HTML snippet that embeds the widget; `None` for a blank key
    pub fn widget_snippet(&self, widget_key: &str) -> Option<String> {
        let key = widget_key.trim();
        if key.is_empty() {
            return None;
        }
        Some(format!(
            "<!-- Chatbot Widget -->\n<script>\n  window.CHATBOT_WIDGET_KEY = {};\n  window.CHATBOT_API_BASE = {};\n</script>\n<script src=\"{}\" defer></script>",
            Value::from(key),
            Value::from(self.base.as_str()),
            self.script_url
        ))
    }
}
