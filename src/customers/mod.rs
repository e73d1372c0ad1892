//! Customer records: the local directory and the customers API

mod types;

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BackendBase;
use crate::error::{Error, Result};
use crate::fallback::{probe, routes};
use crate::fetch::AdminFetch;

pub use types::*;

/// One entry of a customer picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerOption {
    pub id: String,
    pub label: String,
}

/// Filtered picker contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Picker {
    pub options: Vec<PickerOption>,
    /// The previous selection, if it is still among the options
    pub selected: Option<String>,
}

/// Locally cached customer records, sorted for display.
///
/// Ids are unique: [`CustomerDirectory::upsert`] merges into an existing
/// record instead of adding a second one.
#[derive(Debug, Clone, Default)]
pub struct CustomerDirectory {
    customers: Vec<Customer>,
}

impl CustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole directory, sorted by name (or id), ignoring case
    pub fn replace_all(&mut self, customers: Vec<Customer>) {
        let mut seen = HashSet::new();
        let mut customers: Vec<Customer> = customers
            .into_iter()
            .filter(|c| !c.id.is_empty() && seen.insert(c.id.clone()))
            .collect();
        customers.sort_by_cached_key(|c| c.sort_key().to_lowercase());
        self.customers = customers;
    }

    /// Insert a record, or merge its fields over the cached one.
    ///
    /// Records without an id are ignored; returns whether anything changed.
    pub fn upsert(&mut self, customer: Customer) -> bool {
        if customer.id.is_empty() {
            return false;
        }
        match self.customers.iter_mut().find(|c| c.id == customer.id) {
            Some(cached) => cached.merge(customer),
            None => self.customers.push(customer),
        }
        true
    }

    pub fn find(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Customer> {
        let index = self.customers.iter().position(|c| c.id == id)?;
        Some(self.customers.remove(index))
    }

    /// Case-insensitive substring match over name and id; a blank query
    /// matches everything
    pub fn filter(&self, query: &str) -> Vec<&Customer> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.customers.iter().collect();
        }
        self.customers
            .iter()
            .filter(|c| {
                let haystack = format!("{} {}", c.name.as_deref().unwrap_or_default(), c.id);
                haystack.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Replace the cached widget settings of one record
    pub fn patch_widget_settings(&mut self, id: &str, settings: Value) -> bool {
        match self.customers.iter_mut().find(|c| c.id == id) {
            Some(customer) => {
                customer.widget_settings = Some(settings);
                true
            }
            None => false,
        }
    }

    /// Build picker options for a query, keeping the selection only if it
    /// is still visible
    pub fn picker_options(&self, query: &str, selected: Option<&str>) -> Picker {
        let options: Vec<PickerOption> = self
            .filter(query)
            .into_iter()
            .map(|c| PickerOption {
                id: c.id.clone(),
                label: c.label(),
            })
            .collect();
        let selected = selected
            .filter(|id| options.iter().any(|o| o.id == *id))
            .map(str::to_string);
        Picker { options, selected }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Customer> {
        self.customers.iter()
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

/// Client for the customer management endpoints
#[derive(Debug, Clone)]
pub struct CustomersClient {
    base: BackendBase,
    fetch: AdminFetch,
}

impl CustomersClient {
    pub(crate) fn new(base: BackendBase, fetch: AdminFetch) -> Self {
        Self { base, fetch }
    }

    fn customers_url(&self) -> Result<Url> {
        self.base.url(&["admin", "customers"])
    }

    fn customer_url(&self, id: &str) -> Result<Url> {
        self.base.url(&["admin", "customers", id])
    }

    /// Load all customers into the directory; returns how many were loaded
    pub async fn list(&self, directory: &mut CustomerDirectory) -> Result<usize> {
        let body = self.fetch.get(self.customers_url()?).execute().await?;

        let items = match &body {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("customers")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        let customers = items
            .iter()
            .filter_map(|item| match Customer::from_value(item) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable customer record");
                    None
                }
            })
            .collect();

        directory.replace_all(customers);
        debug!(count = directory.len(), "customers loaded");
        Ok(directory.len())
    }

    /// Fetch one customer's full record
    pub async fn get(&self, id: &str) -> Result<Customer> {
        let body = self.fetch.get(self.customer_url(id)?).execute().await?;
        Customer::from_body(&body)
    }

    /// Return the cached record when it already has its details, otherwise
    /// fetch and cache it.
    ///
    /// A failed fetch falls back to whatever is cached.
    pub async fn ensure_full(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
    ) -> Option<Customer> {
        let cached = directory.find(id).cloned();
        if cached.as_ref().map_or(false, Customer::has_full_details) {
            return cached;
        }

        match self.get(id).await {
            Ok(customer) => {
                directory.upsert(customer.clone());
                Some(customer)
            }
            Err(e) => {
                debug!(id, error = %e, "could not load full customer record");
                cached
            }
        }
    }

    /// Create a customer; the backend must answer with the new id
    pub async fn create(
        &self,
        directory: &mut CustomerDirectory,
        draft: &CustomerDraft,
    ) -> Result<Customer> {
        let body = self
            .fetch
            .post(self.customers_url()?)
            .json(&draft.to_create_payload())?
            .execute()
            .await?;

        let created = Customer::from_body(&body)?;
        if created.id.is_empty() {
            return Err(Error::general(
                "customer created, but the response carried no id",
            ));
        }

        info!(id = %created.id, "customer created");
        directory.upsert(created.clone());
        Ok(created)
    }

    /// Update a customer's editable fields
    pub async fn update(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
        draft: &CustomerDraft,
    ) -> Result<Customer> {
        let body = self
            .fetch
            .patch(self.customer_url(id)?)
            .json(&draft.to_update_payload())?
            .execute()
            .await?;

        let updated = Customer::from_body(&body)?;
        info!(id, "customer updated");
        directory.upsert(updated.clone());
        Ok(updated)
    }

    /// Delete a customer, or report what a delete would remove
    pub async fn delete(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
        options: DeleteOptions,
    ) -> Result<DeleteOutcome> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::validation("customer_id is required"));
        }
        options.validate()?;

        let body = self
            .fetch
            .delete(self.customer_url(id)?)
            .json(&options.to_payload())?
            .execute()
            .await?;

        if options.dry_run {
            return Ok(DeleteOutcome {
                dry_run: true,
                counts: DeleteCounts::from_value(body.get("would_delete")),
            });
        }

        directory.remove(id);
        info!(id, "customer deleted");
        Ok(DeleteOutcome {
            dry_run: false,
            counts: DeleteCounts::from_value(body.get("deleted")),
        })
    }

    /// Issue a new widget key; the old one stops working
    pub async fn regenerate_widget_key(
        &self,
        directory: &mut CustomerDirectory,
        id: &str,
    ) -> Result<Customer> {
        let probed = probe(&self.fetch, &routes::widget_key(&self.base, id)?).await?;
        let body = probed.body();

        // The key has already rotated server-side; never turn that into an error
        let mut updated = Customer::from_body(body).unwrap_or_else(|e| {
            warn!(id, error = %e, "unreadable customer in widget key response");
            Customer::default()
        });
        if updated.id.is_empty() {
            updated.id = id.to_string();
        }
        if updated.widget_key.is_none() {
            updated.widget_key = raw_widget_key(body);
        }

        info!(id, url = %probed.url, "widget key regenerated");
        directory.upsert(updated.clone());
        Ok(directory.find(&updated.id).cloned().unwrap_or(updated))
    }
}

/// Widget key straight from a response body, whatever its envelope
fn raw_widget_key(body: &Value) -> Option<String> {
    [body.get("widget_key"), body.get("customer").and_then(|c| c.get("widget_key"))]
        .into_iter()
        .flatten()
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer(id: &str, name: Option<&str>) -> Customer {
        Customer {
            id: id.to_string(),
            name: name.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_replace_all_sorts_ignoring_case() {
        let mut dir = CustomerDirectory::new();
        dir.replace_all(vec![
            customer("c3", Some("zeta")),
            customer("c1", Some("Alpha")),
            customer("b-id", None),
            customer("", Some("no id")),
        ]);
        let ids: Vec<&str> = dir.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "b-id", "c3"]);
    }

    #[test]
    fn test_upsert_keeps_ids_unique() {
        let mut dir = CustomerDirectory::new();
        assert!(dir.upsert(customer("c1", Some("Acme"))));
        let mut incoming = customer("c1", None);
        incoming.widget_key = Some("wk".into());
        assert!(dir.upsert(incoming));
        assert!(!dir.upsert(customer("", Some("ghost"))));

        assert_eq!(dir.len(), 1);
        let c = dir.find("c1").unwrap();
        assert_eq!(c.name.as_deref(), Some("Acme"));
        assert_eq!(c.widget_key.as_deref(), Some("wk"));
    }

    #[test]
    fn test_filter_and_picker() {
        let mut dir = CustomerDirectory::new();
        dir.replace_all(vec![customer("acme-1", Some("Acme")), customer("beta-2", Some("Beta"))]);

        assert_eq!(dir.filter("  ").len(), 2);
        assert_eq!(dir.filter("BETA")[0].id, "beta-2");
        assert_eq!(dir.filter("acme-1")[0].id, "acme-1");

        let picker = dir.picker_options("acme", Some("beta-2"));
        assert_eq!(picker.options.len(), 1);
        assert_eq!(picker.options[0].label, "Acme — acme-1");
        assert_eq!(picker.selected, None);

        let picker = dir.picker_options("", Some("beta-2"));
        assert_eq!(picker.selected.as_deref(), Some("beta-2"));
    }

    #[test]
    fn test_patch_widget_settings_and_remove() {
        let mut dir = CustomerDirectory::new();
        dir.upsert(customer("c1", None));
        assert!(dir.patch_widget_settings("c1", json!({ "bot_name": "Max" })));
        assert!(!dir.patch_widget_settings("nope", json!({})));
        assert_eq!(dir.find("c1").unwrap().decoded_widget_settings().bot_name, "Max");
        assert!(dir.remove("c1").is_some());
        assert!(dir.is_empty());
    }
}
