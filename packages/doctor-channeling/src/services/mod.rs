pub mod accounts;
pub mod admin;
pub mod appointments;
pub mod contact;
pub mod directory;
pub mod patients;

use crate::error::Error;
use crate::models::{User, USERS};
use crate::store::{Document, DocumentStore, DocumentStoreExt};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

pub(crate) async fn find_user(store: &dyn DocumentStore, id: &str) -> Result<Option<User>, Error> {
    store.get_as::<User>(USERS, id).await
}

pub(crate) async fn find_doctor(store: &dyn DocumentStore, id: &str) -> Result<User, Error> {
    match find_user(store, id).await? {
        Some(user) if user.is_doctor() => Ok(user),
        _ => Err(Error::NotFound("Doctor")),
    }
}

///
/// Applies the default when no limit is given and never exceeds `max`
///
pub(crate) fn bounded_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

///
/// Partial update builder.
/// Only values that are present and not empty end up in the document.
///
#[derive(Debug, Default)]
pub(crate) struct Changes {
    fields: Document,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, field: &str, value: Option<String>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.fields.insert(field.to_string(), Value::String(value));
        }
        self
    }

    pub fn list(&mut self, field: &str, value: Option<Vec<String>>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.fields.insert(field.to_string(), Value::from(value));
        }
        self
    }

    pub fn value(&mut self, field: &str, value: Option<impl Into<Value>>) -> &mut Self {
        if let Some(value) = value {
            self.fields.insert(field.to_string(), value.into());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Finishes the update, stamping `updatedAt`
    pub fn touch(mut self) -> Document {
        self.fields
            .insert("updatedAt".to_string(), Value::String(now()));
        self.fields
    }
}

/// Current time, formatted the way `DateTime<Utc>` fields serialize
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
