use crate::auth::Identity;
use crate::error::Error;
use crate::log::ADMIN;
use crate::models::{ContactMessage, CONTACT_MESSAGES};
use crate::store::{to_document, Direction, DocumentStore, DocumentStoreExt, Query, WriteBatch};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

const NEW: &str = "new";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

pub async fn submit(store: &dyn DocumentStore, form: ContactForm) -> Result<ContactMessage, Error> {
    let name = form.name.trim();
    let email = form.email.trim();
    let message = form.message.trim();

    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err(Error::invalid_argument("Name, email and message are required"));
    }

    let contact = ContactMessage {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        subject: form.subject.trim().to_string(),
        message: message.to_string(),
        status: NEW.to_string(),
        created_at: Utc::now(),
    };

    let mut batch = WriteBatch::new();
    batch.insert_with_id(CONTACT_MESSAGES, &contact.id, to_document(&contact)?);
    store.commit(batch).await?;

    info!(target: ADMIN, msg = "Contact message received", id = contact.id);
    Ok(contact)
}

/// Newest first
pub async fn list(store: &dyn DocumentStore, requester: &Identity) -> Result<Vec<ContactMessage>, Error> {
    requester.require_admin()?;

    store
        .query_as(&Query::collection(CONTACT_MESSAGES).order_by("createdAt", Direction::Descending))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Role;
    use crate::store::MemoryStore;

    fn form(name: &str, message: &str) -> ContactForm {
        ContactForm {
            name: name.to_string(),
            email: "ann@example.com".to_string(),
            subject: "Opening hours".to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn messages_are_stored_as_new() {
        let store = MemoryStore::new();

        let saved = submit(&store, form("Ann", "Are you open on Sunday?")).await.unwrap();
        assert_eq!(saved.status, "new");

        let admin = Identity {
            id: "admin".to_string(),
            email: "admin@example.com".to_string(),
            role: Role::Admin,
        };
        let messages = list(&store, &admin).await.unwrap();
        assert_eq!(messages, vec![saved]);
    }

    #[tokio::test]
    async fn required_fields_are_checked() {
        let store = MemoryStore::new();

        let err = submit(&store, form(" ", "Hello")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = submit(&store, form("Ann", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
