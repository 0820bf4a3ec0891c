use super::{Account, IdentityProvider, Session};
use crate::config::IdentityConfig;
use crate::error::{AuthenticationError, Error, IdentityError, StoreError};
use crate::fields;
use crate::log::AUTHENTICATION;
use crate::models::{Role, IDENTITIES, IDENTITY_EMAILS};
use crate::store::{to_document, DocumentStore, DocumentStoreExt, WriteBatch};
use aws_lc_rs::{hmac, pbkdf2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Credential record kept in the `identities` collection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    uid: String,
    email: String,
    role: Role,
    salt: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl Credential {
    fn account(&self) -> Account {
        Account {
            uid: self.uid.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// Runs on the blocking pool
    async fn verify_password(&self, password: &str) -> Result<bool, Error> {
        let malformed = || IdentityError::MalformedCredentials {
            uid: self.uid.clone(),
        };
        let salt = hex::decode(&self.salt).map_err(|_| malformed())?;
        let hash = hex::decode(&self.password_hash).map_err(|_| malformed())?;
        let password = password.to_owned();

        let verified = tokio::task::spawn_blocking(move || {
            pbkdf2::verify(
                pbkdf2::PBKDF2_HMAC_SHA256,
                PBKDF2_ITERATIONS,
                &salt,
                password.as_bytes(),
                &hash,
            )
            .is_ok()
        })
        .await
        .map_err(IdentityError::Hashing)?;

        Ok(verified)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    uid: String,
    email: String,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailIndex {
    uid: String,
}

///
/// Identity provider backed by the document store.
///
/// Tokens are `hex(claims).hex(signature)`, signed with HMAC-SHA256.
/// Passwords are hashed with PBKDF2-HMAC-SHA256 and a random salt.
///
pub struct LocalIdentityProvider {
    store: Arc<dyn DocumentStore>,
    key: hmac::Key,
    token_ttl: Duration,
}

impl LocalIdentityProvider {
    pub fn new(store: Arc<dyn DocumentStore>, config: &IdentityConfig) -> Self {
        LocalIdentityProvider {
            store,
            key: hmac::Key::new(hmac::HMAC_SHA256, config.token_secret.as_bytes()),
            token_ttl: config.token_ttl(),
        }
    }

    fn issue_token(&self, account: &Account) -> Result<String, Error> {
        let ttl = chrono::Duration::from_std(self.token_ttl).unwrap_or(chrono::Duration::days(1));
        let claims = Claims {
            uid: account.uid.clone(),
            email: account.email.clone(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        let claims = serde_json::to_vec(&claims).map_err(IdentityError::Claims)?;
        let signature = hmac::sign(&self.key, &claims);

        Ok(format!(
            "{}.{}",
            hex::encode(&claims),
            hex::encode(signature.as_ref())
        ))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AuthenticationError> {
        let (claims, signature) = token
            .split_once('.')
            .ok_or(AuthenticationError::InvalidToken)?;
        let claims = hex::decode(claims).map_err(|_| AuthenticationError::InvalidToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthenticationError::InvalidToken)?;

        hmac::verify(&self.key, &claims, &signature)
            .map_err(|_| AuthenticationError::InvalidToken)?;

        let claims: Claims =
            serde_json::from_slice(&claims).map_err(|_| AuthenticationError::InvalidToken)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthenticationError::InvalidToken);
        }

        Ok(claims)
    }

    async fn credential(&self, uid: &str) -> Result<Option<Credential>, Error> {
        self.store.get_as::<Credential>(IDENTITIES, uid).await
    }

    async fn credential_for_email(&self, email: &str) -> Result<Option<Credential>, Error> {
        match self.store.get_as::<EmailIndex>(IDENTITY_EMAILS, email).await? {
            Some(index) => self.credential(&index.uid).await,
            None => Ok(None),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Salts and hashes on the blocking pool
async fn hash_password(password: &str) -> Result<([u8; SALT_LEN], [u8; HASH_LEN]), Error> {
    let password = password.to_owned();

    let hashed = tokio::task::spawn_blocking(move || {
        let salt: [u8; SALT_LEN] = rand::random();
        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            &salt,
            password.as_bytes(),
            &mut hash,
        );
        (salt, hash)
    })
    .await
    .map_err(IdentityError::Hashing)?;

    Ok(hashed)
}

#[async_trait::async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Session, Error> {
        let email = normalize_email(email);
        let (salt, hash) = hash_password(password).await?;

        let credential = Credential {
            uid: Uuid::new_v4().to_string(),
            email: email.clone(),
            role,
            salt: hex::encode(salt),
            password_hash: hex::encode(hash),
            created_at: Utc::now(),
        };

        // The email index insert fails on a duplicate, which aborts the whole batch
        let mut batch = WriteBatch::new();
        batch.insert_with_id(IDENTITY_EMAILS, &email, fields! {"uid" => credential.uid});
        batch.insert_with_id(IDENTITIES, &credential.uid, to_document(&credential)?);

        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(Error::Store(StoreError::AlreadyExists { collection, .. }))
                if collection == IDENTITY_EMAILS =>
            {
                return Err(Error::conflict("Email already registered"));
            }
            Err(err) => return Err(err),
        }

        debug!(target: AUTHENTICATION, msg = "Account created", uid = credential.uid, %role);

        let account = credential.account();
        let token = self.issue_token(&account)?;
        Ok(Session { token, account })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, Error> {
        let email = normalize_email(email);

        let Some(credential) = self.credential_for_email(&email).await? else {
            debug!(target: AUTHENTICATION, msg = "Sign in for unknown email");
            return Err(AuthenticationError::InvalidCredentials.into());
        };

        if !credential.verify_password(password).await? {
            debug!(target: AUTHENTICATION, msg = "Sign in with wrong password", uid = credential.uid);
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        let account = credential.account();
        let token = self.issue_token(&account)?;
        Ok(Session { token, account })
    }

    async fn verify_token(&self, token: &str) -> Result<Account, Error> {
        let claims = self.decode_token(token)?;

        match self.credential(&claims.uid).await? {
            Some(credential) => Ok(credential.account()),
            None => {
                warn!(target: AUTHENTICATION, msg = "Token for deleted account", uid = claims.uid);
                Err(AuthenticationError::InvalidToken.into())
            }
        }
    }

    async fn set_role(&self, uid: &str, role: Role) -> Result<Account, Error> {
        let mut credential = self
            .credential(uid)
            .await?
            .ok_or_else(|| IdentityError::UnknownAccount {
                uid: uid.to_string(),
            })?;

        self.store
            .update(IDENTITIES, uid, fields! {"role" => role})
            .await?;
        credential.role = role;

        debug!(target: AUTHENTICATION, msg = "Role changed", uid, %role);
        Ok(credential.account())
    }

    async fn delete_account(&self, uid: &str) -> Result<(), Error> {
        let credential = self
            .credential(uid)
            .await?
            .ok_or_else(|| IdentityError::UnknownAccount {
                uid: uid.to_string(),
            })?;

        let mut batch = WriteBatch::new();
        batch.delete(IDENTITY_EMAILS, &credential.email);
        batch.delete(IDENTITIES, uid);
        self.store.commit(batch).await?;

        debug!(target: AUTHENTICATION, msg = "Account deleted", uid);
        Ok(())
    }
}

impl Debug for LocalIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentityProvider")
            .field("key", &"********")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    fn provider_with_ttl(ttl: u64) -> LocalIdentityProvider {
        let config = IdentityConfig {
            token_secret: "test-signing-key-do-not-use-in-production".to_string(),
            token_ttl: ttl,
            admin_email: None,
            admin_password: None,
        };
        LocalIdentityProvider::new(Arc::new(MemoryStore::new()), &config)
    }

    fn provider() -> LocalIdentityProvider {
        provider_with_ttl(3600)
    }

    #[tokio::test]
    async fn sign_in_returns_a_token_that_verifies() {
        let provider = provider();
        let created = provider
            .create_account("Ann@Example.com ", "secret1", Role::Patient)
            .await
            .unwrap();
        assert_eq!(created.account.email, "ann@example.com");

        let session = provider.sign_in("ann@example.com", "secret1").await.unwrap();
        let account = provider.verify_token(&session.token).await.unwrap();

        assert_eq!(account, created.account);
    }

    #[tokio::test]
    async fn password_checks_leave_the_runtime_free() {
        let provider = Arc::new(provider());
        provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        let signing_in = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.sign_in("ann@example.com", "secret1").await })
        };

        // On the single-threaded test runtime this task only gets polled
        // while the sign in is parked waiting for the hash
        let mut turns = 0;
        while !signing_in.is_finished() {
            tokio::task::yield_now().await;
            turns += 1;
        }

        assert!(turns > 1, "sign in held the runtime thread");
        assert!(signing_in.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let provider = provider();
        provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        let err = provider.sign_in("ann@example.com", "secret2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(err.to_string(), "Invalid email or password");

        let err = provider.sign_in("bob@example.com", "secret1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let provider = provider();
        provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        let err = provider
            .create_account("ANN@example.com", "secret2", Role::Doctor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[tokio::test]
    async fn tampered_and_expired_tokens_are_rejected() {
        let provider = provider();
        let session = provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        let (claims, signature) = session.token.split_once('.').unwrap();
        let forged_claims = hex::encode(
            serde_json::to_vec(&Claims {
                uid: session.account.uid.clone(),
                email: "ann@example.com".to_string(),
                exp: i64::MAX,
            })
            .unwrap(),
        );

        for token in [
            "garbage".to_string(),
            format!("{forged_claims}.{signature}"),
            format!("{claims}.00"),
        ] {
            let err = provider.verify_token(&token).await.unwrap_err();
            assert_eq!(err.to_string(), "Invalid or expired token");
        }

        let expired = provider_with_ttl(0);
        let session = expired
            .create_account("bob@example.com", "secret1", Role::Patient)
            .await
            .unwrap();
        assert!(expired.verify_token(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn role_changes_apply_to_existing_tokens() {
        let provider = provider();
        let session = provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        provider
            .set_role(&session.account.uid, Role::Doctor)
            .await
            .unwrap();

        let account = provider.verify_token(&session.token).await.unwrap();
        assert_eq!(account.role, Role::Doctor);
    }

    #[tokio::test]
    async fn deleted_accounts_cannot_authenticate() {
        let provider = provider();
        let session = provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();

        provider.delete_account(&session.account.uid).await.unwrap();

        assert!(provider.verify_token(&session.token).await.is_err());
        assert!(provider.sign_in("ann@example.com", "secret1").await.is_err());

        // The email is free again
        provider
            .create_account("ann@example.com", "secret1", Role::Patient)
            .await
            .unwrap();
    }
}
