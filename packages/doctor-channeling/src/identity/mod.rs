mod local;

pub use local::LocalIdentityProvider;

use crate::error::Error;
use crate::models::Role;
use serde::{Deserialize, Serialize};

///
/// An account as the identity provider knows it.
/// The role here is authoritative; the `role` on a user profile is a mirror.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// A bearer token issued for an account
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub account: Account,
}

///
/// Issues and verifies bearer credentials and owns the role claim.
///
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    ///
    /// Creates an account and signs it in.
    /// Fails with `Conflict` if the email is already registered.
    ///
    async fn create_account(&self, email: &str, password: &str, role: Role)
        -> Result<Session, Error>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, Error>;

    ///
    /// Resolves a bearer token to its account, reading the current role.
    /// Tokens for deleted accounts are rejected.
    ///
    async fn verify_token(&self, token: &str) -> Result<Account, Error>;

    async fn set_role(&self, uid: &str, role: Role) -> Result<Account, Error>;

    async fn delete_account(&self, uid: &str) -> Result<(), Error>;
}
