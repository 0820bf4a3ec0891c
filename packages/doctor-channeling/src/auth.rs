use crate::error::{AuthenticationError, Error};
use crate::identity::{Account, IdentityProvider};
use crate::log::AUTHENTICATION;
use crate::models::Role;
use crate::prometheus::AUTHENTICATION_FAILURES_TOTAL;
use metrics::counter;
use tracing::debug;

///
/// The authenticated caller of a request
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<Account> for Identity {
    fn from(account: Account) -> Self {
        Identity {
            id: account.uid,
            email: account.email,
            role: account.role,
        }
    }
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn require_admin(&self) -> Result<(), Error> {
        if self.is_admin() {
            return Ok(());
        }
        Err(Error::forbidden("Admin access required"))
    }

    pub fn require_doctor(&self) -> Result<(), Error> {
        if self.is_doctor() {
            return Ok(());
        }
        Err(Error::forbidden("Doctor access required"))
    }

    pub fn require_patient(&self) -> Result<(), Error> {
        if self.is_patient() {
            return Ok(());
        }
        Err(Error::forbidden("Patient access required"))
    }

    pub fn require_doctor_or_admin(&self) -> Result<(), Error> {
        if self.is_doctor() || self.is_admin() {
            return Ok(());
        }
        Err(Error::forbidden("Doctor or Admin access required"))
    }
}

///
/// Extracts the token from an `Authorization: Bearer <token>` header value
///
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthenticationError> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthenticationError::MissingToken)
}

///
/// Resolves the `Authorization` header to an identity.
/// The role always comes from the identity provider.
///
pub async fn authenticate(
    provider: &dyn IdentityProvider,
    header: Option<&str>,
) -> Result<Identity, Error> {
    let result = match bearer_token(header) {
        Ok(token) => provider.verify_token(token).await,
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(account) => Ok(account.into()),
        Err(err) => {
            counter!(AUTHENTICATION_FAILURES_TOTAL).increment(1);
            debug!(target: AUTHENTICATION, msg = "Authentication failed", error = err.to_string());
            Err(err)
        }
    }
}
