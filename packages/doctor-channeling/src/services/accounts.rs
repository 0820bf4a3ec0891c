use super::{find_user, Changes};
use crate::auth::Identity;
use crate::error::{Error, ErrorKind};
use crate::identity::{Account, IdentityProvider, Session};
use crate::log::AUTHENTICATION;
use crate::models::{Role, User, USERS};
use crate::prometheus::{REGISTRATIONS_TOTAL, SIGN_INS_TOTAL};
use crate::store::{DocumentStore, DocumentStoreExt};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RoleAssignment {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SignedIn {
    pub token: String,
    pub user: User,
}

///
/// Creates the profile for an account on first sign in.
/// Existing profiles are returned as they are, with the mirrored role refreshed.
///
async fn upsert_user(
    store: &dyn DocumentStore,
    account: &Account,
    registration: Option<Registration>,
) -> Result<User, Error> {
    if let Some(mut user) = find_user(store, &account.uid).await? {
        if user.role != account.role {
            mirror_role(store, &account.uid, account.role).await?;
            user.role = account.role;
        }
        return Ok(user);
    }

    let registration = registration.unwrap_or_default();
    let now = Utc::now();
    let user = User {
        id: account.uid.clone(),
        role: account.role,
        email: account.email.clone(),
        display_name: registration.display_name.unwrap_or_default(),
        phone: registration.phone.unwrap_or_default(),
        date_of_birth: registration.date_of_birth.unwrap_or_default(),
        gender: registration.gender.unwrap_or_default(),
        address: registration.address.unwrap_or_default(),
        is_active: true,
        is_verified: false,
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };

    store.set(USERS, &user.id, &user, false).await?;
    info!(target: AUTHENTICATION, msg = "User profile created", uid = user.id, role = %user.role);

    Ok(user)
}

async fn mirror_role(store: &dyn DocumentStore, uid: &str, role: Role) -> Result<(), Error> {
    let mut changes = Changes::new();
    changes.value("role", Some(role.to_string()));
    store.update(USERS, uid, changes.touch()).await
}

pub async fn register(
    store: &dyn DocumentStore,
    provider: &dyn IdentityProvider,
    registration: Registration,
) -> Result<SignedIn, Error> {
    let email = registration.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::invalid_argument("A valid email is required"));
    }

    if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::invalid_argument(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let role = match registration.role.as_deref() {
        None | Some("") => Role::Patient,
        Some(role) => role.parse()?,
    };

    if role == Role::Admin {
        return Err(Error::forbidden("Admin accounts cannot be self-registered"));
    }

    let Session { token, account } = provider
        .create_account(email, &registration.password, role)
        .await?;

    let user = upsert_user(store, &account, Some(registration)).await?;

    counter!(REGISTRATIONS_TOTAL, "role" => role.to_string()).increment(1);
    Ok(SignedIn { token, user })
}

pub async fn sign_in(
    store: &dyn DocumentStore,
    provider: &dyn IdentityProvider,
    credentials: Credentials,
) -> Result<SignedIn, Error> {
    let Session { token, account } = provider
        .sign_in(&credentials.email, &credentials.password)
        .await?;

    let user = upsert_user(store, &account, None).await?;

    counter!(SIGN_INS_TOTAL).increment(1);
    info!(target: AUTHENTICATION, msg = "Signed in", uid = account.uid);

    Ok(SignedIn { token, user })
}

pub async fn me(store: &dyn DocumentStore, requester: &Identity) -> Result<User, Error> {
    find_user(store, &requester.id)
        .await?
        .ok_or(Error::NotFound("User"))
}

pub async fn update_me(
    store: &dyn DocumentStore,
    requester: &Identity,
    update: ProfileUpdate,
) -> Result<User, Error> {
    me(store, requester).await?;

    let mut changes = Changes::new();
    changes
        .text("displayName", update.display_name)
        .text("phone", update.phone)
        .text("dateOfBirth", update.date_of_birth)
        .text("gender", update.gender)
        .text("bloodGroup", update.blood_group)
        .text("address", update.address)
        .text("photoURL", update.photo_url);

    store.update(USERS, &requester.id, changes.touch()).await?;

    me(store, requester).await
}

///
/// Changes the role claim with the identity provider, then the mirrored profile field
///
pub async fn set_role(
    store: &dyn DocumentStore,
    provider: &dyn IdentityProvider,
    requester: &Identity,
    assignment: RoleAssignment,
) -> Result<Role, Error> {
    requester.require_admin()?;

    if assignment.uid.trim().is_empty() {
        return Err(Error::invalid_argument("User id is required"));
    }
    let role: Role = assignment.role.parse()?;

    let account = provider
        .set_role(&assignment.uid, role)
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFound("User"),
            _ => err,
        })?;

    upsert_user(store, &account, None).await?;

    info!(
        target: AUTHENTICATION,
        msg = "Role assigned",
        uid = account.uid,
        %role,
        by = requester.id
    );
    Ok(role)
}

///
/// Makes sure the configured administrator exists and holds the admin role
///
pub async fn bootstrap_admin(
    store: &dyn DocumentStore,
    provider: &dyn IdentityProvider,
    email: &str,
    password: &str,
) -> Result<Account, Error> {
    let account = match provider.create_account(email, password, Role::Admin).await {
        Ok(session) => session.account,
        Err(err) if err.kind() == ErrorKind::Conflict => {
            let session = provider.sign_in(email, password).await.inspect_err(|_| {
                warn!(
                    target: AUTHENTICATION,
                    msg = "Configured admin exists with a different password",
                    email
                );
            })?;
            if session.account.role == Role::Admin {
                session.account
            } else {
                provider.set_role(&session.account.uid, Role::Admin).await?
            }
        }
        Err(err) => return Err(err),
    };

    let registration = Registration {
        display_name: Some("Administrator".to_string()),
        ..Default::default()
    };
    upsert_user(store, &account, Some(registration)).await?;

    info!(target: AUTHENTICATION, msg = "Admin account ready", uid = account.uid);
    Ok(account)
}
