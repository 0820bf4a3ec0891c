use std::io;
use thiserror::Error;

///
/// Failure kinds visible to API callers.
/// Every `Error` maps onto exactly one kind, which decides the HTTP status.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidArgument,
    InvalidState,
    Conflict,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, PartialEq)]
pub enum AuthenticationError {
    #[error("No token provided")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid email or password")]
    InvalidCredentials,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing field {name} from configuration file or environment")]
    MissingParameter { name: String },

    #[error("Invalid value {value} for {name}")]
    InvalidParameter { name: String, value: String },

    #[error("Server address {address} is not a valid socket address")]
    InvalidServerAddress { address: String },

    #[error("Identity token secret must be at least {min} characters")]
    TokenSecretTooShort { min: usize },

    #[error(transparent)]
    FileOrEnvironment(#[from] config::ConfigError),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Account {uid} does not exist")]
    UnknownAccount { uid: String },

    #[error("Stored credentials for account {uid} are malformed")]
    MalformedCredentials { uid: String },

    #[error(transparent)]
    Claims(#[from] serde_json::Error),

    #[error("Password hashing task failed")]
    Hashing(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document {id} already exists in {collection}")]
    AlreadyExists { collection: String, id: String },

    #[error("Document {id} not found in {collection}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Document {id} in {collection} is not a JSON object")]
    NotAnObject { collection: String, id: String },

    #[error("Counter {id} in {collection} is not an integer")]
    InvalidCounter { collection: String, id: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Error::Forbidden(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Unauthenticated,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Store(StoreError::DocumentNotFound { .. }) => ErrorKind::NotFound,
            Error::Store(StoreError::AlreadyExists { .. }) => ErrorKind::Conflict,
            Error::Identity(IdentityError::UnknownAccount { .. }) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_caller_visible_kind() {
        let err: Error = StoreError::DocumentNotFound {
            collection: "appointments".to_string(),
            id: "missing".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: Error = StoreError::AlreadyExists {
            collection: "identities".to_string(),
            id: "a".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: Error = io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(Error::NotFound("Doctor").to_string(), "Doctor not found");
        assert_eq!(
            Error::from(AuthenticationError::MissingToken).to_string(),
            "No token provided"
        );
    }
}
