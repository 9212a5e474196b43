use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the `auth` configuration. All of them abort
/// construction of the authenticator.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("the {0} configuration for ldap auth is required")]
    MissingKey(&'static str),

    #[error("not a bool: {0:?}")]
    InvalidBool(String),

    #[error("invalid search scope {0:?} (expected BASE, LEVEL or SUBTREE)")]
    InvalidScope(String),

    #[error("invalid timeout {0:?} (expected a positive number of seconds)")]
    InvalidTimeout(String),

    #[error("invalid search filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors talking to the directory server.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("extended operation failed: {0}")]
    ExtendedFailed(String),

    #[error("password is mandatory in simple bind")]
    EmptyPassword,

    #[error("ldap error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

/// Why a login attempt was rejected. Never surfaced to the host, only logged.
#[derive(Error, Debug)]
pub enum AuthFailure {
    #[error("directory unavailable: {0}")]
    Unavailable(#[source] CoreError),

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("bind not confirmed")]
    Unconfirmed,

    #[error("{0}")]
    Directory(#[source] CoreError),
}
