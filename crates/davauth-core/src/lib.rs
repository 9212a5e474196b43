//! LDAP authentication for a CalDAV/CardDAV server.
//!
//! A login is resolved to a directory entry with a search performed under a
//! service identity (or anonymously), then verified by binding as that entry
//! with the supplied password. See [`Authenticator`].

use std::sync::Once;

use tracing::debug;

pub mod auth;
pub mod config;
pub mod connection;
pub mod directory;
pub mod entry;
pub mod error;
pub mod filter;

pub use auth::Authenticator;
pub use config::{AuthConfig, ConfigFile, ConfigSource, SearchScope};
pub use directory::{BindOutcome, Directory, DirectoryConnection};
pub use entry::DirectoryEntry;
pub use error::{AuthFailure, ConfigError, CoreError};

static INIT: Once = Once::new();

/// Process-wide directory client setup, run once: installs the rustls
/// crypto provider used for `ldaps://` connections.
pub fn init_directory_client() {
    INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}
