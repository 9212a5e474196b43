use async_trait::async_trait;

use crate::config::SearchScope;
use crate::entry::DirectoryEntry;
use crate::error::CoreError;

/// LDAP result code for invalidCredentials.
pub const RC_INVALID_CREDENTIALS: u32 = 49;

/// Result of a simple bind as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub rc: u32,
    pub text: String,
}

impl BindOutcome {
    pub fn success() -> Self {
        Self {
            rc: 0,
            text: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.rc == 0
    }

    pub fn is_invalid_credentials(&self) -> bool {
        self.rc == RC_INVALID_CREDENTIALS
    }
}

/// A directory server that hands out fresh connections.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Open a new, unbound connection.
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, CoreError>;
}

/// One open connection to the directory.
///
/// A non-zero bind result code is not an error: it is returned in
/// [`BindOutcome`] so callers can tell rejected credentials apart from
/// transport failures.
#[async_trait]
pub trait DirectoryConnection: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome, CoreError>;

    async fn anonymous_bind(&mut self) -> Result<BindOutcome, CoreError> {
        self.simple_bind("", "").await
    }

    /// Search `base` and return the matching entries in server order.
    /// Referrals are not included.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CoreError>;

    /// RFC 4532 "Who am I?". Empty for an anonymous connection.
    async fn who_am_i(&mut self) -> Result<String, CoreError>;

    async fn unbind(&mut self) -> Result<(), CoreError>;
}
