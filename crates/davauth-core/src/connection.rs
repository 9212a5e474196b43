use std::time::Duration;

use async_trait::async_trait;
use ldap3::exop::WhoAmI;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry, SearchResult};
use tracing::{debug, warn};

use crate::config::SearchScope;
use crate::directory::{BindOutcome, Directory, DirectoryConnection};
use crate::entry::DirectoryEntry;
use crate::error::CoreError;

/// LDAP result code for sizeLimitExceeded.
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;

/// A search that hit the server's size limit still carries usable entries.
fn check_search_rc(rc: u32, text: &str) -> Result<(), CoreError> {
    match rc {
        0 => Ok(()),
        RC_SIZE_LIMIT_EXCEEDED => {
            warn!("Search hit the server size limit, using partial results");
            Ok(())
        }
        rc => Err(CoreError::SearchFailed(format!("rc={}: {}", rc, text))),
    }
}

/// The directory server at a fixed URL, reached through ldap3.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    url: String,
    timeout: Option<Duration>,
}

impl LdapDirectory {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, CoreError> {
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = self.timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| CoreError::ConnectionFailed(format!("{}: {e}", self.url)))?;
        ldap3::drive!(conn);
        debug!("Connected to {}", self.url);

        Ok(Box::new(LdapConnection {
            ldap,
            timeout: self.timeout,
        }))
    }
}

/// An open ldap3 connection.
pub struct LdapConnection {
    ldap: Ldap,
    timeout: Option<Duration>,
}

impl LdapConnection {
    /// The handle for the next operation, with the timeout re-armed
    /// (ldap3 timeouts only apply to a single operation).
    fn ldap(&mut self) -> &mut Ldap {
        if let Some(timeout) = self.timeout {
            self.ldap.with_timeout(timeout);
        }
        &mut self.ldap
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome, CoreError> {
        let result = self.ldap().simple_bind(dn, password).await?;
        Ok(BindOutcome {
            rc: result.rc,
            text: result.text,
        })
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CoreError> {
        let SearchResult(entries, res) = self
            .ldap()
            .search(base, scope.into(), filter, attrs.to_vec())
            .await?;
        check_search_rc(res.rc, &res.text)?;

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_ref())
            .map(|entry| DirectoryEntry::from_search_entry(SearchEntry::construct(entry)))
            .collect();

        debug!("Search under {} returned {} entries", base, entries.len());
        Ok(entries)
    }

    async fn who_am_i(&mut self) -> Result<String, CoreError> {
        let (exop, _res) = self
            .ldap()
            .extended(WhoAmI)
            .await?
            .success()
            .map_err(|e| CoreError::ExtendedFailed(e.to_string()))?;

        // No response value means the anonymous identity.
        Ok(exop
            .val
            .map(|val| String::from_utf8_lossy(&val).into_owned())
            .unwrap_or_default())
    }

    async fn unbind(&mut self) -> Result<(), CoreError> {
        self.ldap.unbind().await.map_err(CoreError::Ldap)
    }
}
