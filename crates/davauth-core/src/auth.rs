use tracing::{debug, error, info, warn};

use crate::config::{AuthConfig, ConfigSource};
use crate::connection::LdapDirectory;
use crate::directory::{Directory, DirectoryConnection};
use crate::entry::DirectoryEntry;
use crate::error::{AuthFailure, ConfigError, CoreError};
use crate::filter::login_filter;

/// Checks login/password pairs against a directory with a search bind
/// followed by a verification bind.
///
/// Holds no per-call state: one instance can serve concurrent logins.
pub struct Authenticator<D = LdapDirectory> {
    config: AuthConfig,
    directory: D,
}

impl Authenticator<LdapDirectory> {
    pub fn new(config: AuthConfig) -> Self {
        crate::init_directory_client();
        let directory = LdapDirectory::new(config.url.clone(), config.timeout);
        Self::with_directory(config, directory)
    }

    /// Build from the `auth` section of a host configuration.
    pub fn from_source(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        Ok(Self::new(AuthConfig::from_source(source)?))
    }
}

impl<D: Directory> Authenticator<D> {
    pub fn with_directory(config: AuthConfig, directory: D) -> Self {
        config.log_summary();
        Self { config, directory }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns `login` when the credentials are valid and an empty string
    /// otherwise. Directory errors never reach the caller.
    pub async fn authenticate(&self, login: &str, password: &str) -> String {
        match self.verify(login, password).await {
            Ok(entry) => {
                info!("LDAP bind OK for {} ({})", login, entry.dn);
                login.to_string()
            }
            Err(failure) => {
                match &failure {
                    AuthFailure::Unavailable(err) => error!("LDAP server unavailable: {}", err),
                    AuthFailure::UserNotFound => error!("LDAP user {} not found", login),
                    AuthFailure::InvalidCredentials => {
                        error!("LDAP invalid credentials for {}", login)
                    }
                    AuthFailure::Unconfirmed => error!("LDAP bind failed for {}", login),
                    AuthFailure::Directory(err) => error!("LDAP error {}", err),
                }
                String::new()
            }
        }
    }

    /// Run both phases and report why a login was rejected.
    pub(crate) async fn verify(&self, login: &str, password: &str) -> Result<DirectoryEntry, AuthFailure> {
        let entry = self.resolve(login).await?;
        self.confirm(&entry, password).await?;
        Ok(entry)
    }

    /// Phase one: find the entry for `login` using the service identity.
    ///
    /// When several entries match, the first one in server order wins.
    async fn resolve(&self, login: &str) -> Result<DirectoryEntry, AuthFailure> {
        let mut conn = self
            .directory
            .connect()
            .await
            .map_err(AuthFailure::Unavailable)?;
        let result = self.search_as_service(conn.as_mut(), login).await;
        release(conn.as_mut()).await;

        let entries = result.unwrap_or_else(|err| {
            warn!("LDAP search failed: {}", err);
            Vec::new()
        });
        let entry = entries
            .into_iter()
            .next()
            .ok_or(AuthFailure::UserNotFound)?;

        info!(
            "LDAP user {} ({}) found",
            entry.first_value(&self.config.attribute).unwrap_or(login),
            entry.dn
        );
        Ok(entry)
    }

    async fn search_as_service(
        &self,
        conn: &mut dyn DirectoryConnection,
        login: &str,
    ) -> Result<Vec<DirectoryEntry>, CoreError> {
        self.service_bind(conn).await;

        match conn.who_am_i().await {
            Ok(identity) => debug!("LDAP whoami: {:?}", identity),
            Err(err) => warn!("LDAP whoami check failed: {}", err),
        }

        let filter = login_filter(&self.config.attribute, login, &self.config.filter);
        debug!("LDAP filter: {} in base {}", filter, self.config.base);

        conn.search(
            &self.config.base,
            self.config.scope,
            &filter,
            &[self.config.attribute.as_str()],
        )
        .await
    }

    /// Bind with the service identity, or anonymously. Failures are logged
    /// and the search goes ahead regardless.
    async fn service_bind(&self, conn: &mut dyn DirectoryConnection) {
        let outcome = match self.config.service_credentials() {
            Some((dn, password)) => {
                debug!("LDAP service bind as {}", dn);
                conn.simple_bind(dn, password).await
            }
            None => {
                debug!("LDAP anonymous bind");
                conn.anonymous_bind().await
            }
        };

        match outcome {
            Ok(bind) if bind.is_success() => {}
            Ok(bind) => warn!(
                "LDAP service bind rejected (rc={}: {}), searching anyway",
                bind.rc, bind.text
            ),
            Err(err) => warn!("LDAP service bind failed ({}), searching anyway", err),
        }
    }

    /// Phase two: bind as the resolved entry with the supplied password.
    async fn confirm(&self, entry: &DirectoryEntry, password: &str) -> Result<(), AuthFailure> {
        // A simple bind with a DN and no password is an unauthenticated bind,
        // which servers report as a success.
        if password.is_empty() {
            return Err(AuthFailure::Directory(CoreError::EmptyPassword));
        }

        let mut conn = self
            .directory
            .connect()
            .await
            .map_err(AuthFailure::Directory)?;
        let result = self.bind_as(conn.as_mut(), &entry.dn, password).await;
        release(conn.as_mut()).await;
        result
    }

    async fn bind_as(
        &self,
        conn: &mut dyn DirectoryConnection,
        dn: &str,
        password: &str,
    ) -> Result<(), AuthFailure> {
        let bind = conn
            .simple_bind(dn, password)
            .await
            .map_err(AuthFailure::Directory)?;
        debug!("LDAP bind as {}: rc={} {}", dn, bind.rc, bind.text);

        if bind.is_invalid_credentials() {
            return Err(AuthFailure::InvalidCredentials);
        }
        if !bind.is_success() {
            return Err(AuthFailure::Unconfirmed);
        }

        if self.config.support_extended {
            let identity = conn.who_am_i().await.map_err(AuthFailure::Directory)?;
            debug!("LDAP whoami: {:?}", identity);
            if identity.is_empty() {
                return Err(AuthFailure::Unconfirmed);
            }
        } else {
            debug!("LDAP skip extended: bind result code accepted");
        }
        Ok(())
    }
}

async fn release(conn: &mut dyn DirectoryConnection) {
    if let Err(err) = conn.unbind().await {
        debug!("LDAP unbind failed: {}", err);
    }
}
