use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use strum::{Display, EnumString};
use tracing::info;
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::filter::validate_filter;

/// Section of the host configuration holding the ldap keys.
pub const AUTH_SECTION: &str = "auth";

pub const DEFAULT_FILTER: &str = "(&(objectclass=user)(username=%username))";
pub const DEFAULT_ATTRIBUTE: &str = "username";

/// Key/value lookups into the host's configuration.
pub trait ConfigSource {
    /// Value of `key` in `section`, or `None` when the key is absent.
    fn get(&self, section: &str, key: &str) -> Option<String>;
}

impl ConfigSource for BTreeMap<String, BTreeMap<String, String>> {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.get(section).and_then(|keys| keys.get(key)).cloned()
    }
}

/// A scalar from the config file. Flags and numbers may be written natively
/// or as strings; both reach the strict parsers as text.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Flag(bool),
    Number(i64),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Text(s) => f.write_str(s),
            ConfigValue::Flag(b) => write!(f, "{}", b),
            ConfigValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// The `[auth]` table. Absent keys stay `None` so that defaults are applied
/// in one place, [`AuthConfig::from_source`].
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub ldap_url: Option<ConfigValue>,
    pub ldap_base: Option<ConfigValue>,
    pub ldap_filter: Option<ConfigValue>,
    pub ldap_attribute: Option<ConfigValue>,
    pub ldap_binddn: Option<ConfigValue>,
    pub ldap_password: Option<ConfigValue>,
    pub ldap_scope: Option<ConfigValue>,
    pub ldap_support_extended: Option<ConfigValue>,
    pub ldap_timeout: Option<ConfigValue>,
}

/// A TOML configuration document. Only the `[auth]` table is read; other
/// tables belong to the host.
///
/// ```toml
/// [auth]
/// ldap_url = "ldap://localhost:389"
/// ldap_base = "ou=users,dc=example,dc=com"
/// ldap_support_extended = true
/// ```
#[derive(Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub auth: AuthSection,
}

impl ConfigFile {
    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

impl ConfigSource for ConfigFile {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        if section != AUTH_SECTION {
            return None;
        }
        let auth = &self.auth;
        let value = match key {
            "ldap_url" => &auth.ldap_url,
            "ldap_base" => &auth.ldap_base,
            "ldap_filter" => &auth.ldap_filter,
            "ldap_attribute" => &auth.ldap_attribute,
            "ldap_binddn" => &auth.ldap_binddn,
            "ldap_password" => &auth.ldap_password,
            "ldap_scope" => &auth.ldap_scope,
            "ldap_support_extended" => &auth.ldap_support_extended,
            "ldap_timeout" => &auth.ldap_timeout,
            _ => return None,
        };
        value.as_ref().map(ToString::to_string)
    }
}

/// Search scope for the login lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SearchScope {
    /// The base entry only.
    #[strum(serialize = "BASE")]
    Base,
    /// Immediate children of the base.
    #[default]
    #[strum(serialize = "LEVEL")]
    Level,
    /// The base and all its descendants.
    #[strum(serialize = "SUBTREE")]
    Subtree,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::Level => ldap3::Scope::OneLevel,
            SearchScope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Strict boolean parser for string-valued flags.
pub fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value {
        "True" | "true" | "yes" => Ok(true),
        "False" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidBool(other.to_string())),
    }
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout(value.to_string())),
    }
}

/// Resolved ldap settings. Built once, read-only afterwards.
#[derive(Clone)]
pub struct AuthConfig {
    /// Server URL without trailing slashes.
    pub url: String,
    pub base: String,
    /// Extra filter AND-ed with the login clause. Empty disables it.
    pub filter: String,
    /// Attribute uniquely identifying a user.
    pub attribute: String,
    pub bind_dn: String,
    pub bind_password: Zeroizing<String>,
    pub scope: SearchScope,
    /// Confirm the verification bind with a who-am-i extended operation.
    pub support_extended: bool,
    /// Bound on connect and each directory operation. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl AuthConfig {
    pub fn new(url: impl Into<String>, base: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            base: base.into(),
            filter: DEFAULT_FILTER.to_string(),
            attribute: DEFAULT_ATTRIBUTE.to_string(),
            bind_dn: String::new(),
            bind_password: Zeroizing::new(String::new()),
            scope: SearchScope::default(),
            support_extended: true,
            timeout: None,
        }
    }

    /// Resolve the `auth` section of `source`, applying defaults for the
    /// optional keys. `ldap_url` and `ldap_base` are required.
    pub fn from_source(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let get = |key: &str| source.get(AUTH_SECTION, key);
        let required = |key: &'static str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingKey(key))
        };

        let mut config = Self::new(required("ldap_url")?, required("ldap_base")?);
        if config.url.trim().is_empty() {
            return Err(ConfigError::MissingKey("ldap_url"));
        }

        if let Some(filter) = get("ldap_filter") {
            if !filter.is_empty() {
                validate_filter(&filter).map_err(|reason| ConfigError::InvalidFilter {
                    filter: filter.clone(),
                    reason,
                })?;
            }
            config.filter = filter;
        }
        if let Some(attribute) = get("ldap_attribute") {
            config.attribute = attribute;
        }
        if let Some(bind_dn) = get("ldap_binddn") {
            config.bind_dn = bind_dn;
        }
        if let Some(password) = get("ldap_password") {
            config.bind_password = Zeroizing::new(password);
        }
        if let Some(scope) = get("ldap_scope") {
            config.scope = scope
                .parse()
                .map_err(|_| ConfigError::InvalidScope(scope.clone()))?;
        }
        if let Some(flag) = get("ldap_support_extended") {
            config.support_extended = parse_bool(&flag)?;
        }
        if let Some(timeout) = get("ldap_timeout") {
            config.timeout = Some(parse_timeout(&timeout)?);
        }

        Ok(config)
    }

    /// Service identity for the search phase. `None` means an anonymous bind.
    pub fn service_credentials(&self) -> Option<(&str, &str)> {
        if self.bind_dn.is_empty() || self.bind_password.is_empty() {
            None
        } else {
            Some((self.bind_dn.as_str(), self.bind_password.as_str()))
        }
    }

    fn redacted_password(&self) -> &'static str {
        if self.bind_password.is_empty() {
            ""
        } else {
            "***"
        }
    }

    /// Log every resolved setting. The service password is redacted.
    pub fn log_summary(&self) {
        info!("LDAP auth configuration:");
        info!("  ldap_url is {:?}", self.url);
        info!("  ldap_base is {:?}", self.base);
        info!("  ldap_filter is {:?}", self.filter);
        info!("  ldap_attribute is {:?}", self.attribute);
        info!("  ldap_binddn is {:?}", self.bind_dn);
        info!("  ldap_password is {:?}", self.redacted_password());
        info!("  ldap_scope is {}", self.scope);
        info!("  ldap_support_extended is {}", self.support_extended);
        match self.timeout {
            Some(timeout) => info!("  ldap_timeout is {}s", timeout.as_secs()),
            None => info!("  ldap_timeout is unset"),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url)
            .field("base", &self.base)
            .field("filter", &self.filter)
            .field("attribute", &self.attribute)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.redacted_password())
            .field("scope", &self.scope)
            .field("support_extended", &self.support_extended)
            .field("timeout", &self.timeout)
            .finish()
    }
}
