#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use davauth_core::{
    AuthConfig, BindOutcome, CoreError, Directory, DirectoryConnection, DirectoryEntry,
    SearchScope,
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const BASE: &str = "ou=users,dc=example,dc=com";
pub const SERVICE_DN: &str = "cn=reader,dc=example,dc=com";
pub const SERVICE_PASSWORD: &str = "reader-pw";

/// Everything the mock directory saw.
#[derive(Debug, Default)]
pub struct Journal {
    pub opened: usize,
    pub unbound: usize,
    pub binds: Vec<(String, String)>,
    pub searches: Vec<(String, SearchScope, String, Vec<String>)>,
    pub whoami_calls: usize,
}

#[derive(Debug, Clone)]
struct MockUser {
    dn: String,
    login: String,
    password: String,
}

/// In-memory directory. Only the `(attribute=value)` clause of a search
/// filter is evaluated; any extra clauses are ignored.
#[derive(Debug, Clone)]
pub struct MockDirectory {
    attribute: String,
    users: Vec<MockUser>,
    fail_connect: bool,
    fail_search: bool,
    fail_user_bind: bool,
    fail_whoami: bool,
    empty_whoami: bool,
    reject_service: bool,
    user_bind_rc: Option<u32>,
    journal: Arc<Mutex<Journal>>,
}

impl MockDirectory {
    pub fn new(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            users: Vec::new(),
            fail_connect: false,
            fail_search: false,
            fail_user_bind: false,
            fail_whoami: false,
            empty_whoami: false,
            reject_service: false,
            user_bind_rc: None,
            journal: Arc::default(),
        }
    }

    pub fn with_user(mut self, dn: &str, login: &str, password: &str) -> Self {
        self.users.push(MockUser {
            dn: dn.to_string(),
            login: login.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Binds as a user entry error out instead of returning a result code.
    pub fn failing_user_bind(mut self) -> Self {
        self.fail_user_bind = true;
        self
    }

    pub fn failing_whoami(mut self) -> Self {
        self.fail_whoami = true;
        self
    }

    /// Who-am-i reports the anonymous identity even after a successful bind.
    pub fn anonymous_whoami(mut self) -> Self {
        self.empty_whoami = true;
        self
    }

    /// Every bind as a user entry gets `rc` (e.g. 53 unwillingToPerform).
    pub fn refusing_user_bind(mut self, rc: u32) -> Self {
        self.user_bind_rc = Some(rc);
        self
    }

    /// The service account bind gets invalidCredentials.
    pub fn rejecting_service(mut self) -> Self {
        self.reject_service = true;
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }

    fn record<T>(&self, f: impl FnOnce(&mut Journal) -> T) -> T {
        f(&mut self.journal.lock().unwrap())
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, CoreError> {
        if self.fail_connect {
            return Err(CoreError::ConnectionFailed(
                "ldap://mock: connection refused".to_string(),
            ));
        }
        self.record(|j| j.opened += 1);
        Ok(Box::new(MockConnection {
            directory: self.clone(),
            bound_as: None,
        }))
    }
}

struct MockConnection {
    directory: MockDirectory,
    bound_as: Option<String>,
}

#[async_trait]
impl DirectoryConnection for MockConnection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<BindOutcome, CoreError> {
        let dir = &self.directory;
        dir.record(|j| j.binds.push((dn.to_string(), password.to_string())));
        self.bound_as = None;

        let accepted = if dn.is_empty() {
            true
        } else if dn == SERVICE_DN {
            !dir.reject_service && password == SERVICE_PASSWORD
        } else {
            if dir.fail_user_bind {
                return Err(CoreError::ConnectionFailed("connection reset by peer".to_string()));
            }
            if let Some(rc) = dir.user_bind_rc {
                return Ok(BindOutcome {
                    rc,
                    text: "server is unwilling to perform".to_string(),
                });
            }
            dir.users.iter().any(|u| u.dn == dn && u.password == password)
        };

        if accepted {
            if !dn.is_empty() {
                self.bound_as = Some(dn.to_string());
            }
            Ok(BindOutcome::success())
        } else {
            Ok(BindOutcome {
                rc: 49,
                text: "invalid credentials".to_string(),
            })
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CoreError> {
        let dir = &self.directory;
        dir.record(|j| {
            j.searches.push((
                base.to_string(),
                scope,
                filter.to_string(),
                attrs.iter().map(|a| a.to_string()).collect(),
            ))
        });
        if dir.fail_search {
            return Err(CoreError::SearchFailed("noSuchObject".to_string()));
        }

        let Some(raw) = assertion_value(filter, &dir.attribute) else {
            return Ok(Vec::new());
        };
        Ok(dir
            .users
            .iter()
            .filter(|u| value_matches(raw, &u.login))
            .map(|u| {
                DirectoryEntry::new(
                    u.dn.clone(),
                    BTreeMap::from([(dir.attribute.clone(), vec![u.login.clone()])]),
                )
            })
            .collect())
    }

    async fn who_am_i(&mut self) -> Result<String, CoreError> {
        self.directory.record(|j| j.whoami_calls += 1);
        if self.directory.fail_whoami {
            return Err(CoreError::ExtendedFailed("unsupported operation".to_string()));
        }
        if self.directory.empty_whoami {
            return Ok(String::new());
        }
        Ok(self
            .bound_as
            .as_ref()
            .map(|dn| format!("dn:{}", dn))
            .unwrap_or_default())
    }

    async fn unbind(&mut self) -> Result<(), CoreError> {
        self.directory.record(|j| j.unbound += 1);
        Ok(())
    }
}

/// Raw value of the first `(attribute=...)` clause in `filter`.
fn assertion_value<'f>(filter: &'f str, attribute: &str) -> Option<&'f str> {
    let needle = format!("({}=", attribute);
    let start = filter.find(&needle)? + needle.len();
    let rest = &filter[start..];
    Some(&rest[..rest.find(')')?])
}

/// Equality match, or match-all when the value holds an unescaped `*`.
fn value_matches(raw: &str, value: &str) -> bool {
    raw.contains('*') || unescape(raw) == value
}

fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn config(attribute: &str) -> AuthConfig {
    let mut config = AuthConfig::new("ldap://mock", BASE);
    config.attribute = attribute.to_string();
    config.filter = String::new();
    config
}

/// Captures formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
