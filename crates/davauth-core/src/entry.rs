use std::collections::BTreeMap;

/// An entry returned by the search phase: its DN and the attributes that
/// were requested (only the login attribute in practice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>, attributes: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    pub fn from_search_entry(entry: ldap3::SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs.into_iter().collect(),
        }
    }

    /// First value of an attribute. Attribute names compare case-insensitively,
    /// since servers are free to return `uid` for a requested `UID`.
    pub fn first_value(&self, attr: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .and_then(|(_, vals)| vals.first())
            .map(|s| s.as_str())
    }
}
