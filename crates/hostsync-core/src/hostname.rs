//! Bare hostnames managed under the apex domain

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Characters that belong to the routing-rule grammar and never to a name
const RULE_SYNTAX: &[char] = &['`', '(', ')', ',', '|', '&', '!', '"', '\''];

/// A bare hostname relative to the apex domain (`app`, not `app.example.com`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hostname(String);

impl Hostname {
    /// Validate and wrap a bare hostname
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::invalid_input("Hostname cannot be empty"));
        }

        if name.chars().any(|c| c.is_whitespace() || RULE_SYNTAX.contains(&c)) {
            return Err(Error::invalid_input(format!(
                "Hostname contains rule syntax characters: '{}'",
                name
            )));
        }

        if name.starts_with('.') || name.ends_with('.') {
            return Err(Error::invalid_input(format!(
                "Hostname cannot start or end with a dot: '{}'",
                name
            )));
        }

        Ok(Self(name))
    }

    /// The hostname as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified name under the given apex domain
    pub fn fqdn(&self, apex: &str) -> String {
        format!("{}.{}", self.0, apex)
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Hostname {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Hostname> for String {
    fn from(hostname: Hostname) -> Self {
        hostname.0
    }
}
