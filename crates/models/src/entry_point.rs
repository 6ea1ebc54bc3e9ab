use crate::error::WharfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully-qualified reference to the WSGI callable a worker loads at startup,
/// in `module.path:object` form (e.g. `abroad.wsgi:application`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryPoint {
    pub module: String,
    pub object: String,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_dotted_path(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

impl FromStr for EntryPoint {
    type Err = WharfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| WharfError::InvalidEntryPoint {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (module, object) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected 'module:object'"))?;

        if !is_dotted_path(module) {
            return Err(invalid("module is not a dotted import path"));
        }
        // The object side may be an attribute path (e.g. `app.wsgi_app`).
        if !is_dotted_path(object) {
            return Err(invalid("object is not a valid attribute reference"));
        }

        Ok(Self {
            module: module.to_string(),
            object: object.to_string(),
        })
    }
}

impl TryFrom<String> for EntryPoint {
    type Error = WharfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryPoint> for String {
    fn from(ep: EntryPoint) -> Self {
        ep.to_string()
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.object)
    }
}
