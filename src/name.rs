//! Validated target box names and build identifiers.
//!
//! Both strings end up as path components (box directory, build directory),
//! so they are checked once at the boundary and carried as newtypes after.
use crate::error::BoxError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::OnceLock;

/// Logical name of a box family, e.g. `acme/trusty64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoxName(String);

/// Caller-supplied provenance string for one build, e.g. a commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoxId(String);

fn segment_regex() -> &'static Regex {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("regex for box name segments")
    })
}

impl BoxName {
    pub fn parse(raw: &str) -> Result<Self, BoxError> {
        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() > 2 {
            return Err(BoxError::validation(format!(
                "box name must be <name> or <org>/<name> (got {raw:?})"
            )));
        }
        for segment in &segments {
            if !segment_regex().is_match(segment) || segment.contains("..") {
                return Err(BoxError::validation(format!(
                    "invalid box name {raw:?}: segment {segment:?} must start with a letter or digit and contain only letters, digits, '.', '_' or '-'"
                )));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Filesystem-safe form used for the box directory and manifest file.
    pub fn escaped(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl BoxId {
    pub fn parse(raw: &str) -> Result<Self, BoxError> {
        if raw.is_empty() {
            return Err(BoxError::validation("box id must be non-empty"));
        }
        if raw == "." || raw == ".." || raw.contains('/') || raw.contains('\\') {
            return Err(BoxError::validation(format!(
                "box id must not contain path separators (got {raw:?})"
            )));
        }
        if raw.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(BoxError::validation(format!(
                "box id must not contain whitespace (got {raw:?})"
            )));
        }
        Ok(Self(raw.to_string()))
    }
}

macro_rules! string_newtype_impls {
    ($Type:ident) => {
        impl $Type {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $Type {
            type Target = str;

            fn deref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $Type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $Type {
            type Err = BoxError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $Type {
            type Error = BoxError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$Type> for String {
            fn from(value: $Type) -> Self {
                value.0
            }
        }
    };
}

string_newtype_impls!(BoxName);
string_newtype_impls!(BoxId);
