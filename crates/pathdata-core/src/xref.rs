//! Identifier types shared by every store.
//!
//! An [`Xref`] pairs an identifier with the naming system ([`DataSource`])
//! it belongs to. Two xrefs are equal only if both parts are equal, so
//! `"1234"` in Entrez Gene and `"1234"` in UniProt are different keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Well-known system codes and their full names.
const KNOWN_SOURCES: &[(&str, &str)] = &[
    ("En", "Ensembl"),
    ("L", "Entrez Gene"),
    ("S", "UniProt"),
    ("H", "HGNC"),
    ("Q", "RefSeq"),
    ("X", "Affy"),
    ("G", "GenBank"),
    ("T", "GeneOntology"),
    ("Ce", "ChEBI"),
    ("Ck", "KEGG Compound"),
    ("Cs", "PubChem"),
    ("Ch", "HMDB"),
    ("Sd", "SGD"),
    ("F", "FlyBase"),
    ("W", "WormBase"),
    ("M", "MGI"),
    ("R", "RGD"),
    ("Z", "ZFIN"),
    ("A", "Agilent"),
    ("I", "InterPro"),
    ("O", "Other"),
];

/// Errors raised when parsing identifiers from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum XrefParseError {
    #[error("expected '<code>:<id>', got '{0}'")]
    MissingSeparator(String),

    #[error("empty system code in '{0}'")]
    EmptyCode(String),
}

/// A naming system, identified by its short system code.
///
/// Codes outside the well-known table are accepted verbatim; the engine never
/// validates them, it only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSource(String);

impl DataSource {
    /// Create a data source from a system code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Ensembl, the hub namespace of most identifier graphs.
    pub fn ensembl() -> Self {
        Self::new("En")
    }

    /// Entrez Gene
    pub fn entrez() -> Self {
        Self::new("L")
    }

    /// UniProt
    pub fn uniprot() -> Self {
        Self::new("S")
    }

    /// The short system code (e.g. `"En"`).
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Full name for well-known codes.
    pub fn full_name(&self) -> Option<&'static str> {
        KNOWN_SOURCES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    /// Look up a data source by code or (case-insensitive) full name.
    ///
    /// Unknown strings are taken to be codes.
    pub fn lookup(text: &str) -> Self {
        let text = text.trim();
        KNOWN_SOURCES
            .iter()
            .find(|(code, name)| *code == text || name.eq_ignore_ascii_case(text))
            .map(|(code, _)| Self::new(*code))
            .unwrap_or_else(|| Self::new(text))
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataSource {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// An identifier in a specific naming system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Xref {
    id: String,
    source: DataSource,
}

impl Xref {
    pub fn new(id: impl Into<String>, source: impl Into<DataSource>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Shorthand for `self.source().code()`.
    pub fn code(&self) -> &str {
        self.source.code()
    }
}

impl fmt::Display for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

impl FromStr for Xref {
    type Err = XrefParseError;

    /// Parse `code:id`. Only the first colon separates, so identifiers such as
    /// GO terms (`T:GO:0008150`) keep their own colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, id) = s
            .split_once(':')
            .ok_or_else(|| XrefParseError::MissingSeparator(s.to_string()))?;
        if code.is_empty() {
            return Err(XrefParseError::EmptyCode(s.to_string()));
        }
        Ok(Xref::new(id, DataSource::new(code)))
    }
}
