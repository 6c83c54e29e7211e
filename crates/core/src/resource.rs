//! Feature content resources
//!
//! One entry of a feature's `Subsystem-Content` header: a bundle, a nested
//! feature, or a plain file/jar shipped with the feature.

use crate::manifest::header::{split_list, HeaderClause};
use crate::version::VersionRange;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Kind of content a resource entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Bundle,
    Feature,
    File,
    Jar,
    BootJar,
}

impl ContentType {
    /// Infer the content type from a `type` attribute value
    pub fn from_type_attribute(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("osgi.subsystem.feature") => ContentType::Feature,
            Some("file") => ContentType::File,
            Some("jar") => ContentType::Jar,
            Some("boot.jar") => ContentType::BootJar,
            _ => ContentType::Bundle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Bundle => "osgi.bundle",
            ContentType::Feature => "osgi.subsystem.feature",
            ContentType::File => "file",
            ContentType::Jar => "jar",
            ContentType::BootJar => "boot.jar",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One content resource of a feature
///
/// Derived values (version range, tolerates list) are memoized; the resource
/// is shared with other threads once published, so the memo cells are
/// thread-safe single-assignment cells.
#[derive(Debug)]
pub struct FeatureResource {
    symbolic_name: String,
    content_type: ContentType,
    attributes: IndexMap<String, String>,
    directives: IndexMap<String, String>,
    version_range: OnceCell<Option<VersionRange>>,
    tolerates: OnceCell<Vec<String>>,
}

impl FeatureResource {
    pub fn from_clause(clause: HeaderClause) -> Self {
        let content_type = ContentType::from_type_attribute(clause.attribute("type"));
        Self {
            symbolic_name: clause.name().to_string(),
            content_type,
            attributes: clause.attributes,
            directives: clause.directives,
            version_range: OnceCell::new(),
            tolerates: OnceCell::new(),
        }
    }

    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn directives(&self) -> &IndexMap<String, String> {
        &self.directives
    }

    /// `location:=` directive, if any
    pub fn location(&self) -> Option<&str> {
        self.directives.get("location").map(String::as_str)
    }

    /// `start-phase:=` directive, if any
    pub fn start_phase(&self) -> Option<&str> {
        self.directives.get("start-phase").map(String::as_str)
    }

    /// Parsed `version` attribute; `None` when absent or unparseable
    pub fn version_range(&self) -> Option<&VersionRange> {
        self.version_range
            .get_or_init(|| {
                let raw = self.attributes.get("version")?;
                match VersionRange::parse(raw) {
                    Ok(range) => Some(range),
                    Err(e) => {
                        warn!(resource = %self.symbolic_name, error = %e, "Ignoring invalid version range");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Versions listed in the `ibm.tolerates:=` directive
    pub fn tolerates(&self) -> &[String] {
        self.tolerates.get_or_init(|| {
            self.directives
                .get("ibm.tolerates")
                .map(|v| split_list(v))
                .unwrap_or_default()
        })
    }
}
