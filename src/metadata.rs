//! Plugin metadata extraction from entry-point headers.
//!
//! Metadata is declared as one-line directives in the comment header of a
//! plugin's entry-point file and is parsed without executing any code, so the
//! host can list and introspect plugins before activation.

use crate::error::Result;

/// Host version specification, `major.minor[.patch]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HostVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl HostVersion {
    /// Create a new host version.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse from a string like "2.7.0". Returns `None` when unparseable;
    /// metadata parsing must stay soft.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 {
            return None;
        }

        let major = parts[0].parse().ok()?;
        let minor = parts[1].parse().ok()?;
        let patch = parts.get(2).map(|p| p.parse().unwrap_or(0)).unwrap_or(0);

        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Check whether a host at this version satisfies a plugin minimum.
    pub fn satisfies(&self, minimum: &HostVersion) -> bool {
        (self.major, self.minor, self.patch) >= (minimum.major, minimum.minor, minimum.patch)
    }
}

impl std::fmt::Display for HostVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Immutable metadata parsed from a plugin's declaration header.
///
/// Created once at discovery time; never mutated. Absent or malformed fields
/// stay unset — plugin listing must succeed even for partially-broken
/// plugins.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PluginMetadata {
    /// Plugin name.
    pub name: Option<String>,

    /// Plugin version string (free-form, not validated).
    pub version: Option<String>,

    /// Author line.
    pub authors: Option<String>,

    /// Project URL.
    pub url: Option<String>,

    /// Minimum host version the plugin requires.
    pub required_version: Option<String>,

    /// Whether the plugin's scripts should go through the transpiler.
    pub transpile_js: bool,
}

impl PluginMetadata {
    /// Extract metadata from raw plugin source text.
    ///
    /// Recognized directives are `name`, `version`, `authors`, `url`,
    /// `required_version`, and `transpile_js`, written as
    /// `// field: value` or `# field: value` near the top of the file.
    /// Parsing stops at the first line that is neither blank nor a comment.
    /// Never executes the source and never fails.
    pub fn parse(source: &str) -> Self {
        let mut meta = Self::default();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let body = if let Some(rest) = line.strip_prefix("//") {
                rest
            } else if let Some(rest) = line.strip_prefix('#') {
                rest
            } else {
                break;
            };

            let Some((field, value)) = body.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match field.trim() {
                "name" => meta.name = Some(value.to_string()),
                "version" => meta.version = Some(value.to_string()),
                "authors" | "author" => meta.authors = Some(value.to_string()),
                "url" => meta.url = Some(value.to_string()),
                "required_version" => meta.required_version = Some(value.to_string()),
                "transpile_js" => meta.transpile_js = value == "true",
                _ => {}
            }
        }

        meta
    }

    /// Read and parse the entry-point file at `path`.
    pub fn parse_file(path: &std::path::Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::parse(&source))
    }

    /// Check whether a host version satisfies this plugin's
    /// `required_version` constraint.
    ///
    /// An absent or unparseable constraint is treated as satisfied.
    pub fn compatible_with_host(&self, host: &HostVersion) -> bool {
        match self.required_version.as_deref().and_then(HostVersion::parse) {
            Some(minimum) => host.satisfies(&minimum),
            None => true,
        }
    }
}

impl std::fmt::Display for PluginMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            self.name.as_deref().unwrap_or("(unnamed)"),
            self.version.as_deref().unwrap_or("0.0.0"),
        )
    }
}
