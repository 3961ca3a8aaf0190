use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Connection parameters of a tabular database backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub url: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ConnectionParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), options: BTreeMap::new() }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Where an import reads its data from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    SingleFile {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format_hint: Option<String>,
    },
    Directory {
        path: PathBuf,
    },
    /// `http(s)://` URL, `file://` URL or local path of a zip archive
    RemoteArchive {
        locator: String,
    },
    Database {
        params: ConnectionParams,
    },
}

impl DataSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        DataSource::SingleFile { path: path.into(), format_hint: None }
    }

    pub fn file_with_hint(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        DataSource::SingleFile { path: path.into(), format_hint: Some(hint.into()) }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        DataSource::Directory { path: path.into() }
    }

    pub fn archive(locator: impl Into<String>) -> Self {
        DataSource::RemoteArchive { locator: locator.into() }
    }

    pub fn database(params: ConnectionParams) -> Self {
        DataSource::Database { params }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, DataSource::Database { .. })
    }

    /// Short kind label used in logs and tables
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataSource::SingleFile { .. } => "file",
            DataSource::Directory { .. } => "directory",
            DataSource::RemoteArchive { .. } => "archive",
            DataSource::Database { .. } => "database",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::SingleFile { path, .. } | DataSource::Directory { path } => {
                write!(f, "{}", path.display())
            }
            DataSource::RemoteArchive { locator } => f.write_str(locator),
            DataSource::Database { params } => write!(f, "{}", params),
        }
    }
}

/// One resolved unit of work: a group of files forming one dataset, or one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceUnit {
    FileGroup {
        primary: PathBuf,
        #[serde(default)]
        sidecars: Vec<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format_hint: Option<String>,
    },
    Table {
        params: ConnectionParams,
        table: String,
    },
}

impl SourceUnit {
    /// A file group with no sidecars
    pub fn file(primary: impl Into<PathBuf>) -> Self {
        SourceUnit::FileGroup { primary: primary.into(), sidecars: Vec::new(), format_hint: None }
    }

    pub fn table(params: ConnectionParams, table: impl Into<String>) -> Self {
        SourceUnit::Table { params, table: table.into() }
    }

    /// File stem or table name, used to derive the layer name
    pub fn base_name(&self) -> String {
        match self {
            SourceUnit::FileGroup { primary, .. } => primary
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            SourceUnit::Table { table, .. } => table.clone(),
        }
    }

    /// Every path belonging to this unit; empty for tables
    pub fn location(&self) -> Vec<PathBuf> {
        match self {
            SourceUnit::FileGroup { primary, sidecars, .. } => {
                let mut paths = Vec::with_capacity(sidecars.len() + 1);
                paths.push(primary.clone());
                paths.extend(sidecars.iter().cloned());
                paths
            }
            SourceUnit::Table { .. } => Vec::new(),
        }
    }

    pub fn primary_path(&self) -> Option<&Path> {
        match self {
            SourceUnit::FileGroup { primary, .. } => Some(primary.as_path()),
            SourceUnit::Table { .. } => None,
        }
    }

    /// Lowercased extension of the primary file
    pub fn extension(&self) -> Option<String> {
        self.primary_path()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn format_hint(&self) -> Option<&str> {
        match self {
            SourceUnit::FileGroup { format_hint, .. } => format_hint.as_deref(),
            SourceUnit::Table { .. } => None,
        }
    }

    pub fn set_format_hint(&mut self, hint: Option<String>) {
        if let SourceUnit::FileGroup { format_hint, .. } = self {
            *format_hint = hint;
        }
    }

    /// Find a sidecar (or sibling on disk) with the given extension, e.g. `prj` or `aux.xml`
    pub fn sidecar(&self, extension: &str) -> Option<PathBuf> {
        let SourceUnit::FileGroup { primary, sidecars, .. } = self else {
            return None;
        };
        let suffix = format!(".{}", extension.to_ascii_lowercase());

        if let Some(found) = sidecars.iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_ascii_lowercase().ends_with(&suffix))
                .unwrap_or(false)
        }) {
            return Some(found.clone());
        }

        let lower = primary.with_extension(extension.to_ascii_lowercase());
        if lower.exists() {
            return Some(lower);
        }
        let upper = primary.with_extension(extension.to_ascii_uppercase());
        upper.exists().then_some(upper)
    }
}

impl fmt::Display for SourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUnit::FileGroup { primary, .. } => write!(f, "{}", primary.display()),
            SourceUnit::Table { params, table } => write!(f, "{}#{}", params, table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_and_location() {
        let unit = SourceUnit::FileGroup {
            primary: PathBuf::from("/data/archsites.shp"),
            sidecars: vec![PathBuf::from("/data/archsites.dbf"), PathBuf::from("/data/archsites.shx")],
            format_hint: None,
        };
        assert_eq!(unit.base_name(), "archsites");
        assert_eq!(unit.location().len(), 3);
        assert_eq!(unit.extension().as_deref(), Some("shp"));

        let table = SourceUnit::table(ConnectionParams::new("memory://db"), "roads");
        assert_eq!(table.base_name(), "roads");
        assert!(table.location().is_empty());
    }

    #[test]
    fn test_sidecar_lookup_is_case_insensitive() {
        let unit = SourceUnit::FileGroup {
            primary: PathBuf::from("/nowhere/dem.tif"),
            sidecars: vec![PathBuf::from("/nowhere/dem.TFW"), PathBuf::from("/nowhere/dem.tif.aux.xml")],
            format_hint: None,
        };
        assert!(unit.sidecar("tfw").is_some());
        assert!(unit.sidecar("aux.xml").is_some());
        assert!(unit.sidecar("prj").is_none());
    }

    #[test]
    fn test_data_source_serialization() {
        let source = DataSource::database(ConnectionParams::new("json:///tmp/db").with_option("schema", "public"));
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("\"kind\":\"database\""));
        let parsed: DataSource = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, source);
    }
}
