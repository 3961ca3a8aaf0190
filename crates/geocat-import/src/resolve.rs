//! Expansion of a data source into units of work
//!
//! Files sharing a directory and a stem form one group: a primary file with
//! a readable extension plus the sidecars its format carries along. Anything
//! else becomes a unit of its own so that it surfaces as `NO_FORMAT`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use geocat_core::error::{ImportError, Result};
use geocat_core::formats::{Format, FormatRegistry};
use geocat_core::models::{ConnectionParams, DataSource, SourceUnit};
use geocat_core::ports::DatabaseConnector;

/// Units of a source plus what must be kept alive or cleaned up with them
#[derive(Debug, Default)]
pub struct ResolvedSource {
    pub units: Vec<SourceUnit>,
    /// Scratch directory for the download and temporary content; removed on drop
    pub transient: Option<TempDir>,
    /// Local archive file, for archiving after a successful import
    pub archive_file: Option<PathBuf>,
}

/// Expand `source` into units
pub async fn resolve_source(
    source: &DataSource,
    registry: &FormatRegistry,
    connector: &dyn DatabaseConnector,
    download_timeout: Duration,
    unpack_into: Option<&Path>,
) -> Result<ResolvedSource> {
    let resolved = match source {
        DataSource::SingleFile { path, format_hint } => {
            let mut unit = resolve_file(path, registry)?;
            unit.set_format_hint(format_hint.clone());
            ResolvedSource { units: vec![unit], ..Default::default() }
        }
        DataSource::Directory { path } => {
            ResolvedSource { units: resolve_directory(path, registry)?, ..Default::default() }
        }
        DataSource::RemoteArchive { locator } => {
            resolve_archive(locator, registry, download_timeout, unpack_into).await?
        }
        DataSource::Database { params } => {
            ResolvedSource { units: resolve_database(params, connector).await?, ..Default::default() }
        }
    };

    if resolved.units.is_empty() {
        return Err(ImportError::EmptySource { location: source.to_string() });
    }

    tracing::debug!(source = %source, units = resolved.units.len(), "Resolved source");
    Ok(resolved)
}

/// One file plus its sidecars found next to it
pub fn resolve_file(path: &Path, registry: &FormatRegistry) -> Result<SourceUnit> {
    if !path.exists() {
        return Err(ImportError::SourceNotFound { path: path.to_path_buf() });
    }
    if !path.is_file() {
        return Err(ImportError::SourceUnavailable {
            location: path.display().to_string(),
            reason: "not a regular file".to_string(),
        });
    }

    let path = absolute(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    let (stem, _) = split_name(&path);
    let siblings: Vec<PathBuf> = list_files(dir, false)?
        .into_iter()
        .filter(|p| *p != path && split_name(p).0 == stem)
        .collect();

    let sidecars = match primary_format(&path, registry) {
        Some(format) => siblings
            .into_iter()
            .filter(|p| format.sidecar_extensions().contains(&split_name(p).1.as_str()))
            .collect(),
        None => Vec::new(),
    };

    Ok(SourceUnit::FileGroup { primary: path, sidecars, format_hint: None })
}

/// Every file group below `path`, walking subdirectories
pub fn resolve_directory(path: &Path, registry: &FormatRegistry) -> Result<Vec<SourceUnit>> {
    if !path.exists() {
        return Err(ImportError::SourceNotFound { path: path.to_path_buf() });
    }
    if !path.is_dir() {
        return Err(ImportError::SourceUnavailable {
            location: path.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(group_files(list_files(&absolute(path)?, true)?, registry))
}

/// Group files by directory and stem
pub fn group_files(files: Vec<PathBuf>, registry: &FormatRegistry) -> Vec<SourceUnit> {
    let mut groups: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let (stem, _) = split_name(&file);
        groups.entry((dir, stem)).or_default().push(file);
    }

    let mut units = Vec::new();
    for (_, mut members) in groups {
        members.sort();

        let primaries: Vec<(PathBuf, Format)> = members
            .iter()
            .filter_map(|p| primary_format(p, registry).map(|f| (p.clone(), f)))
            .collect();

        let mut claimed: Vec<&PathBuf> = primaries.iter().map(|(p, _)| p).collect();
        let mut grouped = Vec::new();
        for (primary, format) in &primaries {
            let sidecars: Vec<PathBuf> = members
                .iter()
                .filter(|p| {
                    !primaries.iter().any(|(q, _)| q == *p)
                        && format.sidecar_extensions().contains(&split_name(p).1.as_str())
                })
                .cloned()
                .collect();
            claimed.extend(members.iter().filter(|p| sidecars.contains(p)));
            grouped.push(SourceUnit::FileGroup {
                primary: primary.clone(),
                sidecars,
                format_hint: None,
            });
        }

        let orphans: Vec<SourceUnit> = members
            .iter()
            .filter(|p| !claimed.contains(p))
            .map(SourceUnit::file)
            .collect();

        units.extend(grouped);
        units.extend(orphans);
    }
    units
}

/// One table unit per table of the database
pub async fn resolve_database(
    params: &ConnectionParams,
    connector: &dyn DatabaseConnector,
) -> Result<Vec<SourceUnit>> {
    let store = connector.connect(params).await?;
    let tables = store.list_tables().await?;
    Ok(tables.into_iter().map(|t| SourceUnit::table(params.clone(), t)).collect())
}

async fn resolve_archive(
    locator: &str,
    registry: &FormatRegistry,
    download_timeout: Duration,
    unpack_into: Option<&Path>,
) -> Result<ResolvedSource> {
    let transient = tempfile::Builder::new().prefix("geocat-import-").tempdir()?;

    let (archive_path, archive_file) = match remote_url(locator)? {
        Some(url) => {
            let target = transient.path().join(archive_file_name(&url));
            download(&url, &target, download_timeout).await?;
            (target, None)
        }
        None => {
            let path = local_archive_path(locator)?;
            if !path.is_file() {
                return Err(ImportError::SourceNotFound { path });
            }
            (path.clone(), Some(path))
        }
    };

    let content_dir = match unpack_into {
        Some(uploads) => {
            std::fs::create_dir_all(uploads)?;
            tempfile::Builder::new().prefix("import-").tempdir_in(uploads)?.keep()
        }
        None => transient.path().join("content"),
    };
    unpack(&archive_path, &content_dir).await?;

    let units = group_files(list_files(&content_dir, true)?, registry);
    Ok(ResolvedSource { units, transient: Some(transient), archive_file })
}

/// `Some(url)` for http(s) locators
fn remote_url(locator: &str) -> Result<Option<url::Url>> {
    let lower = locator.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Ok(None);
    }
    url::Url::parse(locator).map(Some).map_err(|e| ImportError::Download {
        url: locator.to_string(),
        reason: e.to_string(),
    })
}

fn local_archive_path(locator: &str) -> Result<PathBuf> {
    if locator.to_ascii_lowercase().starts_with("file:") {
        let url = url::Url::parse(locator).map_err(|e| ImportError::SourceUnavailable {
            location: locator.to_string(),
            reason: e.to_string(),
        })?;
        return url.to_file_path().map_err(|_| ImportError::SourceUnavailable {
            location: locator.to_string(),
            reason: "not a local file URL".to_string(),
        });
    }
    absolute(Path::new(locator))
}

fn archive_file_name(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "download.zip".to_string())
}

async fn download(url: &url::Url, target: &Path, timeout: Duration) -> Result<()> {
    let failed = |reason: String| ImportError::Download { url: url.to_string(), reason };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| failed(e.to_string()))?;

    tracing::info!(url = %url, "Downloading archive");
    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| failed(e.to_string()))?;
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    tokio::fs::write(target, &bytes).await?;
    tracing::debug!(url = %url, bytes = bytes.len(), "Archive downloaded");
    Ok(())
}

/// Extract a zip archive; entries escaping `target` are refused by the zip crate
async fn unpack(archive: &Path, target: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();
    let location = archive.display().to_string();

    let result = tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
        let file = std::fs::File::open(&archive).map_err(|e| e.to_string())?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
        std::fs::create_dir_all(&target).map_err(|e| e.to_string())?;
        zip.extract(&target).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ImportError::Archive { location: location.clone(), reason: e.to_string() })?;

    result.map_err(|reason| ImportError::Archive { location, reason })
}

/// `path` anchored at the working directory when relative
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Regular, non-hidden files of a directory in name order
fn list_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| !is_hidden(path))
        .collect();
    entries.sort();

    let mut files = Vec::new();
    for path in entries {
        if path.is_dir() {
            if recursive {
                files.extend(list_files(&path, true)?);
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with('.')).unwrap_or(false)
}

/// Format whose primary extension matches the file, if registered
fn primary_format(path: &Path, registry: &FormatRegistry) -> Option<Format> {
    let (_, ext) = split_name(path);
    registry.formats().into_iter().find(|f| f.extensions().contains(&ext.as_str()))
}

/// Split a file name into (stem, lowercased extension), treating `.aux.xml`
/// as one extension and `x.tif.aux.xml` as belonging to `x`.
pub(crate) fn split_name(path: &Path) -> (String, String) {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let lower = name.to_ascii_lowercase();

    if let Some(stem) = lower.strip_suffix(".aux.xml").map(|s| &name[..s.len()]) {
        let inner = Path::new(stem);
        let stem = match inner.extension().and_then(|e| e.to_str()) {
            Some(ext) if Format::ALL.iter().any(|f| f.extensions().contains(&ext.to_ascii_lowercase().as_str())) => {
                inner.file_stem().and_then(|s| s.to_str()).unwrap_or(stem)
            }
            _ => stem,
        };
        return (stem.to_string(), "aux.xml".to_string());
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name).to_string();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"x").unwrap();
        path
    }

    fn primaries(units: &[SourceUnit]) -> Vec<String> {
        units
            .iter()
            .filter_map(|u| u.primary_path())
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name(Path::new("/a/roads.SHP")), ("roads".into(), "shp".into()));
        assert_eq!(split_name(Path::new("dem.aux.xml")), ("dem".into(), "aux.xml".into()));
        assert_eq!(split_name(Path::new("dem.tif.aux.xml")), ("dem".into(), "aux.xml".into()));
        assert_eq!(split_name(Path::new("README")), ("README".into(), "".into()));
    }

    #[test]
    fn test_shapefile_sidecars_form_one_group() {
        let dir = TempDir::new().unwrap();
        for name in ["archsites.shp", "archsites.shx", "archsites.dbf", "archsites.prj"] {
            touch(dir.path(), name);
        }

        let units = resolve_directory(dir.path(), &FormatRegistry::default()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(primaries(&units), vec!["archsites.shp"]);
        assert_eq!(units[0].location().len(), 4);
    }

    #[test]
    fn test_unrecognized_files_are_their_own_units() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "dem.tif");
        touch(dir.path(), "dem.tfw");
        touch(dir.path(), "lonely.shx");

        let units = resolve_directory(dir.path(), &FormatRegistry::default()).unwrap();
        assert_eq!(primaries(&units), vec!["dem.tif", "lonely.shx", "notes.txt"]);
        assert_eq!(units[0].location().len(), 2);
    }

    #[test]
    fn test_hidden_files_skipped_and_subdirectories_walked() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".DS_Store");
        touch(dir.path(), ".cache/inner.geojson");
        touch(dir.path(), "nested/deeper/points.csv");
        touch(dir.path(), "nested/deeper/points.prj");

        let units = resolve_directory(dir.path(), &FormatRegistry::default()).unwrap();
        assert_eq!(primaries(&units), vec!["points.csv"]);
        assert_eq!(units[0].location().len(), 2);
    }

    #[test]
    fn test_single_file_collects_sidecars() {
        let dir = TempDir::new().unwrap();
        let shp = touch(dir.path(), "roads.shp");
        touch(dir.path(), "roads.dbf");
        touch(dir.path(), "roads.shx");
        touch(dir.path(), "roads.txt");

        let unit = resolve_file(&shp, &FormatRegistry::default()).unwrap();
        assert_eq!(unit.location().len(), 3);
    }

    #[test]
    #[serial_test::serial]
    fn test_bare_file_name_resolves_against_working_dir() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sites.csv");
        touch(dir.path(), "sites.prj");

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let resolved = resolve_file(Path::new("sites.csv"), &FormatRegistry::default());
        std::env::set_current_dir(previous).unwrap();

        let unit = resolved.unwrap();
        let primary = unit.primary_path().unwrap();
        assert!(primary.is_absolute());
        assert!(primary.ends_with("sites.csv"));
        assert_eq!(unit.location().len(), 2);
    }

    #[test]
    fn test_missing_paths_fail() {
        let registry = FormatRegistry::default();
        assert!(matches!(
            resolve_file(Path::new("/definitely/not/here.shp"), &registry),
            Err(ImportError::SourceNotFound { .. })
        ));
        assert!(matches!(
            resolve_directory(Path::new("/definitely/not/here"), &registry),
            Err(ImportError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_remote_url_detection() {
        assert!(remote_url("https://example.com/data.zip").unwrap().is_some());
        assert!(remote_url("/tmp/data.zip").unwrap().is_none());
        assert!(remote_url("file:///tmp/data.zip").unwrap().is_none());
        assert_eq!(
            local_archive_path("file:///tmp/data.zip").unwrap(),
            PathBuf::from("/tmp/data.zip")
        );
    }
}
