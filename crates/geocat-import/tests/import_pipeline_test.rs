//! End-to-end import scenarios against the in-memory adapters
//!
//! Covers single files, repeated imports, CRS and bounds repair, unreadable
//! files, tabular targets with update modes, and source archiving.

use std::fs;
use std::io::Write;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use geocat_core::models::{
    BoundingBox, ConnectionParams, ContextState, Crs, DataSource, LayerInfo, StoreConnection, StoreInfo,
    StoreKind, StyleKind, TaskState, UpdateMode, WorkspaceInfo,
};
use geocat_core::formats::FormatRegistry;
use geocat_core::ports::{Catalog, CatalogChange, CommitOutcome, TableSchema, TableStore, TaskHistoryStore};
use geocat_core::ImportError;
use geocat_geo::CrsTransformer;
use geocat_import::{DropEmptyGeometry, Importer, ImporterSettings, TransformUnit};
use geocat_store::{MemoryCatalog, MemoryConnector, MemoryHistoryStore};

const DB_URL: &str = "mem://gis";

struct Harness {
    catalog: MemoryCatalog,
    connector: MemoryConnector,
    history: MemoryHistoryStore,
    importer: Importer,
}

fn harness() -> Harness {
    let catalog = MemoryCatalog::new();
    let connector = MemoryConnector::new();
    let history = MemoryHistoryStore::new();
    let importer = Importer::new(
        Arc::new(catalog.clone()),
        Arc::new(connector.clone()),
        Arc::new(history.clone()),
    );
    Harness { catalog, connector, history, importer }
}

/// Workspace `topp` with a tabular store `gis` backed by an empty database
async fn with_tabular_store(h: &Harness) {
    h.connector.add_database(DB_URL);
    h.catalog
        .commit(CatalogChange {
            workspace: Some(WorkspaceInfo::new("topp")),
            store: Some(StoreInfo::tabular("topp", "gis", ConnectionParams::new(DB_URL))),
            layer: None,
        })
        .await
        .unwrap();
}

fn write_points(dir: &Path, name: &str, points: &[(f64, f64)]) -> PathBuf {
    let features: Vec<String> = points
        .iter()
        .enumerate()
        .map(|(i, (x, y))| {
            format!(
                r#"{{"type": "Feature", "geometry": {{"type": "Point", "coordinates": [{}, {}]}}, "properties": {{"id": {}}}}}"#,
                x, y, i
            )
        })
        .collect();
    let path = dir.join(name);
    fs::write(&path, format!(r#"{{"type": "FeatureCollection", "features": [{}]}}"#, features.join(","))).unwrap();
    path
}

fn write_archsites(dir: &Path) -> PathBuf {
    write_points(dir, "archsites.geojson", &[(-103.8, 44.4), (-103.6, 44.5), (-103.7, 44.3)])
}

/// Minimal little-endian TIFF: one IFD with width and height only
fn write_tiff(dir: &Path, name: &str) -> PathBuf {
    let mut bytes = b"II*\0".to_vec();
    bytes.extend_from_slice(&8u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    for (tag, value) in [(256u16, 64u16), (257, 32)] {
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&value.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
    }
    bytes.extend_from_slice(&0u32.to_le_bytes());

    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// `bundle.zip` holding one line layer at `roads/roads.geojson`
fn write_roads_zip(dir: &Path) -> PathBuf {
    let zip_path = dir.join("bundle.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("roads/roads.geojson", options).unwrap();
    zip.write_all(
        br#"{"type": "FeatureCollection", "features": [{"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}, "properties": {}}]}"#,
    )
    .unwrap();
    zip.finish().unwrap();
    zip_path
}

#[tokio::test]
async fn test_single_file_imports_under_base_name() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    assert_eq!(ctx.tasks().len(), 1);
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::Ready);
    assert_eq!(ctx.state(), ContextState::Pending);

    let state = h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(state, ContextState::Complete);

    let task = ctx.task(0).unwrap();
    assert_eq!(task.state(), TaskState::Complete);
    assert_eq!(task.stats().written, 3);

    let layer = h.catalog.layer("default", "archsites").await.unwrap().expect("layer registered");
    assert_eq!(layer.style, StyleKind::Point);
    assert_eq!(layer.resource.feature_count, Some(3));
    let bbox = layer.resource.native_bbox.expect("native bbox");
    assert_eq!((bbox.min_x, bbox.max_y), (-103.8, 44.5));
    assert!(layer.resource.lat_lon_bbox.is_some());

    let store = h.catalog.store("default", &layer.store).await.unwrap().unwrap();
    assert_eq!(store.kind, StoreKind::File);

    let record = h.history.get(ctx.id()).await.unwrap().unwrap();
    assert_eq!(record.state, ContextState::Complete);
    assert_eq!(record.tasks[0].layer_name, "archsites");
}

#[tokio::test]
async fn test_same_file_twice_gets_suffixed_name() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let mut first = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    h.importer.run(&mut first).await.unwrap();

    let mut second = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    assert_eq!(second.task(0).unwrap().layer_name(), "archsites0");
    h.importer.run(&mut second).await.unwrap();

    let names = h.catalog.layer_names("default").await.unwrap();
    assert!(names.contains("archsites"));
    assert!(names.contains("archsites0"));
    assert_eq!(h.catalog.stores("default").await.unwrap().len(), 1, "file store is reused");
}

#[tokio::test]
async fn test_concurrent_contexts_claim_distinct_names() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let a = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    let b = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    assert_eq!(a.task(0).unwrap().layer_name(), "archsites");
    assert_eq!(b.task(0).unwrap().layer_name(), "archsites");

    let results = h.importer.run_all(vec![a, b]).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let mut names: Vec<String> = h.catalog.layer_names("default").await.unwrap().into_iter().collect();
    names.sort();
    assert_eq!(names, vec!["archsites".to_string(), "archsites0".to_string()]);
}

#[tokio::test]
async fn test_missing_crs_repaired_with_srs() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wells.csv");
    fs::write(&path, "name,x,y\nw1,100000,200000\nw2,150000,260000\n").unwrap();

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    let task = ctx.task(0).unwrap();
    assert_eq!(task.state(), TaskState::NoCrs);
    assert!(task.message().is_some());

    ctx.task_mut(0).unwrap().set_srs(Crs::web_mercator()).unwrap();
    assert!(h.importer.changed(&mut ctx, 0).await.unwrap());
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::Ready);

    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::Complete);

    let layer = h.catalog.layer("default", "wells").await.unwrap().unwrap();
    let native = layer.resource.native_bbox.unwrap();
    assert_eq!(native.crs, Some(Crs::web_mercator()));
    assert_eq!((native.min_x, native.max_x), (100000.0, 150000.0));
    assert_eq!(layer.resource.lat_lon_bbox.unwrap().crs, Some(Crs::wgs84()));
}

#[tokio::test]
async fn test_missing_bounds_repaired_with_explicit_bbox() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("parcels.csv");
    fs::write(&path, "parcel,owner\n1,alice\n2,bob\n").unwrap();
    fs::write(temp_dir.path().join("parcels.prj"), r#"GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]]"#).unwrap();

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::NoBounds);

    ctx.task_mut(0)
        .unwrap()
        .set_native_bbox(BoundingBox::new(10.0, 20.0, 11.0, 21.0, None))
        .unwrap();
    assert!(h.importer.changed(&mut ctx, 0).await.unwrap());

    let resource = ctx.task(0).unwrap().resource();
    assert_eq!(resource.native_bbox.as_ref().and_then(|b| b.crs.clone()), Some(Crs::wgs84()));
}

#[tokio::test]
async fn test_unrecognized_file_leaves_catalog_untouched() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("notes.txt"), "field notes, not a dataset").unwrap();

    let mut ctx = h.importer.create_context(DataSource::directory(&data), None, None).await.unwrap();
    assert_eq!(ctx.tasks().len(), 1);
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::NoFormat);

    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::NoFormat);
    assert_eq!(ctx.state(), ContextState::Pending);
    assert!(h.catalog.layers(None).await.unwrap().is_empty());
    assert!(h.catalog.workspaces().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_raster_rejected_by_tabular_store() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    write_archsites(&data);
    write_tiff(&data, "dem.tif");

    let mut ctx = h
        .importer
        .create_context(DataSource::directory(&data), Some("topp"), Some("gis"))
        .await
        .unwrap();
    assert_eq!(ctx.tasks().len(), 2);

    h.importer.run(&mut ctx).await.unwrap();
    for task in ctx.tasks() {
        match task.source().base_name().as_str() {
            "dem" => assert_eq!(task.state(), TaskState::BadFormat),
            "archsites" => assert_eq!(task.state(), TaskState::Complete),
            other => panic!("unexpected task {}", other),
        }
    }
    assert_eq!(ctx.state(), ContextState::CompleteWithErrors);

    let layer = h.catalog.layer("topp", "archsites").await.unwrap().unwrap();
    assert_eq!(layer.store, "gis");
    let db = h.connector.database(DB_URL).unwrap();
    assert_eq!(db.count("archsites").await.unwrap(), 3);
    assert!(!db.has_table("dem").await.unwrap());
}

#[tokio::test]
async fn test_append_doubles_and_replace_resets_rows() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());
    let db = h.connector.database(DB_URL).unwrap();

    let mut ctx = h.importer.create_context(DataSource::file(&path), Some("topp"), Some("gis")).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(db.count("archsites").await.unwrap(), 3);

    for (mode, expected) in [(UpdateMode::Append, 6), (UpdateMode::Replace, 3)] {
        let mut ctx = h.importer.create_context(DataSource::file(&path), Some("topp"), Some("gis")).await.unwrap();
        ctx.task_mut(0).unwrap().set_update_mode(mode).unwrap();
        assert!(h.importer.changed(&mut ctx, 0).await.unwrap());
        assert_eq!(ctx.task(0).unwrap().layer_name(), "archsites");

        h.importer.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.task(0).unwrap().state(), TaskState::Complete, "{} import", mode);
        assert_eq!(db.count("archsites").await.unwrap(), expected, "{} import", mode);

        let layer = h.catalog.layer("topp", "archsites").await.unwrap().unwrap();
        assert_eq!(layer.resource.feature_count, Some(expected));
    }
    assert_eq!(h.catalog.layers(Some("topp")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_append_merges_bounds_of_existing_layer() {
    let h = harness();
    with_tabular_store(&h).await;
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let first = write_points(first_dir.path(), "sites.geojson", &[(0.0, 0.0), (1.0, 1.0)]);
    let second = write_points(second_dir.path(), "sites.geojson", &[(5.0, 5.0)]);

    let mut ctx = h.importer.create_context(DataSource::file(&first), Some("topp"), Some("gis")).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();

    let mut ctx = h.importer.create_context(DataSource::file(&second), Some("topp"), Some("gis")).await.unwrap();
    ctx.task_mut(0).unwrap().set_update_mode(UpdateMode::Append).unwrap();
    h.importer.changed(&mut ctx, 0).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();

    let bbox = h.catalog.layer("topp", "sites").await.unwrap().unwrap().resource.native_bbox.unwrap();
    assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (0.0, 0.0, 5.0, 5.0));
}

#[tokio::test]
async fn test_existing_table_fails_create_and_keeps_source() {
    let h = harness();
    with_tabular_store(&h).await;
    h.connector
        .database(DB_URL)
        .unwrap()
        .create_table(&TableSchema::new("archsites"))
        .await
        .unwrap();

    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    let path = write_archsites(&data);

    let mut ctx = h
        .importer
        .create_context(DataSource::directory(&data), Some("topp"), Some("gis"))
        .await
        .unwrap();
    ctx.set_archive(true);
    h.importer.run(&mut ctx).await.unwrap();

    let task = ctx.task(0).unwrap();
    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(task.error(), Some("Table already exists: archsites"));
    assert_eq!(ctx.state(), ContextState::CompleteWithErrors);
    assert!(path.exists(), "source kept after a failed import");
    assert!(h.catalog.layer("topp", "archsites").await.unwrap().is_none());
}

#[tokio::test]
async fn test_archive_removes_directory_after_success() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir_all(data.join("nested")).unwrap();
    write_archsites(&data);
    write_points(&data.join("nested"), "wells.geojson", &[(1.0, 2.0)]);

    let mut ctx = h
        .importer
        .create_context(DataSource::directory(&data), Some("topp"), Some("gis"))
        .await
        .unwrap();
    ctx.set_archive(true);
    assert_eq!(h.importer.run(&mut ctx).await.unwrap(), ContextState::Complete);

    assert!(!data.exists(), "emptied source directory is removed");
    assert_eq!(h.catalog.layers(Some("topp")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_local_archive_imported_and_archived() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let zip_path = write_roads_zip(temp_dir.path());

    let locator = zip_path.display().to_string();
    let mut ctx = h
        .importer
        .create_context(DataSource::archive(locator), Some("topp"), Some("gis"))
        .await
        .unwrap();
    assert_eq!(ctx.task(0).unwrap().layer_name(), "roads");
    ctx.set_archive(true);

    assert_eq!(h.importer.run(&mut ctx).await.unwrap(), ContextState::Complete);
    assert!(!zip_path.exists());
    let layer = h.catalog.layer("topp", "roads").await.unwrap().unwrap();
    assert_eq!(layer.style, StyleKind::Line);
}

#[tokio::test]
async fn test_transform_chain_counts_rejections() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stations.csv");
    fs::write(&path, "name,lat,lon\na,-8.5,115.2\nb,,\nc,-8.7,115.1\n").unwrap();

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    let task = ctx.task_mut(0).unwrap();
    task.set_srs(Crs::wgs84()).unwrap();
    task.transform_mut().unwrap().add(TransformUnit::vector(DropEmptyGeometry));
    h.importer.changed(&mut ctx, 0).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();

    let stats = ctx.task(0).unwrap().stats();
    assert_eq!((stats.processed, stats.rejected, stats.written), (3, 1, 2));
    let layer = h.catalog.layer("default", "stations").await.unwrap().unwrap();
    assert_eq!(layer.resource.feature_count, Some(2));
}

#[tokio::test]
async fn test_cancel_token_observed_at_run() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    let token = h.importer.cancel_token(ctx.task(0).unwrap());
    std::thread::spawn(move || token.cancel()).join().unwrap();

    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::Canceled);
    assert!(h.catalog.layers(None).await.unwrap().is_empty());

    assert!(h.importer.rerun_task(&mut ctx, 0).await.unwrap());
    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::Complete);
}

#[tokio::test]
async fn test_direct_import_rejects_append() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let mut ctx = h.importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    ctx.task_mut(0).unwrap().set_update_mode(UpdateMode::Append).unwrap();
    h.importer.changed(&mut ctx, 0).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();

    let task = ctx.task(0).unwrap();
    assert_eq!(task.state(), TaskState::Error);
    assert!(task.error().unwrap().contains("append"));
}

#[tokio::test]
async fn test_database_source_registered_in_place() {
    let h = harness();
    let db = h.connector.add_database("mem://parcels");
    db.create_table(&TableSchema {
        crs: Some(Crs::wgs84()),
        ..TableSchema::new("lots")
    })
    .await
    .unwrap();
    db.insert(
        "lots",
        &[geocat_core::models::Feature::new(Some(geocat_core::models::Geometry::point(1.0, 2.0)))],
    )
    .await
    .unwrap();

    let mut ctx = h
        .importer
        .create_context(DataSource::database(ConnectionParams::new("mem://parcels")), None, None)
        .await
        .unwrap();
    ctx.set_archive(true);
    h.importer.run(&mut ctx).await.unwrap();

    let layer = h.catalog.layer("default", "lots").await.unwrap().unwrap();
    let store = h.catalog.store("default", &layer.store).await.unwrap().unwrap();
    assert_eq!(store.kind, StoreKind::Tabular);
    assert_eq!(store.name, "parcels");
    assert!(db.has_table("lots").await.unwrap(), "database sources are never archived");
}

#[tokio::test]
async fn test_unusable_targets_fail_context_creation() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let missing_workspace = h.importer.create_context(DataSource::file(&path), Some("nowhere"), None).await;
    assert!(matches!(missing_workspace, Err(ImportError::WorkspaceNotFound { .. })));

    let missing_store = h.importer.create_context(DataSource::file(&path), Some("topp"), Some("nope")).await;
    assert!(matches!(missing_store, Err(ImportError::StoreNotFound { .. })));

    let missing_source = h
        .importer
        .create_context(DataSource::file(temp_dir.path().join("absent.geojson")), None, None)
        .await;
    assert!(matches!(missing_source, Err(ImportError::SourceNotFound { .. })));
    assert!(h.history.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retarget_to_direct_import_unblocks_raster() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    write_archsites(&data);
    write_tiff(&data, "dem.tif");

    let mut ctx = h
        .importer
        .create_context(DataSource::directory(&data), Some("topp"), Some("gis"))
        .await
        .unwrap();
    h.importer.run(&mut ctx).await.unwrap();
    let dem = ctx.tasks().iter().position(|t| t.source().base_name() == "dem").unwrap();
    assert_eq!(ctx.task(dem).unwrap().state(), TaskState::BadFormat);

    let state = h.importer.retarget(&mut ctx, None).await.unwrap();
    assert_eq!(state, ContextState::CompleteWithErrors);
    assert!(ctx.target_store().is_none());
    assert_eq!(ctx.task(dem).unwrap().state(), TaskState::NoCrs);

    let task = ctx.task_mut(dem).unwrap();
    task.set_srs(Crs::wgs84()).unwrap();
    task.set_native_bbox(BoundingBox::new(-104.0, 44.0, -103.0, 45.0, None)).unwrap();
    assert!(h.importer.changed(&mut ctx, dem).await.unwrap());

    h.importer.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.state(), ContextState::Complete);

    let layer = h.catalog.layer("topp", "dem").await.unwrap().unwrap();
    assert_eq!(layer.style, StyleKind::Raster);
    let store = h.catalog.store("topp", &layer.store).await.unwrap().unwrap();
    assert_eq!(store.kind, StoreKind::File);
}

#[tokio::test]
async fn test_registry_without_table_reader_leaves_tables_unrecognized() {
    let h = harness();
    let db = h.connector.add_database("mem://parcels");
    db.create_table(&TableSchema::new("lots")).await.unwrap();

    let importer = Importer::new(
        Arc::new(h.catalog.clone()),
        Arc::new(h.connector.clone()),
        Arc::new(h.history.clone()),
    )
    .with_registry(FormatRegistry::with_file_formats());

    let ctx = importer
        .create_context(DataSource::database(ConnectionParams::new("mem://parcels")), None, None)
        .await
        .unwrap();
    assert_eq!(ctx.tasks().len(), 1);
    assert_eq!(ctx.task(0).unwrap().state(), TaskState::NoFormat);
}

/// Reports the same extent for every input
struct FixedExtent(BoundingBox);

impl CrsTransformer for FixedExtent {
    fn resolve(&self, code: &str) -> geocat_core::Result<Crs> {
        Crs::parse(code)
    }

    fn transform_bbox(&self, _bbox: &BoundingBox, to: &Crs) -> geocat_core::Result<BoundingBox> {
        Ok(self.0.clone().with_crs(Some(to.clone())))
    }
}

#[tokio::test]
async fn test_custom_transformer_supplies_geographic_extent() {
    let h = harness();
    let extent = BoundingBox::new(1.0, 2.0, 3.0, 4.0, None);
    let importer = Importer::new(
        Arc::new(h.catalog.clone()),
        Arc::new(h.connector.clone()),
        Arc::new(h.history.clone()),
    )
    .with_transformer(Arc::new(FixedExtent(extent)));

    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());
    let mut ctx = importer.create_context(DataSource::file(&path), None, None).await.unwrap();
    importer.run(&mut ctx).await.unwrap();

    let layer = h.catalog.layer("default", "archsites").await.unwrap().unwrap();
    let lat_lon = layer.resource.lat_lon_bbox.unwrap();
    assert_eq!((lat_lon.min_x, lat_lon.min_y, lat_lon.max_x, lat_lon.max_y), (1.0, 2.0, 3.0, 4.0));
    assert_eq!(lat_lon.crs, Some(Crs::wgs84()));
}

#[tokio::test]
async fn test_direct_archive_outlives_its_context() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let uploads = temp_dir.path().join("uploads");
    let zip_path = write_roads_zip(temp_dir.path());

    let importer = h.importer.clone().with_settings(ImporterSettings {
        uploads_dir: Some(uploads.clone()),
        ..ImporterSettings::default()
    });
    let mut ctx = importer
        .create_context(DataSource::archive(zip_path.display().to_string()), None, None)
        .await
        .unwrap();
    assert_eq!(importer.run(&mut ctx).await.unwrap(), ContextState::Complete);
    drop(ctx);

    let layer = h.catalog.layer("default", "roads").await.unwrap().unwrap();
    let store = h.catalog.store("default", &layer.store).await.unwrap().unwrap();
    let StoreConnection::File { path, .. } = store.connection else {
        panic!("expected a file store, got {:?}", store.connection);
    };
    assert!(path.starts_with(&uploads));
    assert!(path.is_file(), "registered file must survive the context");
    assert!(zip_path.exists(), "direct imports never archive their source");
}

#[tokio::test]
async fn test_direct_archive_needs_uploads_dir() {
    let h = harness();
    let temp_dir = TempDir::new().unwrap();
    let zip_path = write_roads_zip(temp_dir.path());

    let result = h
        .importer
        .create_context(DataSource::archive(zip_path.display().to_string()), None, None)
        .await;
    assert!(matches!(result, Err(ImportError::SourceUnavailable { .. })));
    assert!(h.history.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_content_cannot_be_retargeted_in_place() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let zip_path = write_roads_zip(temp_dir.path());

    let mut ctx = h
        .importer
        .create_context(DataSource::archive(zip_path.display().to_string()), Some("topp"), Some("gis"))
        .await
        .unwrap();
    let result = h.importer.retarget(&mut ctx, None).await;
    assert!(matches!(result, Err(ImportError::SourceUnavailable { .. })));
    assert_eq!(ctx.target_store().map(|s| s.name.as_str()), Some("gis"));
}

#[tokio::test]
async fn test_update_mode_ignores_layer_of_another_store() {
    let h = harness();
    with_tabular_store(&h).await;
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());

    let mut direct = h.importer.create_context(DataSource::file(&path), Some("topp"), None).await.unwrap();
    h.importer.run(&mut direct).await.unwrap();
    let before = h.catalog.layer("topp", "archsites").await.unwrap().unwrap();
    assert_eq!(before.store, "archsites");

    let mut ctx = h.importer.create_context(DataSource::file(&path), Some("topp"), Some("gis")).await.unwrap();
    ctx.task_mut(0).unwrap().set_update_mode(UpdateMode::Append).unwrap();
    h.importer.changed(&mut ctx, 0).await.unwrap();
    h.importer.run(&mut ctx).await.unwrap();

    let task = ctx.task(0).unwrap();
    assert_eq!(task.state(), TaskState::Error);
    assert!(task.error().unwrap().contains("already exists"));

    let after = h.catalog.layer("topp", "archsites").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert!(!h.connector.database(DB_URL).unwrap().has_table("archsites").await.unwrap());
}

/// Memory catalog whose commits can be made to fail
#[derive(Clone)]
struct FlakyCatalog {
    inner: MemoryCatalog,
    fail_commits: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Catalog for FlakyCatalog {
    async fn workspace(&self, name: &str) -> geocat_core::Result<Option<WorkspaceInfo>> {
        self.inner.workspace(name).await
    }

    async fn add_workspace(&self, workspace: WorkspaceInfo) -> geocat_core::Result<()> {
        self.inner.add_workspace(workspace).await
    }

    async fn default_workspace(&self) -> geocat_core::Result<Option<WorkspaceInfo>> {
        self.inner.default_workspace().await
    }

    async fn workspaces(&self) -> geocat_core::Result<Vec<WorkspaceInfo>> {
        self.inner.workspaces().await
    }

    async fn store(&self, workspace: &str, name: &str) -> geocat_core::Result<Option<StoreInfo>> {
        self.inner.store(workspace, name).await
    }

    async fn stores(&self, workspace: &str) -> geocat_core::Result<Vec<StoreInfo>> {
        self.inner.stores(workspace).await
    }

    async fn layer(&self, workspace: &str, name: &str) -> geocat_core::Result<Option<LayerInfo>> {
        self.inner.layer(workspace, name).await
    }

    async fn layers(&self, workspace: Option<&str>) -> geocat_core::Result<Vec<LayerInfo>> {
        self.inner.layers(workspace).await
    }

    async fn layer_names(&self, workspace: &str) -> geocat_core::Result<HashSet<String>> {
        self.inner.layer_names(workspace).await
    }

    async fn commit(&self, change: CatalogChange) -> geocat_core::Result<CommitOutcome> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(ImportError::CatalogConflict { reason: "catalog offline".to_string() });
        }
        self.inner.commit(change).await
    }

    async fn remove_layer(&self, workspace: &str, name: &str) -> geocat_core::Result<bool> {
        self.inner.remove_layer(workspace, name).await
    }
}

#[tokio::test]
async fn test_failed_commit_restores_existing_table() {
    let h = harness();
    with_tabular_store(&h).await;
    let catalog = FlakyCatalog { inner: h.catalog.clone(), fail_commits: Arc::new(AtomicBool::new(false)) };
    let importer = Importer::new(
        Arc::new(catalog.clone()),
        Arc::new(h.connector.clone()),
        Arc::new(h.history.clone()),
    );
    let temp_dir = TempDir::new().unwrap();
    let path = write_archsites(temp_dir.path());
    let db = h.connector.database(DB_URL).unwrap();

    let mut ctx = importer.create_context(DataSource::file(&path), Some("topp"), Some("gis")).await.unwrap();
    importer.run(&mut ctx).await.unwrap();
    let original = db.read("archsites").await.unwrap();
    assert_eq!(original.len(), 3);

    catalog.fail_commits.store(true, Ordering::SeqCst);
    for mode in [UpdateMode::Replace, UpdateMode::Append] {
        let mut ctx = importer.create_context(DataSource::file(&path), Some("topp"), Some("gis")).await.unwrap();
        ctx.task_mut(0).unwrap().set_update_mode(mode).unwrap();
        importer.changed(&mut ctx, 0).await.unwrap();
        importer.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.task(0).unwrap().state(), TaskState::Error, "{} import", mode);
        assert_eq!(db.read("archsites").await.unwrap(), original, "{} import", mode);
    }
    let layer = h.catalog.layer("topp", "archsites").await.unwrap().unwrap();
    assert_eq!(layer.resource.feature_count, Some(3));
}
