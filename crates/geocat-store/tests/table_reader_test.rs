//! Database tables read through the format registry

use std::sync::Arc;

use geocat_core::formats::{BoundsHint, Format, FormatRegistry, SourceContent};
use geocat_core::models::{
    AttributeDescriptor, AttributeKind, ConnectionParams, Crs, Feature, Geometry, GeometryType,
    SourceUnit,
};
use geocat_core::ports::{DatabaseConnector, TableSchema, TableStore};
use geocat_store::MemoryConnector;

async fn seeded_connector() -> MemoryConnector {
    let connector = MemoryConnector::new();
    let db = connector.add_database("mem://gis");

    let mut schema = TableSchema::new("roads");
    schema.attributes.push(AttributeDescriptor::new("name", AttributeKind::String));
    schema.geometry_type = Some(GeometryType::LineString);
    schema.crs = Some(Crs::from_epsg(26713));
    db.create_table(&schema).await.unwrap();

    let road = Feature::new(Some(Geometry::line_string(vec![[0.0, 0.0], [10.0, 5.0]])))
        .with_property("name", "main");
    db.insert("roads", &[road.clone(), road]).await.unwrap();
    connector
}

#[tokio::test]
async fn test_table_units_are_detected_and_inspected() {
    let connector = seeded_connector().await;
    let registry = FormatRegistry::standard(Arc::new(connector));
    let unit = SourceUnit::table(ConnectionParams::new("mem://gis"), "roads");

    assert_eq!(registry.detect(&unit), Some(Format::Table));

    let reader = registry.reader(Format::Table).unwrap();
    let metadata = reader.inspect(&unit).await.unwrap();
    assert_eq!(metadata.crs, Some(Crs::from_epsg(26713)));
    assert_eq!(metadata.feature_count, Some(2));
    assert_eq!(metadata.bounds, BoundsHint::RequiresScan);
    assert_eq!(metadata.attribute_kind("name"), Some(AttributeKind::String));

    match reader.read(&unit).await.unwrap() {
        SourceContent::Features(features) => assert_eq!(features.len(), 2),
        other => panic!("unexpected content: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_table_fails_validation() {
    let connector = seeded_connector().await;
    let registry = FormatRegistry::standard(Arc::new(connector));
    let unit = SourceUnit::table(ConnectionParams::new("mem://gis"), "rivers");

    let validation = registry.reader(Format::Table).unwrap().validate(&unit).await.unwrap();
    assert!(!validation.is_valid());
}

#[tokio::test]
async fn test_connector_shares_database_state() {
    let connector = seeded_connector().await;
    let store = connector.connect(&ConnectionParams::new("mem://gis")).await.unwrap();
    assert_eq!(store.list_tables().await.unwrap(), vec!["roads".to_string()]);
    assert_eq!(connector.database("mem://gis").unwrap().count("roads").await.unwrap(), 2);
}
