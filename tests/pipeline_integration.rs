//! Integration tests for the extract → transform → stage pipeline
//!
//! These run real file I/O through the loaders and read the staged files
//! back the way the publishers do.

use databuilder::cli::{DictExtractor, build_transformers};
use databuilder::config::{self, ConfigTree};
use databuilder::etl::{DefaultTask, Task, Transformer};
use databuilder::extractors::CsvTableColumnExtractor;
use databuilder::models::ModelClass;
use databuilder::storage::{FsElasticsearchJsonLoader, FsNeo4jCsvLoader, NdjsonReader, Neo4jCsvReader};
use databuilder::transform::DictToModel;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_catalog(dir: &Path) -> (String, String) {
    let tables = dir.join("tables.csv");
    let columns = dir.join("columns.csv");
    fs::write(
        &tables,
        "database,cluster,schema,name,description,tags,is_view\n\
         hive,gold,core,orders,All orders,\"pii,finance\",false\n\
         hive,gold,core,users,,,false\n",
    )
    .unwrap();
    fs::write(
        &columns,
        "database,cluster,schema,table_name,name,description,col_type,col_sort_order\n\
         hive,gold,core,orders,id,Order id,bigint,0\n\
         hive,gold,core,orders,amount,,decimal,1\n",
    )
    .unwrap();
    (
        tables.to_string_lossy().into_owned(),
        columns.to_string_lossy().into_owned(),
    )
}

fn staged_rows(dir: &Path, prefix: &str) -> Vec<serde_json::Map<String, Value>> {
    let mut rows = Vec::new();
    for file in Neo4jCsvReader::list_files(dir).unwrap() {
        let name = file.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with(prefix) {
            rows.extend(Neo4jCsvReader::read(&file).unwrap());
        }
    }
    rows
}

#[tokio::test]
async fn test_csv_catalog_to_neo4j_staging() {
    let temp = TempDir::new().unwrap();
    let (tables, columns) = write_catalog(temp.path());
    let nodes = temp.path().join("nodes");
    let relations = temp.path().join("relations");

    let mut task = DefaultTask::new(
        CsvTableColumnExtractor::new(&tables, &columns).unwrap(),
        DictToModel::new(ModelClass::TableMetadata),
        FsNeo4jCsvLoader::new(&nodes, &relations, false).unwrap(),
    );
    let report = task.run().await.unwrap();
    assert_eq!(report.extracted, 2);
    assert_eq!(report.loaded, 2);

    let table_rows = staged_rows(&nodes, "Table_");
    let keys: Vec<&str> = table_rows
        .iter()
        .filter_map(|row| row.get("KEY").and_then(Value::as_str))
        .collect();
    assert_eq!(keys, vec!["hive://gold.core/orders", "hive://gold.core/users"]);

    let column_rows = staged_rows(&nodes, "Column_");
    assert_eq!(column_rows.len(), 2);
    assert!(
        column_rows
            .iter()
            .any(|row| row.get("KEY") == Some(&json!("hive://gold.core/orders/id")))
    );

    let tag_relations = staged_rows(&relations, "Table_Tag_TAGGED_BY_");
    assert_eq!(tag_relations.len(), 2);
    assert!(
        tag_relations
            .iter()
            .all(|row| row.get("REVERSE_TYPE") == Some(&json!("TAG")))
    );
}

#[tokio::test]
async fn test_staging_directory_must_be_empty() {
    let temp = TempDir::new().unwrap();
    let nodes = temp.path().join("nodes");
    fs::create_dir_all(&nodes).unwrap();
    fs::write(nodes.join("Table_0.csv"), "KEY,LABEL\n").unwrap();
    let relations = temp.path().join("relations");

    assert!(FsNeo4jCsvLoader::new(&nodes, &relations, false).is_err());
    FsNeo4jCsvLoader::new(&nodes, &relations, true).unwrap();
    assert!(Neo4jCsvReader::list_files(&nodes).unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_search_pipeline() {
    let temp = TempDir::new().unwrap();
    let docs = temp.path().join("search").join("tables.json");
    let conf = ConfigTree::from_value(json!({
        "job": {
            "kind": "search",
            "extractor": "generic",
            "transformers": ["regex_str_replace", "template_variable_substitution", "remove_field"]
        },
        "extractor": {"generic": {"values": [
            {"database": "hive", "cluster": "gold", "schema": "core", "name": "orders", "description": "Orders\tdaily", "owner": "x"},
            {"database": "hive", "cluster": "gold", "schema": "core", "name": "users", "description": "Users", "owner": "y"}
        ]}},
        "transformer": {
            "regex_str_replace": {"attribute_name": "description", "regex_replace_tuple_list": [["\\t", " "]]},
            "template_variable_substitution": {"field_name": "key", "template": "{database}://{cluster}.{schema}/{name}"},
            "remove_field": {"field_names": ["owner"]}
        },
        "loader": {"filesystem": {"elasticsearch": {"file_path": docs.to_string_lossy()}}}
    }))
    .unwrap();

    let extractor = DictExtractor::from_config(&conf).unwrap();
    let transformer = build_transformers(&conf).unwrap();
    let loader: FsElasticsearchJsonLoader = config::build(&conf).unwrap();
    let report = DefaultTask::new(extractor, transformer, loader)
        .with_config(&conf)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.loaded, 2);

    let documents = NdjsonReader::new(&docs).read().unwrap();
    assert_eq!(
        documents[0],
        json!({
            "database": "hive", "cluster": "gold", "schema": "core", "name": "orders",
            "description": "Orders daily", "key": "hive://gold.core/orders"
        })
    );
    assert_eq!(documents[1]["key"], "hive://gold.core/users");
}

#[test]
fn test_dict_to_model_rejects_incomplete_records() {
    let transformer = DictToModel::new(ModelClass::TableMetadata);
    let err = transformer
        .transform(json!({"database": "hive", "name": "orders"}))
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("table_metadata"));
}
