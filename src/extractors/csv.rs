//! CSV file extractors

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Extractor;
use eyre::{Context, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::Path;

const DATABASE_FIELDS: &[&str] = &["database", "db", "db_name"];
const TABLE_FIELDS: &[&str] = &["name", "table_name", "table"];
const COLUMN_TABLE_FIELDS: &[&str] = &["table_name", "table"];

fn open_reader(path: &Path) -> Result<(Vec<String>, csv::StringRecordsIntoIter<File>)> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    Ok((headers, reader.into_records()))
}

fn to_record(headers: &[String], row: &csv::StringRecord) -> Map<String, Value> {
    headers
        .iter()
        .zip(row.iter())
        .map(|(header, cell)| (header.clone(), Value::String(cell.to_string())))
        .collect()
}

fn read_all(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let (headers, rows) = open_reader(path)?;
    rows.enumerate()
        .map(|(index, row)| {
            row.map(|row| to_record(&headers, &row))
                .with_context(|| format!("Failed to read row {} of {}", index + 1, path.display()))
        })
        .collect()
}

/// Yields every row of a CSV file as an object of strings, keyed by header
pub struct CsvExtractor {
    headers: Vec<String>,
    rows: csv::StringRecordsIntoIter<File>,
    file_location: String,
}

impl CsvExtractor {
    pub fn new(file_location: impl AsRef<Path>) -> Result<Self> {
        let path = file_location.as_ref();
        let (headers, rows) = open_reader(path)?;
        Ok(Self {
            headers,
            rows,
            file_location: path.display().to_string(),
        })
    }
}

impl Scoped for CsvExtractor {
    const SCOPE: &'static str = "extractor.csv";
}

impl FromConfig for CsvExtractor {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Self::new(conf.get_str("file_location")?)
    }
}

impl Extractor for CsvExtractor {
    type Item = Value;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        match self.rows.next() {
            Some(row) => {
                let row = row.with_context(|| format!("Failed to read row of {}", self.file_location))?;
                Ok(Some(Value::Object(to_record(&self.headers, &row))))
            }
            None => Ok(None),
        }
    }
}

type TableId = (String, String, String, String);

fn field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> &'a str {
    names
        .iter()
        .find_map(|name| record.get(*name).and_then(|v| v.as_str()))
        .unwrap_or("")
}

fn table_id(record: &Map<String, Value>, table_fields: &[&str]) -> TableId {
    (
        field(record, DATABASE_FIELDS).to_string(),
        field(record, &["cluster"]).to_string(),
        field(record, &["schema"]).to_string(),
        field(record, table_fields).to_string(),
    )
}

/// Joins a table CSV with a column CSV into table-metadata-shaped records
///
/// Tables come out in table-file order, each with a `columns` list holding
/// its column rows in column-file order. Columns whose table is not in the
/// table file are dropped with a warning.
pub struct CsvTableColumnExtractor {
    tables: VecDeque<Value>,
}

impl CsvTableColumnExtractor {
    pub fn new(table_file: impl AsRef<Path>, column_file: impl AsRef<Path>) -> Result<Self> {
        let tables = read_all(table_file.as_ref())?;
        let mut columns: HashMap<TableId, Vec<Value>> = HashMap::new();
        for mut column in read_all(column_file.as_ref())? {
            let id = table_id(&column, COLUMN_TABLE_FIELDS);
            for key in DATABASE_FIELDS.iter().chain(COLUMN_TABLE_FIELDS).chain(&["cluster", "schema"]) {
                column.remove(*key);
            }
            columns.entry(id).or_default().push(Value::Object(column));
        }

        let mut joined = VecDeque::with_capacity(tables.len());
        for mut table in tables {
            let id = table_id(&table, TABLE_FIELDS);
            let table_columns = columns.remove(&id).unwrap_or_default();
            table.insert("columns".to_string(), Value::Array(table_columns));
            joined.push_back(Value::Object(table));
        }

        for ((database, cluster, schema, table), orphans) in &columns {
            log::warn!(
                "Dropping {} column(s) of {}://{}.{}/{}, which is not in the table file",
                orphans.len(),
                database,
                cluster,
                schema,
                table
            );
        }

        Ok(Self { tables: joined })
    }
}

impl Scoped for CsvTableColumnExtractor {
    const SCOPE: &'static str = "extractor.csvtablecolumn";
}

impl FromConfig for CsvTableColumnExtractor {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Self::new(
            conf.get_str("table_file_location")?,
            conf.get_str("column_file_location")?,
        )
    }
}

impl Extractor for CsvTableColumnExtractor {
    type Item = Value;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.tables.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelClass;
    use serde_json::json;
    use tempfile::TempDir;

    const TABLES: &str = "\
database,cluster,schema,name,description,tags,is_view
hive,gold,core,orders,All orders,\"pii,finance\",false
hive,gold,core,users,,,true
";

    const COLUMNS: &str = "\
database,cluster,schema,table_name,name,description,col_type,col_sort_order
hive,gold,core,orders,id,Order id,bigint,0
hive,gold,core,orders,amount,,decimal,1
hive,gold,core,ghosts,boo,,string,0
";

    fn write_files(temp: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let tables = temp.path().join("tables.csv");
        let columns = temp.path().join("columns.csv");
        std::fs::write(&tables, TABLES).unwrap();
        std::fs::write(&columns, COLUMNS).unwrap();
        (tables, columns)
    }

    #[tokio::test]
    async fn test_csv_extractor_yields_rows() {
        let temp = TempDir::new().unwrap();
        let (tables, _) = write_files(&temp);
        let conf = ConfigTree::from_pairs([("file_location", tables.to_string_lossy().into_owned())]);

        let mut extractor = CsvExtractor::from_config(&conf).unwrap();
        let first = extractor.extract().await.unwrap().unwrap();
        assert_eq!(first["name"], "orders");
        assert_eq!(first["tags"], "pii,finance");
        assert_eq!(extractor.extract().await.unwrap().unwrap()["is_view"], "true");
        assert!(extractor.extract().await.unwrap().is_none());
    }

    #[test]
    fn test_csv_extractor_missing_file() {
        assert!(CsvExtractor::new("/nonexistent/tables.csv").is_err());
    }

    #[tokio::test]
    async fn test_table_column_join() {
        let temp = TempDir::new().unwrap();
        let (tables, columns) = write_files(&temp);

        let mut extractor = CsvTableColumnExtractor::new(&tables, &columns).unwrap();
        let orders = extractor.extract().await.unwrap().unwrap();
        assert_eq!(
            orders["columns"],
            json!([
                {"name": "id", "description": "Order id", "col_type": "bigint", "col_sort_order": "0"},
                {"name": "amount", "description": "", "col_type": "decimal", "col_sort_order": "1"}
            ])
        );
        let users = extractor.extract().await.unwrap().unwrap();
        assert_eq!(users["columns"], json!([]));
        assert!(extractor.extract().await.unwrap().is_none());

        let model = ModelClass::TableMetadata.from_record(orders).unwrap();
        let labels: Vec<String> = model.nodes().into_iter().map(|n| n.label).collect();
        assert_eq!(labels.iter().filter(|l| *l == "Column").count(), 2);
        assert_eq!(labels.iter().filter(|l| *l == "Tag").count(), 2);
    }
}
