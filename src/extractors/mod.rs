//! Record sources
//!
//! CSV extractors live here; the Neo4j and REST API extractors live next to
//! their clients and are re-exported for convenience.

mod csv;

pub use self::csv::{CsvExtractor, CsvTableColumnExtractor};
pub use crate::etl::GenericExtractor;
pub use crate::neo4j::Neo4jExtractor;
pub use crate::rest_api::RestApiExtractor;
