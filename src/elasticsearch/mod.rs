//! Search index publishing

mod publisher;

pub use publisher::{DEFAULT_BULK_SIZE, ElasticsearchPublisher, default_table_mapping};
