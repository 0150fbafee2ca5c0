//! Seed and HTTP query steps

use super::{JsonPath, JsonSource, Record, RestApiQuery};
use crate::transform::render_template;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// First step of a chain: yields a fixed list of records
#[derive(Debug, Clone, Default)]
pub struct RestApiQuerySeed {
    records: VecDeque<Record>,
}

impl RestApiQuerySeed {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RestApiQuery for RestApiQuerySeed {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.pop_front())
    }
}

/// Page-by-page fetching for a query step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// Keep requesting while a page yields at least this many groups
    pub max_record_size: usize,
    /// Template field and query parameter name carrying the page number
    pub page_param: String,
    pub start_page: u64,
}

impl Pagination {
    pub fn new(max_record_size: usize) -> Self {
        Self {
            max_record_size,
            page_param: "page".to_string(),
            start_page: 1,
        }
    }
}

/// A query step joined onto the records of an inner query
///
/// # Example
/// ```no_run
/// use databuilder::client::{Auth, HttpClient};
/// use databuilder::rest_api::{HttpRestApiQuery, RestApiQuery, RestApiQuerySeed};
/// use serde_json::json;
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
///
/// # async fn example() -> eyre::Result<()> {
/// let http = Arc::new(HttpClient::try_new(Auth::None, &BTreeMap::new(), None)?);
/// let seed = RestApiQuerySeed::new([json!({"org": "acme"}).as_object().unwrap().clone()]);
///
/// let mut query = HttpRestApiQuery::new(
///     Box::new(seed),
///     http,
///     "https://api.example.com/orgs/{org}/tables",
///     "tables[*].[id,name]",
///     ["table_id", "table_name"],
/// )?;
/// while let Some(record) = query.next_record().await? {
///     println!("{:?}", record);
/// }
/// # Ok(())
/// # }
/// ```
pub struct HttpRestApiQuery {
    inner: Box<dyn RestApiQuery>,
    source: Arc<dyn JsonSource>,
    url_template: String,
    json_paths: Vec<JsonPath>,
    field_names: Vec<String>,
    fail_no_result: bool,
    skip_no_result: bool,
    can_skip_failure: bool,
    pagination: Option<Pagination>,
    pending: VecDeque<Record>,
}

impl HttpRestApiQuery {
    /// Create a query step
    ///
    /// # Errors
    /// Returns an error when `field_names` is empty or the JSON path is invalid
    pub fn new<I, S>(
        inner: Box<dyn RestApiQuery>,
        source: Arc<dyn JsonSource>,
        url_template: impl Into<String>,
        json_path: &str,
        field_names: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field_names: Vec<String> = field_names.into_iter().map(Into::into).collect();
        if field_names.is_empty() {
            eyre::bail!("A REST API query needs at least one field name");
        }
        Ok(Self {
            inner,
            source,
            url_template: url_template.into(),
            json_paths: vec![JsonPath::parse(json_path)?],
            field_names,
            fail_no_result: false,
            skip_no_result: false,
            can_skip_failure: false,
            pagination: None,
            pending: VecDeque::new(),
        })
    }

    /// Treat the JSON path as `a|b|...` and concatenate every branch's results
    pub fn with_json_path_contains_or(mut self, enabled: bool) -> Result<Self> {
        if enabled {
            let raw = self.json_paths[0].as_str().to_string();
            self.json_paths = raw
                .split('|')
                .map(JsonPath::parse)
                .collect::<Result<_>>()?;
        }
        Ok(self)
    }

    pub fn with_fail_no_result(mut self, enabled: bool) -> Self {
        self.fail_no_result = enabled;
        self
    }

    pub fn with_skip_no_result(mut self, enabled: bool) -> Self {
        self.skip_no_result = enabled;
        self
    }

    pub fn with_can_skip_failure(mut self, enabled: bool) -> Self {
        self.can_skip_failure = enabled;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    fn url_for(&self, record: &Record, page: Option<u64>) -> Result<String> {
        let (Some(page), Some(pagination)) = (page, &self.pagination) else {
            return render_template(&self.url_template, record);
        };

        let placeholder = format!("{{{}}}", pagination.page_param);
        if self.url_template.contains(&placeholder) {
            let mut record = record.clone();
            record.insert(pagination.page_param.clone(), Value::from(page));
            return render_template(&self.url_template, &record);
        }

        let url = render_template(&self.url_template, record)?;
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}={}", url, separator, pagination.page_param, page))
    }

    fn evaluate(&self, document: &Value) -> Vec<Value> {
        self.json_paths
            .iter()
            .flat_map(|path| path.find(document))
            .collect()
    }

    /// Fetch every page for one inner record and queue the joined records
    async fn fetch(&mut self, record: Record) -> Result<()> {
        let mut page = self.pagination.as_ref().map(|p| p.start_page);
        let mut first = true;

        loop {
            let url = self.url_for(&record, page)?;
            let document = match self.source.get_json(&url).await {
                Ok(document) => document,
                Err(err) if self.can_skip_failure => {
                    log::warn!("Skipping record after failed request to {}: {:#}", url, err);
                    return Ok(());
                }
                Err(err) => return Err(err).wrap_err_with(|| format!("Request to {} failed", url)),
            };

            let results = self.evaluate(&document);
            if results.is_empty() {
                if self.fail_no_result {
                    eyre::bail!(
                        "No result from {} for JSON path '{}'",
                        url,
                        self.json_paths
                            .iter()
                            .map(JsonPath::as_str)
                            .collect::<Vec<_>>()
                            .join("|")
                    );
                }
                if first && !self.skip_no_result {
                    self.pending.push_back(record);
                }
                return Ok(());
            }

            let width = self.field_names.len();
            if results.len() % width != 0 {
                eyre::bail!(
                    "Response from {} has {} values, not a multiple of {} field names {:?}",
                    url,
                    results.len(),
                    width,
                    self.field_names
                );
            }

            let groups = results.len() / width;
            for chunk in results.chunks(width) {
                let mut joined = record.clone();
                for (name, value) in self.field_names.iter().zip(chunk) {
                    joined.insert(name.clone(), value.clone());
                }
                self.pending.push_back(joined);
            }
            log::trace!("{} yielded {} record(s)", url, groups);

            match (&self.pagination, page) {
                (Some(pagination), Some(current)) if groups >= pagination.max_record_size => {
                    page = Some(current + 1);
                    first = false;
                }
                _ => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl RestApiQuery for HttpRestApiQuery {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            let Some(inner) = self.inner.next_record().await? else {
                return Ok(None);
            };
            self.fetch(inner).await?;
        }
    }
}
