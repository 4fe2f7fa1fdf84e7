use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::{Filter, Select, Store, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Rows fetched per `Range` page.
const PAGE_SIZE: usize = 1_000;
/// Values per `in.(...)` filter; keeps URLs under common length limits.
const IN_BATCH: usize = 200;

const MISSING_TABLE_MARKERS: &[&str] = &["Could not find the table", "PGRST205", "42P01"];

/// PostgREST-dialect client for a hosted Postgres.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    client: Client,
}

impl RestStore {
    pub fn new(url: &str, service_key: &str) -> Result<Self, StoreError> {
        let invalid = |err: header::InvalidHeaderValue| {
            StoreError::Configuration(format!("service key is invalid: {err}"))
        };
        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(service_key).map_err(invalid)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {service_key}")).map_err(invalid)?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| StoreError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.request(method, self.endpoint(table))
    }

    async fn execute(&self, table: &str, request: RequestBuilder) -> Result<String, StoreError> {
        let response = request.send().await.map_err(|source| StoreError::Transport {
            table: table.to_owned(),
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| StoreError::Transport {
            table: table.to_owned(),
            source,
        })?;
        if status.is_success() {
            return Ok(body);
        }
        Err(classify(table, status.as_u16(), body))
    }

    fn decode(table: &str, body: &str) -> Result<Vec<Value>, StoreError> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(body).map_err(|source| StoreError::Decode {
            table: table.to_owned(),
            source,
        })
    }

    async fn select_page(
        &self,
        table: &str,
        params: &[(String, String)],
        offset: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let request = self
            .request(Method::GET, table)
            .query(params)
            .header("Range-Unit", "items")
            .header(header::RANGE, format!("{}-{}", offset, offset + PAGE_SIZE - 1));
        let body = self.execute(table, request).await?;
        Self::decode(table, &body)
    }
}

fn classify(table: &str, status: u16, body: String) -> StoreError {
    let missing = (400..500).contains(&status)
        && MISSING_TABLE_MARKERS.iter().any(|marker| body.contains(marker));
    if missing {
        return StoreError::MissingTable {
            table: table.to_owned(),
        };
    }
    StoreError::Http {
        table: table.to_owned(),
        status,
        body,
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quoted(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}

/// Render a filter as a PostgREST query parameter.
pub(crate) fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", literal(value))),
        Filter::In(column, values) => {
            let list: Vec<String> = values.iter().map(quoted).collect();
            (column.clone(), format!("in.({})", list.join(",")))
        }
    }
}

/// Split the first `In` filter into batches so each request stays short.
fn batched(filters: &[Filter]) -> Vec<Vec<Filter>> {
    let position = filters.iter().position(|f| matches!(f, Filter::In(..)));
    let Some(position) = position else {
        return vec![filters.to_vec()];
    };
    let Filter::In(column, values) = &filters[position] else {
        return vec![filters.to_vec()];
    };
    values
        .chunks(IN_BATCH)
        .map(|chunk| {
            let mut batch = filters.to_vec();
            batch[position] = Filter::In(column.clone(), chunk.to_vec());
            batch
        })
        .collect()
}

#[async_trait]
impl Store for RestStore {
    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let request = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.execute(table, request).await?;
        debug!(table, rows = rows.len(), "upserted rows");
        Ok(rows.len())
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(rows);
        self.execute(table, request).await?;
        debug!(table, rows = rows.len(), "inserted rows");
        Ok(rows.len())
    }

    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Value>, StoreError> {
        let columns = if query.columns.is_empty() {
            "*".to_owned()
        } else {
            query.columns.join(",")
        };

        let mut out = Vec::new();
        for filters in batched(&query.filters) {
            let mut params = vec![("select".to_owned(), columns.clone())];
            params.extend(filters.iter().map(filter_param));

            let mut offset = 0;
            loop {
                let page = self.select_page(table, &params, offset).await?;
                let len = page.len();
                out.extend(page);
                if len < PAGE_SIZE {
                    break;
                }
                offset += PAGE_SIZE;
            }
        }
        Ok(out)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<usize, StoreError> {
        let mut touched = 0;
        for filters in batched(std::slice::from_ref(filter)) {
            let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
            let request = self
                .request(Method::PATCH, table)
                .query(&params)
                .header("Prefer", "return=representation")
                .json(patch);
            let body = self.execute(table, request).await?;
            touched += Self::decode(table, &body)?.len();
        }
        Ok(touched)
    }
}
