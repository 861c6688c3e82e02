use std::time::Duration;

use async_trait::async_trait;
use driftwatch_core::Batch;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use super::BatchSource;
use crate::error::FetchError;

const USER_AGENT: &str = concat!("driftwatch/", env!("CARGO_PKG_VERSION"));
const FULL_TEXT_FIELD: &str = "_full_text";

/// Connection and paging settings for a CKAN datastore resource.
#[derive(Debug, Clone)]
pub struct CkanConfig {
    pub base_url: String,
    pub resource_id: String,
    pub batch_size: usize,
    /// Stop paging once this many records have been read.
    pub max_records: Option<usize>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl CkanConfig {
    pub fn new(base_url: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource_id: resource_id.into(),
            batch_size: 1000,
            max_records: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }

    fn action_url(&self, action: &str) -> String {
        format!(
            "{}/api/3/action/{action}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct CkanEnvelope<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct SqlResult {
    #[serde(default)]
    records: Vec<Map<String, JsonValue>>,
    #[serde(default)]
    fields: Vec<CkanField>,
}

#[derive(Debug, Deserialize)]
struct CkanField {
    id: String,
}

/// Build the paged query for a datastore resource.
pub fn build_sql(resource_id: &str, limit: usize, offset: usize) -> String {
    let quoted = resource_id.replace('"', "\"\"");
    let mut sql = format!("SELECT * FROM \"{quoted}\" LIMIT {limit}");
    if offset > 0 {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    sql
}

/// Decode a `datastore_search_sql` response body into a batch.
///
/// Columns follow the declared field order; the search index field is
/// dropped.
pub fn parse_sql_response(body: &str) -> Result<Batch, FetchError> {
    let envelope: CkanEnvelope<SqlResult> =
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;

    if !envelope.success {
        let detail = envelope
            .error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "request was not successful".to_string());
        return Err(FetchError::Api(detail));
    }

    let result = envelope
        .result
        .ok_or_else(|| FetchError::Decode("missing result".to_string()))?;
    let fields: Vec<String> = result
        .fields
        .into_iter()
        .map(|field| field.id)
        .filter(|id| id != FULL_TEXT_FIELD)
        .collect();
    let records: Vec<Map<String, JsonValue>> = result
        .records
        .into_iter()
        .map(|mut record| {
            record.remove(FULL_TEXT_FIELD);
            record
        })
        .collect();

    Ok(Batch::from_json_records(&fields, &records)?)
}

/// HTTP client for a CKAN datastore.
#[derive(Debug, Clone)]
pub struct CkanClient {
    http: reqwest::Client,
    config: CkanConfig,
}

impl CkanClient {
    pub fn new(config: CkanConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CkanConfig {
        &self.config
    }

    /// Fetch one page of records.
    pub async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Batch, FetchError> {
        let sql = build_sql(&self.config.resource_id, limit, offset);
        let body = self.get_with_retry("datastore_search_sql", Some(&sql)).await?;
        parse_sql_response(&body)
    }

    async fn get_with_retry(&self, action: &str, sql: Option<&str>) -> Result<String, FetchError> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.get_once(action, sql).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        action,
                        attempt,
                        attempts,
                        error = %err,
                        "CKAN request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, action: &str, sql: Option<&str>) -> Result<String, FetchError> {
        let mut request = self.http.get(self.config.action_url(action));
        if let Some(sql) = sql {
            request = request.query(&[("sql", sql)]);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        // CKAN reports query errors as 409 with a JSON envelope.
        if !status.is_success() && !status.is_client_error() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status.is_client_error() && serde_json::from_str::<JsonValue>(&body).is_err() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl BatchSource for CkanClient {
    fn resource_id(&self) -> &str {
        &self.config.resource_id
    }

    async fn health_check(&self) -> bool {
        match self.get_once("status_show", None).await {
            Ok(body) => match serde_json::from_str::<CkanEnvelope<JsonValue>>(&body) {
                Ok(envelope) => envelope.success,
                Err(err) => {
                    tracing::warn!(error = %err, "CKAN status_show returned malformed body");
                    false
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "CKAN health check failed");
                false
            }
        }
    }

    async fn fetch(&self) -> Result<Batch, FetchError> {
        let page_size = self.config.batch_size.max(1);
        let mut batch = Batch::empty();
        let mut offset = 0;

        loop {
            let limit = match self.config.max_records {
                Some(max) if offset >= max => break,
                Some(max) => page_size.min(max - offset),
                None => page_size,
            };
            let page = self.fetch_page(limit, offset).await?;
            let rows = page.row_count();
            tracing::debug!(
                resource = %self.config.resource_id,
                offset,
                rows,
                "fetched CKAN page"
            );
            if rows > 0 {
                batch.append(page)?;
            }
            offset += rows;
            if rows < limit {
                break;
            }
        }

        tracing::info!(
            resource = %self.config.resource_id,
            records = batch.row_count(),
            columns = batch.column_count(),
            "fetched records from CKAN"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::Value;

    #[test]
    fn sql_quotes_resource_and_pages() {
        assert_eq!(build_sql("abc-123", 100, 0), "SELECT * FROM \"abc-123\" LIMIT 100");
        assert_eq!(
            build_sql("abc", 10, 20),
            "SELECT * FROM \"abc\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(build_sql("a\"b", 1, 0), "SELECT * FROM \"a\"\"b\" LIMIT 1");
    }

    #[test]
    fn parses_records_in_field_order() {
        let body = r#"{
            "success": true,
            "result": {
                "fields": [
                    {"id": "_id", "type": "int"},
                    {"id": "_full_text", "type": "tsvector"},
                    {"id": "permit_number", "type": "text"},
                    {"id": "estimated_cost", "type": "numeric"}
                ],
                "records": [
                    {"_id": 1, "_full_text": "x", "permit_number": "P-1", "estimated_cost": "1,000"},
                    {"_id": 2, "_full_text": "y", "permit_number": "P-2", "estimated_cost": null}
                ]
            }
        }"#;

        let batch = parse_sql_response(body).expect("parse");
        let names: Vec<&str> = batch.column_names().collect();
        assert_eq!(names, ["_id", "permit_number", "estimated_cost"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.get(0, "_id"), Some(&Value::Int(1)));
        assert_eq!(batch.get(1, "estimated_cost"), Some(&Value::Null));
    }

    #[test]
    fn unsuccessful_envelope_is_api_error() {
        let body = r#"{"success": false, "error": {"message": "Not found"}}"#;
        let err = parse_sql_response(body).expect_err("api error");
        assert!(matches!(err, FetchError::Api(ref message) if message.contains("Not found")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_sql_response("<html>").expect_err("decode error");
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn action_url_trims_trailing_slash() {
        let config = CkanConfig::new("https://ckan.example.org/", "res");
        assert_eq!(
            config.action_url("status_show"),
            "https://ckan.example.org/api/3/action/status_show"
        );
    }
}
