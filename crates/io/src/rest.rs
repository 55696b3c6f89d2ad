//! PostgREST-backed record source.
//!
//! Talks to `{base}/rest/v1/{table}` with the API key sent both as the
//! `apikey` header and as a bearer token. Requests go through one retry
//! loop:
//!
//! - 401 / 403 fail immediately as an unavailable source
//! - other 4xx fail immediately (rejected write, or unavailable on reads)
//! - 429, 5xx and transport errors retry up to [`MAX_RETRIES`] times with
//!   exponential backoff, honoring `Retry-After` on 429

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;

use swapfix_recon::config::is_identifier;
use swapfix_recon::{ColumnMapping, Record, RecordSource, SourceError};

pub const MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("swapfix/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// Why a request ended without a 2xx response.
enum Failure {
    Auth(u16, String),
    Client(u16, String),
    Exhausted(String),
}

impl Failure {
    /// Failures outside a single-record write take the whole source down.
    fn into_unavailable(self) -> SourceError {
        match self {
            Failure::Auth(status, msg) => {
                SourceError::Unavailable(format!("auth failed ({}): {}", status, msg))
            }
            Failure::Client(status, msg) => {
                SourceError::Unavailable(format!("request rejected ({}): {}", status, msg))
            }
            Failure::Exhausted(msg) => SourceError::Unavailable(msg),
        }
    }
}

pub struct RestSource {
    http: Client,
    endpoint: String,
    api_key: String,
    columns: ColumnMapping,
    backoff_base: Duration,
}

impl RestSource {
    pub fn new(
        base_url: &str,
        table: &str,
        columns: &ColumnMapping,
        api_key: String,
    ) -> Result<Self, SourceError> {
        for name in [
            table,
            columns.id.as_str(),
            columns.code.as_str(),
            columns.stored_date.as_str(),
            columns.trusted_timestamp.as_str(),
        ] {
            if !is_identifier(name) {
                return Err(SourceError::Unavailable(format!(
                    "invalid identifier '{}'",
                    name
                )));
            }
        }

        let http = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key,
            columns: columns.clone(),
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay (doubles on every attempt).
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    fn send_with_retry(
        &self,
        build_request: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Response, Failure> {
        let mut backoff = self.backoff_base;

        for attempt in 0..=MAX_RETRIES {
            let req = self.authed(build_request(&self.http));

            match req.send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 401 || status == 403 {
                        return Err(Failure::Auth(status, error_message(resp, status)));
                    }

                    if (400..500).contains(&status) && status != 429 {
                        return Err(Failure::Client(status, error_message(resp, status)));
                    }

                    if status == 429 || status >= 500 {
                        if attempt == MAX_RETRIES {
                            return Err(Failure::Exhausted(format!(
                                "{} after {} retries ({})",
                                if status == 429 { "rate limited" } else { "upstream error" },
                                MAX_RETRIES,
                                status,
                            )));
                        }

                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or(backoff)
                        } else {
                            backoff
                        };

                        log::warn!(
                            "retry {}/{} in {:?} (HTTP {})",
                            attempt + 1,
                            MAX_RETRIES,
                            wait,
                            status,
                        );
                        thread::sleep(wait);
                        backoff *= 2;
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(Failure::Exhausted(format!(
                            "upstream error after {} retries: {}",
                            MAX_RETRIES, e
                        )));
                    }

                    log::warn!(
                        "retry {}/{} in {:?} ({})",
                        attempt + 1,
                        MAX_RETRIES,
                        backoff,
                        e,
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }

        Err(Failure::Exhausted("retry loop exited".into()))
    }

    fn row_to_record(&self, row: &Value) -> Option<Record> {
        let id = value_text(&row[self.columns.id.as_str()])?;
        let code = value_text(&row[self.columns.code.as_str()]).unwrap_or_default();
        let stored = value_text(&row[self.columns.stored_date.as_str()]);
        let trusted = value_text(&row[self.columns.trusted_timestamp.as_str()]);
        Some(Record::from_raw(id, code, stored.as_deref(), trusted.as_deref()))
    }
}

impl RecordSource for RestSource {
    fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>, SourceError> {
        let c = &self.columns;
        let select = format!(
            "{},{},{},{}",
            c.id, c.code, c.stored_date, c.trusted_timestamp
        );
        let order = format!("{}.desc.nullslast,{}.asc", c.trusted_timestamp, c.id);
        let limit = limit.to_string();

        let resp = self
            .send_with_retry(|http| {
                http.get(&self.endpoint).query(&[
                    ("select", select.as_str()),
                    ("order", order.as_str()),
                    ("limit", limit.as_str()),
                ])
            })
            .map_err(Failure::into_unavailable)?;

        let rows: Vec<Value> = resp
            .json()
            .map_err(|e| SourceError::Unavailable(format!("failed to parse response: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.row_to_record(row) {
                Some(record) => records.push(record),
                None => log::warn!("{}: skipping row without '{}'", self.endpoint, c.id),
            }
        }
        Ok(records)
    }

    fn update_stored_date(&mut self, id: &str, new_date: NaiveDate) -> Result<(), SourceError> {
        let filter = format!("eq.{}", id);
        let mut body = serde_json::Map::new();
        body.insert(
            self.columns.stored_date.clone(),
            Value::String(new_date.format("%Y-%m-%d").to_string()),
        );
        let body = Value::Object(body);

        let resp = self
            .send_with_retry(|http| {
                http.patch(&self.endpoint)
                    .query(&[(self.columns.id.as_str(), filter.as_str())])
                    .header("Prefer", "return=representation")
                    .json(&body)
            })
            .map_err(|failure| match failure {
                Failure::Client(status, msg) => SourceError::Rejected {
                    id: id.to_string(),
                    message: format!("HTTP {}: {}", status, msg),
                },
                other => other.into_unavailable(),
            })?;

        if resp.status().as_u16() == 204 {
            return Ok(());
        }

        let updated: Vec<Value> = resp.json().map_err(|e| SourceError::Rejected {
            id: id.to_string(),
            message: format!("failed to parse response: {}", e),
        })?;
        if updated.is_empty() {
            return Err(SourceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_matching(&self, date: NaiveDate) -> Result<u64, SourceError> {
        let filter = format!("eq.{}", date.format("%Y-%m-%d"));

        let resp = self
            .send_with_retry(|http| {
                http.get(&self.endpoint)
                    .query(&[
                        ("select", self.columns.id.as_str()),
                        (self.columns.stored_date.as_str(), filter.as_str()),
                        ("limit", "1"),
                    ])
                    .header("Prefer", "count=exact")
            })
            .map_err(Failure::into_unavailable)?;

        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SourceError::Unavailable("response has no Content-Range".into()))?;

        parse_content_range_total(range).ok_or_else(|| {
            SourceError::Unavailable(format!("unexpected Content-Range '{}'", range))
        })
    }

    fn describe(&self) -> String {
        format!("rest {}", self.endpoint)
    }
}

/// Render a JSON scalar as text. Objects and arrays keep their JSON form.
fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// `0-24/3573` or `*/0` → total after the slash.
fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.parse().ok()
}

fn error_message(resp: Response, status: u16) -> String {
    let body: Value = resp.json().unwrap_or(Value::Null);
    body["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .or_else(|| body["hint"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}
