//! Qualys report API client implementation.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex_lite::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Proxy, StatusCode};
use tracing::{debug, warn};

use crate::config::ApiConfig;

use super::{QuotaSnapshot, RemoteError, RemoteReportService, RemoteReportState, RunningReport};

const REPORT_ENDPOINT: &str = "/api/2.0/fo/report/";
const HEADER_RATE_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RATE_TO_WAIT: &str = "x-ratelimit-towait-sec";

/// API error codes with dedicated handling.
const CODE_BAD_LOGIN: u32 = 2000;
const CODE_CONCURRENCY_LIMIT: u32 = 1960;
const CODE_RATE_LIMIT: u32 = 1965;

/// Qualys report API client.
pub struct QualysClient {
    client: Client,
    config: ApiConfig,
    base_url: String,
    /// Quota observed on the most recent response.
    quota: RwLock<QuotaSnapshot>,
}

impl QualysClient {
    /// Create a new client.
    pub fn new(config: ApiConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("scanreports"));

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .default_headers(headers);

        if let Some(ref proxy_url) = config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| RemoteError::Transport(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let base_url = normalize_base_url(&config.base_url);

        Ok(Self {
            client,
            config,
            base_url,
            quota: RwLock::new(QuotaSnapshot::default()),
        })
    }

    /// Record the quota headers of a response, keeping the previous value if absent.
    fn observe_quota(&self, headers: &HeaderMap) {
        let snapshot = quota_from_headers(headers);
        if snapshot.remaining.is_none() {
            return;
        }
        match self.quota.write() {
            Ok(mut quota) => *quota = snapshot,
            Err(_) => warn!("Quota lock poisoned, dropping observed quota"),
        }
    }

    /// POST form parameters to the report endpoint, retrying transport failures.
    async fn post(&self, params: &[(&str, &str)]) -> Result<reqwest::Response, RemoteError> {
        let url = format!("{}{}", self.base_url, REPORT_ENDPOINT);
        let mut attempt: u32 = 0;

        loop {
            let result = self
                .client
                .post(&url)
                .basic_auth(&self.config.username, Some(&self.config.password))
                .form(params)
                .send()
                .await;

            match result {
                Ok(response) => {
                    self.observe_quota(response.headers());

                    if response.status() == StatusCode::UNAUTHORIZED {
                        return Err(RemoteError::Authentication(
                            "Invalid credentials or session expired".to_string(),
                        ));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(RemoteError::Transport(format!(
                            "request failed after {} attempts: {}",
                            attempt + 1,
                            e
                        )));
                    }
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        "Report API request failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// POST and return the XML body, mapping API error responses.
    async fn post_xml(&self, params: &[(&str, &str)]) -> Result<String, RemoteError> {
        let response = self.post(params).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if let Some(err) = api_error(&body) {
            return Err(err);
        }

        if !status.is_success() {
            return Err(RemoteError::Api {
                code: status.as_u16() as u32,
                message: format!("HTTP {}", status),
            });
        }

        Ok(body)
    }

    async fn launch(&self, params: &[(&str, &str)]) -> Result<String, RemoteError> {
        let body = self.post_xml(params).await?;
        extract_report_id(&body)
            .ok_or_else(|| RemoteError::Parse("launch response carried no report id".to_string()))
    }

    async fn list_reports(&self, params: &[(&str, &str)]) -> Result<Vec<ReportEntry>, RemoteError> {
        let body = self.post_xml(params).await?;
        Ok(parse_report_list(&body))
    }
}

#[async_trait]
impl RemoteReportService for QualysClient {
    fn name(&self) -> &str {
        "qualys"
    }

    async fn create_scan_report(
        &self,
        source_ref: &str,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError> {
        debug!(scan_ref = source_ref, template_id, "Launching scan report");
        self.launch(&[
            ("action", "launch"),
            ("report_type", "Scan"),
            ("template_id", template_id),
            ("output_format", output_format),
            ("report_refs", source_ref),
            ("report_title", title),
        ])
        .await
    }

    async fn create_host_report(
        &self,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError> {
        debug!(template_id, "Launching host report");
        self.launch(&[
            ("action", "launch"),
            ("template_id", template_id),
            ("output_format", output_format),
            ("report_title", title),
        ])
        .await
    }

    async fn check_status(&self, report_id: &str) -> Result<RemoteReportState, RemoteError> {
        let reports = self
            .list_reports(&[("action", "list"), ("id", report_id)])
            .await?;

        let report = reports
            .into_iter()
            .find(|r| r.id == report_id)
            .ok_or_else(|| RemoteError::NotFound(report_id.to_string()))?;

        report
            .state
            .as_deref()
            .map(RemoteReportState::from_api)
            .ok_or_else(|| RemoteError::Parse(format!("report {} has no state", report_id)))
    }

    async fn download(
        &self,
        report_id: &str,
        destination: &Path,
    ) -> Result<PathBuf, RemoteError> {
        let reports = self
            .list_reports(&[("action", "list"), ("id", report_id)])
            .await?;
        let report = reports
            .into_iter()
            .find(|r| r.id == report_id)
            .ok_or_else(|| RemoteError::NotFound(report_id.to_string()))?;

        let filename = report_filename(
            report_id,
            report.title.as_deref(),
            report.output_format.as_deref(),
        );

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        let path = destination.join(filename);

        let response = self.post(&[("action", "fetch"), ("id", report_id)]).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if looks_like_xml(&bytes) {
            if let Some(err) = api_error(&String::from_utf8_lossy(&bytes)) {
                return Err(err);
            }
        }
        if !status.is_success() {
            return Err(RemoteError::Api {
                code: status.as_u16() as u32,
                message: format!("HTTP {}", status),
            });
        }

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;

        debug!(report_id, path = %path.display(), bytes = bytes.len(), "Report saved");
        Ok(path)
    }

    async fn count_running_jobs(&self) -> Result<usize, RemoteError> {
        let reports = self
            .list_reports(&[("action", "list"), ("state", "Running")])
            .await?;
        Ok(reports.iter().filter(|r| r.is_running()).count())
    }

    async fn list_running_reports(&self, limit: usize) -> Result<Vec<RunningReport>, RemoteError> {
        let reports = self
            .list_reports(&[("action", "list"), ("state", "Running")])
            .await?;
        Ok(reports
            .into_iter()
            .filter(|r| r.is_running())
            .take(limit)
            .map(|r| RunningReport {
                title: r.title.unwrap_or_default(),
                id: r.id,
            })
            .collect())
    }

    fn last_observed_quota(&self) -> QuotaSnapshot {
        self.quota.read().map(|q| *q).unwrap_or_default()
    }
}

/// A report entry parsed from a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportEntry {
    id: String,
    title: Option<String>,
    output_format: Option<String>,
    state: Option<String>,
}

impl ReportEntry {
    fn is_running(&self) -> bool {
        self.state
            .as_deref()
            .map(|s| RemoteReportState::from_api(s) == RemoteReportState::Running)
            .unwrap_or(true)
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn quota_from_headers(headers: &HeaderMap) -> QuotaSnapshot {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    QuotaSnapshot {
        remaining: header_u64(HEADER_RATE_REMAINING).map(|v| v.min(u32::MAX as u64) as u32),
        reset_at: header_u64(HEADER_RATE_TO_WAIT)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
    }
}

/// Text of the first `<tag>` element, with CDATA unwrapped.
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(
        r"(?s)<{tag}>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</{tag}>",
        tag = tag
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Map a `SIMPLE_RETURN` error body onto a remote error.
fn api_error(body: &str) -> Option<RemoteError> {
    let code: u32 = element_text(body, "CODE")?.parse().ok()?;
    let message = element_text(body, "TEXT").unwrap_or_default();

    Some(match code {
        CODE_RATE_LIMIT => RemoteError::RateLimited {
            retry_after_secs: retry_after_secs(&message),
            message,
        },
        CODE_CONCURRENCY_LIMIT => RemoteError::ConcurrencyLimited(message),
        CODE_BAD_LOGIN => RemoteError::Authentication(message),
        code => RemoteError::Api { code, message },
    })
}

fn retry_after_secs(message: &str) -> Option<u64> {
    let re = Regex::new(r"(\d+)\s+seconds?").ok()?;
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

/// Report id from a launch response (the last `ITEM/VALUE`).
fn extract_report_id(xml: &str) -> Option<String> {
    let re = Regex::new(r"(?s)<ITEM>.*?<VALUE>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</VALUE>").ok()?;
    re.captures_iter(xml)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|v| !v.is_empty())
        .last()
}

fn parse_report_list(xml: &str) -> Vec<ReportEntry> {
    let Ok(re) = Regex::new(r"(?s)<REPORT>(.*?)</REPORT>") else {
        return Vec::new();
    };

    re.captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .filter_map(|block| {
            let block = block.as_str();
            Some(ReportEntry {
                id: element_text(block, "ID")?,
                title: element_text(block, "TITLE"),
                output_format: element_text(block, "OUTPUT_FORMAT"),
                state: element_text(block, "STATE"),
            })
        })
        .collect()
}

/// Filesystem-safe file name for a downloaded report.
fn report_filename(report_id: &str, title: Option<&str>, output_format: Option<&str>) -> String {
    let safe_title: String = title
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_");

    // The id keeps reports sharing a title from overwriting each other
    let stem = if safe_title.is_empty() {
        format!("report_{}", report_id)
    } else {
        format!("{}_{}", safe_title, report_id)
    };

    let extension = output_format
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "bin".to_string());

    format!("{}.{}", stem, extension)
}

fn looks_like_xml(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(64)];
    String::from_utf8_lossy(head).trim_start().starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAUNCH_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<SIMPLE_RETURN>
  <RESPONSE>
    <DATETIME>2024-05-02T10:00:00Z</DATETIME>
    <TEXT>New report launched</TEXT>
    <ITEM_LIST>
      <ITEM>
        <KEY>ID</KEY>
        <VALUE>8812345</VALUE>
      </ITEM>
    </ITEM_LIST>
  </RESPONSE>
</SIMPLE_RETURN>"#;

    const LIST_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<REPORT_LIST_OUTPUT>
  <RESPONSE>
    <REPORT_LIST>
      <REPORT>
        <ID>100</ID>
        <TITLE><![CDATA[Weekly Scan: DMZ]]></TITLE>
        <OUTPUT_FORMAT>PDF</OUTPUT_FORMAT>
        <STATUS>
          <STATE>Finished</STATE>
        </STATUS>
      </REPORT>
      <REPORT>
        <ID>101</ID>
        <TITLE><![CDATA[Internal hosts]]></TITLE>
        <OUTPUT_FORMAT>CSV</OUTPUT_FORMAT>
        <STATUS>
          <STATE>Running</STATE>
          <PERCENT>40</PERCENT>
        </STATUS>
      </REPORT>
    </REPORT_LIST>
  </RESPONSE>
</REPORT_LIST_OUTPUT>"#;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("qualysapi.qualys.eu"),
            "https://qualysapi.qualys.eu"
        );
        assert_eq!(
            normalize_base_url("https://qualysapi.qualys.eu/"),
            "https://qualysapi.qualys.eu"
        );
        assert_eq!(normalize_base_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_extract_report_id() {
        assert_eq!(extract_report_id(LAUNCH_RESPONSE), Some("8812345".to_string()));
        assert_eq!(extract_report_id("<SIMPLE_RETURN></SIMPLE_RETURN>"), None);
    }

    #[test]
    fn test_parse_report_list() {
        let reports = parse_report_list(LIST_RESPONSE);
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].id, "100");
        assert_eq!(reports[0].title.as_deref(), Some("Weekly Scan: DMZ"));
        assert_eq!(reports[0].output_format.as_deref(), Some("PDF"));
        assert_eq!(reports[0].state.as_deref(), Some("Finished"));
        assert!(!reports[0].is_running());

        assert_eq!(reports[1].id, "101");
        assert!(reports[1].is_running());
    }

    #[test]
    fn test_api_error_rate_limit() {
        let body = r#"<SIMPLE_RETURN><RESPONSE>
            <CODE>1965</CODE>
            <TEXT>This API cannot be run again for another 23 seconds.</TEXT>
        </RESPONSE></SIMPLE_RETURN>"#;

        match api_error(body) {
            Some(RemoteError::RateLimited {
                retry_after_secs, ..
            }) => assert_eq!(retry_after_secs, Some(23)),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_api_error_codes() {
        let concurrency = "<RESPONSE><CODE>1960</CODE><TEXT>Too many running</TEXT></RESPONSE>";
        assert!(matches!(
            api_error(concurrency),
            Some(RemoteError::ConcurrencyLimited(_))
        ));

        let login = "<RESPONSE><CODE>2000</CODE><TEXT>Bad Login/Password</TEXT></RESPONSE>";
        assert!(matches!(
            api_error(login),
            Some(RemoteError::Authentication(_))
        ));

        let other = "<RESPONSE><CODE>999</CODE><TEXT>Internal error</TEXT></RESPONSE>";
        assert!(matches!(
            api_error(other),
            Some(RemoteError::Api { code: 999, .. })
        ));

        assert!(api_error(LAUNCH_RESPONSE).is_none());
    }

    #[test]
    fn test_quota_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("42"));
        headers.insert("X-RateLimit-ToWait-Sec", HeaderValue::from_static("120"));

        let quota = quota_from_headers(&headers);
        assert_eq!(quota.remaining, Some(42));
        let reset_at = quota.reset_at.unwrap();
        assert!(reset_at > Utc::now() + chrono::Duration::seconds(100));
    }

    #[test]
    fn test_quota_from_headers_missing() {
        let quota = quota_from_headers(&HeaderMap::new());
        assert_eq!(quota, QuotaSnapshot::default());
    }

    #[test]
    fn test_report_filename() {
        assert_eq!(
            report_filename("100", Some("Weekly Scan: DMZ"), Some("PDF")),
            "Weekly_Scan_DMZ_100.pdf"
        );
        assert_eq!(report_filename("101", None, None), "report_101.bin");
        assert_eq!(report_filename("102", Some("///"), Some("csv")), "report_102.csv");
    }

    #[test]
    fn test_report_filename_distinct_for_shared_title() {
        let first = report_filename("100", Some("DMZ weekly"), Some("PDF"));
        let second = report_filename("101", Some("DMZ weekly"), Some("PDF"));
        assert_eq!(first, "DMZ_weekly_100.pdf");
        assert_ne!(first, second);
    }

    #[test]
    fn test_looks_like_xml() {
        assert!(looks_like_xml(b"  <?xml version=\"1.0\"?>"));
        assert!(!looks_like_xml(b"%PDF-1.7"));
    }

    #[test]
    fn test_client_starts_with_unknown_quota() {
        let client = QualysClient::new(ApiConfig {
            base_url: "qualysapi.example.com".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            proxy_url: None,
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap();

        assert_eq!(client.name(), "qualys");
        assert!(client.last_observed_quota().remaining.is_none());
    }
}
