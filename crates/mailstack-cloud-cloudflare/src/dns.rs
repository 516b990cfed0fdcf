//! Cloudflare DNS API client
//!
//! Zone control for domains delegated to Cloudflare, using Bearer token
//! authentication. Records are upserted one at a time; Cloudflare has no
//! batched change set like Route 53.

use crate::error::{CloudflareError, Result};
use async_trait::async_trait;
use mailstack_cloud::dns::{DnsRecord, RecordType};
use mailstack_cloud::provider::{DnsZoneApi, ZoneProvider};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";
const ZONE_ENV: &str = "CLOUDFLARE_ZONE_ID";

/// Configuration for DNS manager
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub api_token: String,
    pub zone_id: String,
}

impl DnsConfig {
    /// Create DnsConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var(TOKEN_ENV)
            .map_err(|_| CloudflareError::MissingEnvVar(TOKEN_ENV.to_string()))?;
        let zone_id = std::env::var(ZONE_ENV)
            .map_err(|_| CloudflareError::MissingEnvVar(ZONE_ENV.to_string()))?;

        Ok(Self { api_token, zone_id })
    }

    /// Like [`DnsConfig::from_env`], but `None` when Cloudflare is not configured
    pub fn from_env_opt() -> Option<Self> {
        Self::from_env()
            .ok()
            .filter(|c| !c.api_token.is_empty() && !c.zone_id.is_empty())
    }
}

/// Cloudflare DNS manager for one zone
pub struct CloudflareDns {
    client: reqwest::Client,
    api_base: String,
    api_token: String,
    zone_id: String,
    zone_name: OnceCell<String>,
}

impl CloudflareDns {
    /// Create a new DNS manager
    pub fn new(config: DnsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
            api_token: config.api_token,
            zone_id: config.zone_id,
            zone_name: OnceCell::new(),
        }
    }

    /// Point the client at another API endpoint
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Apex name of the configured zone, fetched once
    pub async fn zone_name(&self) -> Result<&str> {
        let name = self
            .zone_name
            .get_or_try_init(|| async {
                let url = format!("{}/zones/{}", self.api_base, self.zone_id);
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.api_token)
                    .send()
                    .await?;
                let zone: ApiZone = unwrap_response(response.json().await?)?;
                tracing::debug!("Cloudflare zone {} is {}", self.zone_id, zone.name);
                Ok::<_, CloudflareError>(zone.name)
            })
            .await?;
        Ok(name.as_str())
    }

    /// Records of one type and name
    async fn find_records(&self, record_type: RecordType, name: &str) -> Result<Vec<ApiDnsRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, self.zone_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[("type", record_type.to_string()), ("name", name.to_string())])
            .send()
            .await?;

        unwrap_response(response.json().await?)
    }

    async fn create_record(&self, record: &DnsRecord) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, self.zone_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&RecordRequest::from(record))
            .send()
            .await?;

        let _: ApiDnsRecord = unwrap_response(response.json().await?)?;
        Ok(())
    }

    async fn update_record(&self, record_id: &str, record: &DnsRecord) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, self.zone_id, record_id
        );
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&RecordRequest::from(record))
            .send()
            .await?;

        let _: ApiDnsRecord = unwrap_response(response.json().await?)?;
        Ok(())
    }

    /// Ensure `record` exists with the expected content (create or update)
    pub async fn ensure_record(&self, record: &DnsRecord) -> Result<()> {
        let existing = self.find_records(record.record_type, &record.name).await?;
        let request = RecordRequest::from(record);

        // a name can carry several TXT records; only replace the one we own
        let current = match record.record_type {
            RecordType::Txt => {
                let tag = txt_tag(&record.value);
                existing
                    .into_iter()
                    .find(|r| txt_tag(&r.content).eq_ignore_ascii_case(tag))
            }
            _ => existing.into_iter().next(),
        };

        match current {
            Some(current) if current.matches(&request) => {
                tracing::debug!("DNS record already up to date: {}", record);
                Ok(())
            }
            Some(current) => {
                tracing::info!(
                    "Updating DNS record {} {} from {} to {}",
                    record.record_type,
                    record.name,
                    current.content,
                    request.content
                );
                self.update_record(&current.id, record).await
            }
            None => {
                tracing::info!("Creating DNS record: {}", record);
                self.create_record(record).await
            }
        }
    }
}

#[async_trait]
impl DnsZoneApi for CloudflareDns {
    fn provider(&self) -> ZoneProvider {
        ZoneProvider::Cloudflare
    }

    async fn zone_for(&self, domain: &str) -> mailstack_cloud::Result<Option<String>> {
        let zone = self.zone_name().await?;
        let domain = domain.trim_end_matches('.');
        let inside = domain.eq_ignore_ascii_case(zone)
            || domain
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", zone.to_ascii_lowercase()));
        Ok(inside.then(|| self.zone_id.clone()))
    }

    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> mailstack_cloud::Result<()> {
        if zone_id != self.zone_id {
            return Err(mailstack_cloud::StackError::InvalidConfig(format!(
                "Cloudflare is configured for zone {}, not {}",
                self.zone_id, zone_id
            )));
        }
        for record in records {
            self.ensure_record(record).await?;
        }
        Ok(())
    }
}

/// Leading tag of a TXT value (`v=spf1`, `v=DMARC1`, ...)
fn txt_tag(value: &str) -> &str {
    let value = value.trim().trim_matches('"');
    value
        .split([' ', ';'])
        .next()
        .filter(|tag| tag.starts_with("v="))
        .unwrap_or(value)
}

fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T> {
    if !response.success {
        let error_msg = response
            .errors
            .first()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(CloudflareError::ApiError(error_msg));
    }
    response
        .result
        .ok_or_else(|| CloudflareError::ApiError("response has no result".to_string()))
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiDnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    priority: Option<u16>,
}

impl ApiDnsRecord {
    fn matches(&self, request: &RecordRequest) -> bool {
        let normalize = |v: &str| v.trim().trim_matches('"').trim_end_matches('.').to_ascii_lowercase();
        normalize(&self.content) == normalize(&request.content)
            && (request.priority.is_none() || self.priority == request.priority)
    }
}

#[derive(Debug, Serialize)]
struct RecordRequest {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

impl From<&DnsRecord> for RecordRequest {
    fn from(record: &DnsRecord) -> Self {
        let (content, priority) = match record.mx_parts() {
            Some((priority, host)) => (host.to_string(), Some(priority)),
            None => (record.value.clone(), None),
        };
        Self {
            record_type: record.record_type.to_string(),
            name: record.name.clone(),
            content,
            ttl: 1, // Auto
            priority,
            // tracking and validation CNAMEs must resolve to AWS, not Cloudflare
            proxied: (record.record_type == RecordType::Cname).then_some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailstack_cloud::dns::RecordGroup;
    use mockito::Matcher;

    fn dns(server: &mockito::Server) -> CloudflareDns {
        CloudflareDns::new(DnsConfig {
            api_token: "test-token".to_string(),
            zone_id: "z1".to_string(),
        })
        .with_api_base(server.url())
    }

    fn record(name: &str, record_type: RecordType, value: &str) -> DnsRecord {
        DnsRecord {
            name: name.to_string(),
            record_type,
            value: value.to_string(),
            group: RecordGroup::Spf,
        }
    }

    #[test]
    fn test_txt_tag() {
        assert_eq!(txt_tag("\"v=spf1 include:amazonses.com ~all\""), "v=spf1");
        assert_eq!(txt_tag("v=DMARC1; p=quarantine"), "v=DMARC1");
        assert_eq!(txt_tag("google-site-verification=abc"), "google-site-verification=abc");
    }

    #[test]
    fn test_mx_request_splits_priority() {
        let request = RecordRequest::from(&record(
            "mail.example.com",
            RecordType::Mx,
            "10 feedback-smtp.us-east-1.amazonses.com",
        ));
        assert_eq!(request.content, "feedback-smtp.us-east-1.amazonses.com");
        assert_eq!(request.priority, Some(10));
        assert_eq!(request.proxied, None);
    }

    #[tokio::test]
    async fn test_zone_for_matches_subdomains() {
        let mut server = mockito::Server::new_async().await;
        let _zone = server
            .mock("GET", "/zones/z1")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"errors":[],"result":{"id":"z1","name":"example.com"}}"#)
            .expect(1)
            .create_async()
            .await;

        let dns = dns(&server);
        assert_eq!(dns.zone_for("track.example.com").await.unwrap(), Some("z1".into()));
        assert_eq!(dns.zone_for("example.com").await.unwrap(), Some("z1".into()));
        assert_eq!(dns.zone_for("notexample.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_creates_missing_and_updates_stale() {
        let mut server = mockito::Server::new_async().await;
        let _find_cname = server
            .mock("GET", Matcher::Regex("^/zones/z1/dns_records".into()))
            .match_query(Matcher::UrlEncoded("type".into(), "CNAME".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"errors":[],"result":[]}"#)
            .create_async()
            .await;
        let _find_txt = server
            .mock("GET", Matcher::Regex("^/zones/z1/dns_records".into()))
            .match_query(Matcher::UrlEncoded("type".into(), "TXT".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success":true,"errors":[],"result":[
                    {"id":"other","content":"google-site-verification=abc"},
                    {"id":"spf","content":"\"v=spf1 include:_spf.google.com ~all\""}
                ]}"#,
            )
            .create_async()
            .await;
        let create = server
            .mock("POST", "/zones/z1/dns_records")
            .match_body(Matcher::PartialJsonString(
                r#"{"type":"CNAME","name":"track.example.com","proxied":false}"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"errors":[],"result":{"id":"new","content":"r.us-east-1.awstrack.me"}}"#)
            .expect(1)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/zones/z1/dns_records/spf")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"errors":[],"result":{"id":"spf","content":"v=spf1 include:amazonses.com ~all"}}"#)
            .expect(1)
            .create_async()
            .await;

        let records = vec![
            record("track.example.com", RecordType::Cname, "r.us-east-1.awstrack.me"),
            record("example.com", RecordType::Txt, "v=spf1 include:amazonses.com ~all"),
        ];
        dns(&server).upsert_records("z1", &records).await.unwrap();

        create.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _find = server
            .mock("GET", Matcher::Regex("^/zones/z1/dns_records".into()))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}],"result":null}"#)
            .create_async()
            .await;

        let err = dns(&server)
            .upsert_records("z1", &[record("example.com", RecordType::Txt, "v=spf1 ~all")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "API_ERROR");
        assert!(err.to_string().contains("Invalid access token"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_foreign_zone() {
        let server = mockito::Server::new_async().await;
        let err = dns(&server).upsert_records("z2", &[]).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }
}
