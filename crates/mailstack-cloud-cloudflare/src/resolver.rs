//! DNS-over-HTTPS resolver
//!
//! `verify` checks what the world sees, not what a zone API says, so it
//! queries a public resolver's JSON endpoint (Cloudflare's by default).

use crate::error::{CloudflareError, Result};
use async_trait::async_trait;
use mailstack_cloud::dns::RecordType;
use mailstack_cloud::provider::DnsResolver;
use serde::Deserialize;

pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

const NXDOMAIN: u32 = 3;

pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Raw values published at `name`
    pub async fn query(&self, name: &str, record_type: RecordType) -> Result<Vec<String>> {
        let type_name = record_type.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("accept", "application/dns-json")
            .query(&[("name", name), ("type", type_name.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let answer: DohResponse = serde_json::from_str(&response.text().await?)?;

        match answer.status {
            0 => {}
            NXDOMAIN => return Ok(Vec::new()),
            status => {
                return Err(CloudflareError::QueryFailed {
                    name: name.to_string(),
                    status,
                });
            }
        }

        let code = type_code(record_type);
        let values: Vec<String> = answer
            .answer
            .into_iter()
            .filter(|a| a.record_type == code)
            .map(|a| normalize(&a.data))
            .collect();
        tracing::debug!("{} {} -> {:?}", record_type, name, values);
        Ok(values)
    }
}

impl Default for DohResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DOH_ENDPOINT)
    }
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn resolve(&self, name: &str, record_type: RecordType) -> mailstack_cloud::Result<Vec<String>> {
        Ok(self.query(name, record_type).await?)
    }
}

fn type_code(record_type: RecordType) -> u16 {
    match record_type {
        RecordType::Cname => 5,
        RecordType::Mx => 15,
        RecordType::Txt => 16,
    }
}

/// Strip quoting and the root dot; long TXT values arrive as `"a" "b"`
fn normalize(data: &str) -> String {
    let data = data.trim();
    let joined = if data.starts_with('"') {
        data.split("\" \"").collect::<String>()
    } else {
        data.to_string()
    };
    joined.trim_matches('"').trim_end_matches('.').to_string()
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}
