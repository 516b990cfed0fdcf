//! Route 53 zone control
//!
//! All records for a domain are written in one change batch of UPSERTs, so
//! a re-run converges instead of failing on existing records.

use crate::context::AwsContext;
use crate::error::{build_error, sdk_error};
use async_trait::async_trait;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use mailstack_cloud::dns::{DnsRecord, RecordType};
use mailstack_cloud::provider::ZoneProvider;
use mailstack_cloud::{DnsZoneApi, Result, StackError};

const RECORD_TTL: i64 = 300;

pub struct Route53Zones {
    client: aws_sdk_route53::Client,
}

/// A hosted zone as listed by Route 53
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostedZone {
    id: String,
    name: String,
    private: bool,
}

impl Route53Zones {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.route53_client(),
        }
    }

    async fn hosted_zones(&self) -> Result<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .client
                .list_hosted_zones()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("route53", "route53:ListHostedZones", e))?;

            zones.extend(page.hosted_zones().iter().map(|z| HostedZone {
                id: z.id().trim_start_matches("/hostedzone/").to_string(),
                name: z.name().trim_end_matches('.').to_ascii_lowercase(),
                private: z.config().is_some_and(|c| c.private_zone()),
            }));

            match page.next_marker() {
                Some(next) if page.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(zones)
    }
}

/// Most specific public zone containing `domain`
fn best_zone<'a>(zones: &'a [HostedZone], domain: &str) -> Option<&'a HostedZone> {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    zones
        .iter()
        .filter(|z| !z.private)
        .filter(|z| domain == z.name || domain.ends_with(&format!(".{}", z.name)))
        .max_by_key(|z| z.name.len())
}

/// Route 53 wants TXT values quoted and split into 255-byte strings
fn record_value(record: &DnsRecord) -> String {
    match record.record_type {
        RecordType::Txt => {
            let value = record.value.trim_matches('"');
            let chunks: Vec<String> = value
                .as_bytes()
                .chunks(255)
                .map(|c| format!("\"{}\"", String::from_utf8_lossy(c)))
                .collect();
            chunks.join(" ")
        }
        RecordType::Cname | RecordType::Mx => record.value.clone(),
    }
}

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::Cname => RrType::Cname,
        RecordType::Txt => RrType::Txt,
        RecordType::Mx => RrType::Mx,
    }
}

/// One record set per (name, type), in input order
fn record_sets(records: &[DnsRecord]) -> Vec<(String, RecordType, Vec<String>)> {
    let mut sets: Vec<(String, RecordType, Vec<String>)> = Vec::new();
    for record in records {
        let name = record.name.trim_end_matches('.').to_ascii_lowercase();
        let value = record_value(record);
        match sets
            .iter_mut()
            .find(|(n, t, _)| *n == name && *t == record.record_type)
        {
            Some((_, _, values)) if values.contains(&value) => {}
            Some((_, _, values)) => values.push(value),
            None => sets.push((name, record.record_type, vec![value])),
        }
    }
    sets
}

#[async_trait]
impl DnsZoneApi for Route53Zones {
    fn provider(&self) -> ZoneProvider {
        ZoneProvider::Route53
    }

    async fn zone_for(&self, domain: &str) -> Result<Option<String>> {
        let zones = match self.hosted_zones().await {
            Ok(zones) => zones,
            // DNS is then published by hand, which verify already supports
            Err(StackError::Authorization { message, .. }) => {
                tracing::warn!("Cannot list Route 53 zones: {}", message);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(best_zone(&zones, domain).map(|z| z.id.clone()))
    }

    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut changes = Vec::new();
        for (name, record_type, values) in record_sets(records) {
            let mut set = ResourceRecordSet::builder()
                .name(name)
                .r#type(rr_type(record_type))
                .ttl(RECORD_TTL);
            for value in values {
                set = set.resource_records(
                    ResourceRecord::builder()
                        .value(value)
                        .build()
                        .map_err(|e| build_error("route53", e))?,
                );
            }
            changes.push(
                Change::builder()
                    .action(ChangeAction::Upsert)
                    .resource_record_set(set.build().map_err(|e| build_error("route53", e))?)
                    .build()
                    .map_err(|e| build_error("route53", e))?,
            );
        }

        tracing::info!("Upserting {} record sets in zone {}", changes.len(), zone_id);
        let batch = ChangeBatch::builder()
            .comment("mailstack")
            .set_changes(Some(changes))
            .build()
            .map_err(|e| build_error("route53", e))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| sdk_error("route53", "route53:ChangeResourceRecordSets", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailstack_cloud::dns::RecordGroup;

    fn zone(id: &str, name: &str, private: bool) -> HostedZone {
        HostedZone {
            id: id.to_string(),
            name: name.to_string(),
            private,
        }
    }

    fn record(name: &str, record_type: RecordType, value: &str) -> DnsRecord {
        DnsRecord {
            name: name.to_string(),
            record_type,
            value: value.to_string(),
            group: RecordGroup::Dkim,
        }
    }

    #[test]
    fn test_best_zone_prefers_most_specific_public_zone() {
        let zones = vec![
            zone("Z1", "example.com", false),
            zone("Z2", "mail.example.com", false),
            zone("Z3", "track.mail.example.com", true),
        ];
        assert_eq!(best_zone(&zones, "track.mail.example.com.").unwrap().id, "Z2");
        assert_eq!(best_zone(&zones, "Example.com").unwrap().id, "Z1");
        assert!(best_zone(&zones, "badexample.com").is_none());
    }

    #[test]
    fn test_txt_values_are_quoted_and_chunked() {
        let spf = record("example.com", RecordType::Txt, "v=spf1 include:amazonses.com ~all");
        assert_eq!(record_value(&spf), "\"v=spf1 include:amazonses.com ~all\"");

        let long = record("example.com", RecordType::Txt, &"a".repeat(300));
        let value = record_value(&long);
        assert_eq!(value, format!("\"{}\" \"{}\"", "a".repeat(255), "a".repeat(45)));
    }

    #[test]
    fn test_record_sets_merge_same_name_and_type() {
        let records = vec![
            record("a._domainkey.example.com", RecordType::Cname, "a.dkim.amazonses.com"),
            record("mail.example.com", RecordType::Mx, "10 feedback-smtp.us-east-1.amazonses.com"),
            record("mail.example.com", RecordType::Txt, "v=spf1 include:amazonses.com ~all"),
            record("mail.example.com", RecordType::Txt, "v=spf1 include:amazonses.com ~all"),
        ];
        let sets = record_sets(&records);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[2].0, "mail.example.com");
        assert_eq!(sets[2].1, RecordType::Txt);
        assert_eq!(sets[2].2.len(), 1);
    }
}
