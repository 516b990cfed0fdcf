//! DNS reconciler
//!
//! Computes the records a sending domain needs, publishes them when a
//! writable zone is available, and checks what is actually resolvable.

use crate::error::Result;
use crate::provider::{DkimStatus, DnsResolver, IdentityApi, IdentityStatus, ZoneControl};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SPF_VALUE: &str = "v=spf1 include:amazonses.com ~all";
const SPF_INCLUDE: &str = "include:amazonses.com";
const DKIM_TARGET_SUFFIX: &str = "dkim.amazonses.com";
const MAIL_FROM_PRIORITY: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    Cname,
    Txt,
    Mx,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Cname => write!(f, "CNAME"),
            RecordType::Txt => write!(f, "TXT"),
            RecordType::Mx => write!(f, "MX"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordGroup {
    Dkim,
    Spf,
    Dmarc,
    Tracking,
    MailFrom,
    CertificateValidation,
}

impl fmt::Display for RecordGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordGroup::Dkim => "dkim",
            RecordGroup::Spf => "spf",
            RecordGroup::Dmarc => "dmarc",
            RecordGroup::Tracking => "tracking",
            RecordGroup::MailFrom => "mailFrom",
            RecordGroup::CertificateValidation => "certificateValidation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub value: String,
    pub group: RecordGroup,
}

impl DnsRecord {
    fn new(
        name: impl Into<String>,
        record_type: RecordType,
        value: impl Into<String>,
        group: RecordGroup,
    ) -> Self {
        Self {
            name: name.into(),
            record_type,
            value: value.into(),
            group,
        }
    }

    /// Split an MX value into priority and exchange
    pub fn mx_parts(&self) -> Option<(u16, &str)> {
        if self.record_type != RecordType::Mx {
            return None;
        }
        let (priority, host) = self.value.split_once(' ')?;
        Some((priority.parse().ok()?, host.trim()))
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.record_type, self.value)
    }
}

/// What a domain needs published
#[derive(Debug, Clone, Default)]
pub struct RecordInputs {
    pub domain: String,
    pub region: String,
    pub dkim_tokens: Vec<String>,
    pub tracking_domain: Option<String>,
    /// Edge distribution fronting the tracking domain, when built
    pub distribution_domain: Option<String>,
    pub mail_from_domain: Option<String>,
}

/// Expand a MAIL FROM label into a full domain under `domain`
pub fn mail_from_domain(label_or_domain: &str, domain: &str) -> String {
    let label = label_or_domain.trim_end_matches('.');
    if label == domain || label.ends_with(&format!(".{}", domain)) {
        label.to_string()
    } else {
        format!("{}.{}", label, domain)
    }
}

/// Default tracking redirector for a region
pub fn tracking_redirector(region: &str) -> String {
    format!("r.{}.awstrack.me", region)
}

/// Every record the domain needs, in a stable order
pub fn required_records(inputs: &RecordInputs) -> Vec<DnsRecord> {
    let domain = inputs.domain.as_str();
    let mut records: Vec<DnsRecord> = inputs
        .dkim_tokens
        .iter()
        .map(|token| {
            DnsRecord::new(
                format!("{}._domainkey.{}", token, domain),
                RecordType::Cname,
                format!("{}.{}", token, DKIM_TARGET_SUFFIX),
                RecordGroup::Dkim,
            )
        })
        .collect();

    records.push(DnsRecord::new(
        domain,
        RecordType::Txt,
        SPF_VALUE,
        RecordGroup::Spf,
    ));
    records.push(DnsRecord::new(
        format!("_dmarc.{}", domain),
        RecordType::Txt,
        format!("v=DMARC1; p=quarantine; rua=mailto:postmaster@{}", domain),
        RecordGroup::Dmarc,
    ));

    if let Some(tracking) = &inputs.tracking_domain {
        let target = inputs
            .distribution_domain
            .clone()
            .unwrap_or_else(|| tracking_redirector(&inputs.region));
        records.push(DnsRecord::new(
            tracking.as_str(),
            RecordType::Cname,
            target,
            RecordGroup::Tracking,
        ));
    }

    if let Some(mail_from) = &inputs.mail_from_domain {
        records.push(DnsRecord::new(
            mail_from.as_str(),
            RecordType::Mx,
            format!(
                "{} feedback-smtp.{}.amazonses.com",
                MAIL_FROM_PRIORITY, inputs.region
            ),
            RecordGroup::MailFrom,
        ));
        records.push(DnsRecord::new(
            mail_from.as_str(),
            RecordType::Txt,
            SPF_VALUE,
            RecordGroup::MailFrom,
        ));
    }

    records
}

/// Result of publishing records
#[derive(Debug, Clone)]
pub enum DnsOutcome {
    /// Records were upserted into a controlled zone
    Applied {
        zone: String,
        records: Vec<DnsRecord>,
    },
    /// No writable zone; the operator must publish these
    Manual { records: Vec<DnsRecord> },
}

impl DnsOutcome {
    pub fn records(&self) -> &[DnsRecord] {
        match self {
            DnsOutcome::Applied { records, .. } | DnsOutcome::Manual { records } => records,
        }
    }
}

/// Publish `records` through `zone` as one batch, or hand them back
pub async fn reconcile(zone: Option<&ZoneControl>, records: Vec<DnsRecord>) -> Result<DnsOutcome> {
    let Some(zone) = zone else {
        tracing::debug!("No writable zone; {} records for manual entry", records.len());
        return Ok(DnsOutcome::Manual { records });
    };
    let label = format!("{} zone {}", zone.provider(), zone.zone_id);
    if !records.is_empty() {
        zone.api.upsert_records(&zone.zone_id, &records).await?;
        tracing::info!("Upserted {} records in {}", records.len(), label);
    }
    Ok(DnsOutcome::Applied {
        zone: label,
        records,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Verified,
    Incorrect,
    Missing,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Verified => write!(f, "verified"),
            RecordStatus::Incorrect => write!(f, "incorrect"),
            RecordStatus::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordCheck {
    pub record: DnsRecord,
    pub status: RecordStatus,
    pub found: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GroupCheck {
    pub group: RecordGroup,
    pub status: RecordStatus,
    pub records: Vec<RecordCheck>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Verified,
    Pending,
    Failed,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Verified => write!(f, "verified"),
            OverallStatus::Pending => write!(f, "pending"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub domain: String,
    pub identity: Option<IdentityStatus>,
    pub groups: Vec<GroupCheck>,
    pub overall: OverallStatus,
}

impl VerifyReport {
    pub fn group(&self, group: RecordGroup) -> Option<&GroupCheck> {
        self.groups.iter().find(|g| g.group == group)
    }
}

async fn resolve_all(resolver: &dyn DnsResolver, records: &[DnsRecord]) -> Vec<Vec<String>> {
    let lookups = records.iter().map(|record| async move {
        match resolver.resolve(&record.name, record.record_type).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Lookup of {} {} failed: {}", record.record_type, record.name, e);
                Vec::new()
            }
        }
    });
    join_all(lookups).await
}

/// Resolve every expected record and compare it with what is published
///
/// Read-only; lookups and the identity query run concurrently.
pub async fn verify(
    resolver: &dyn DnsResolver,
    identities: &dyn IdentityApi,
    mut inputs: RecordInputs,
) -> Result<VerifyReport> {
    let mut expected = required_records(&inputs);
    let (identity, mut results) = futures_util::join!(
        identities.identity_status(&inputs.domain),
        resolve_all(resolver, &expected)
    );
    let identity = identity?;

    // DKIM records are only known once the identity has answered
    if inputs.dkim_tokens.is_empty() {
        if let Some(identity) = &identity {
            inputs.dkim_tokens = identity.dkim_tokens.clone();
            let dkim: Vec<DnsRecord> = required_records(&inputs)
                .into_iter()
                .filter(|r| r.group == RecordGroup::Dkim)
                .collect();
            results.extend(resolve_all(resolver, &dkim).await);
            expected.extend(dkim);
        }
    }

    let checks: Vec<RecordCheck> = expected
        .into_iter()
        .zip(results)
        .map(|(record, found)| RecordCheck {
            status: check_record(&record, &found),
            record,
            found,
        })
        .collect();

    let mut groups = Vec::new();
    for group in [
        RecordGroup::Dkim,
        RecordGroup::Spf,
        RecordGroup::Dmarc,
        RecordGroup::Tracking,
        RecordGroup::MailFrom,
    ] {
        let records: Vec<RecordCheck> = checks
            .iter()
            .filter(|c| c.record.group == group)
            .cloned()
            .collect();
        if records.is_empty() {
            // an unregistered identity has no DKIM tokens to look for
            if group == RecordGroup::Dkim {
                groups.push(GroupCheck {
                    group,
                    status: RecordStatus::Missing,
                    records,
                });
            }
            continue;
        }
        groups.push(GroupCheck {
            group,
            status: group_status(&records),
            records,
        });
    }

    let overall = overall_status(&groups, identity.as_ref());
    Ok(VerifyReport {
        domain: inputs.domain,
        identity,
        groups,
        overall,
    })
}

fn normalize(value: &str) -> String {
    value
        .trim()
        .trim_matches('"')
        .trim_end_matches('.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn check_record(record: &DnsRecord, found: &[String]) -> RecordStatus {
    match (record.record_type, record.group) {
        (RecordType::Txt, RecordGroup::Spf | RecordGroup::MailFrom) => {
            let spf: Vec<String> = found
                .iter()
                .map(|v| normalize(v))
                .filter(|v| v.starts_with("v=spf1"))
                .collect();
            if spf.is_empty() {
                RecordStatus::Missing
            } else if spf.iter().any(|v| v.split(' ').any(|term| term == SPF_INCLUDE)) {
                RecordStatus::Verified
            } else {
                RecordStatus::Incorrect
            }
        }
        (RecordType::Txt, RecordGroup::Dmarc) => {
            if found.is_empty() {
                RecordStatus::Missing
            } else if found.iter().any(|v| normalize(v).starts_with("v=dmarc1")) {
                RecordStatus::Verified
            } else {
                RecordStatus::Incorrect
            }
        }
        _ => {
            if found.is_empty() {
                return RecordStatus::Missing;
            }
            let expected = normalize(&record.value);
            if found.iter().any(|v| normalize(v) == expected) {
                RecordStatus::Verified
            } else {
                RecordStatus::Incorrect
            }
        }
    }
}

fn group_status(records: &[RecordCheck]) -> RecordStatus {
    if records.iter().all(|r| r.status == RecordStatus::Verified) {
        RecordStatus::Verified
    } else if records.iter().all(|r| r.status == RecordStatus::Missing) {
        RecordStatus::Missing
    } else {
        RecordStatus::Incorrect
    }
}

fn overall_status(groups: &[GroupCheck], identity: Option<&IdentityStatus>) -> OverallStatus {
    let Some(identity) = identity else {
        return OverallStatus::Pending;
    };
    if identity.dkim_status == DkimStatus::Failed {
        return OverallStatus::Failed;
    }
    let records_ok = groups.iter().all(|g| g.status == RecordStatus::Verified);
    if records_ok && identity.verified && identity.dkim_status == DkimStatus::Success {
        OverallStatus::Verified
    } else {
        OverallStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> RecordInputs {
        RecordInputs {
            domain: "example.com".into(),
            region: "eu-west-1".into(),
            dkim_tokens: vec!["a1".into(), "b2".into(), "c3".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_required_records_base_set() {
        let records = required_records(&inputs());
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].name, "a1._domainkey.example.com");
        assert_eq!(records[0].value, "a1.dkim.amazonses.com");
        assert_eq!(records[3].value, SPF_VALUE);
        assert_eq!(records[4].name, "_dmarc.example.com");
        assert!(records[4].value.contains("p=quarantine"));
    }

    #[test]
    fn test_required_records_tracking_and_mail_from() {
        let mut with_edge = inputs();
        with_edge.tracking_domain = Some("track.example.com".into());
        with_edge.distribution_domain = Some("d111.cloudfront.net".into());
        with_edge.mail_from_domain = Some(mail_from_domain("mail", "example.com"));
        let records = required_records(&with_edge);

        let tracking: Vec<_> = records
            .iter()
            .filter(|r| r.group == RecordGroup::Tracking)
            .collect();
        assert_eq!(tracking[0].value, "d111.cloudfront.net");

        let mx = records
            .iter()
            .find(|r| r.record_type == RecordType::Mx)
            .unwrap();
        assert_eq!(mx.name, "mail.example.com");
        assert_eq!(
            mx.mx_parts(),
            Some((10, "feedback-smtp.eu-west-1.amazonses.com"))
        );

        let mut without_edge = inputs();
        without_edge.tracking_domain = Some("track.example.com".into());
        let records = required_records(&without_edge);
        assert_eq!(records.last().unwrap().value, "r.eu-west-1.awstrack.me");
    }

    #[test]
    fn test_mail_from_domain_expansion() {
        assert_eq!(mail_from_domain("mail", "example.com"), "mail.example.com");
        assert_eq!(
            mail_from_domain("bounce.example.com", "example.com"),
            "bounce.example.com"
        );
    }

    #[test]
    fn test_check_record_rules() {
        let spf = DnsRecord::new("example.com", RecordType::Txt, SPF_VALUE, RecordGroup::Spf);
        assert_eq!(check_record(&spf, &[]), RecordStatus::Missing);
        assert_eq!(
            check_record(&spf, &["google-site-verification=abc".into()]),
            RecordStatus::Missing
        );
        assert_eq!(
            check_record(
                &spf,
                &["\"v=spf1 include:_spf.google.com include:amazonses.com ~all\"".into()]
            ),
            RecordStatus::Verified
        );
        assert_eq!(
            check_record(&spf, &["v=spf1 -all".into()]),
            RecordStatus::Incorrect
        );

        let cname = DnsRecord::new(
            "a1._domainkey.example.com",
            RecordType::Cname,
            "a1.dkim.amazonses.com",
            RecordGroup::Dkim,
        );
        assert_eq!(
            check_record(&cname, &["A1.dkim.amazonses.com.".into()]),
            RecordStatus::Verified
        );
        assert_eq!(
            check_record(&cname, &["elsewhere.example.net".into()]),
            RecordStatus::Incorrect
        );
    }

    use crate::record::IdentityType;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Identity lookup that answers only once a DNS query has started
    struct GatedIdentities {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl IdentityApi for GatedIdentities {
        async fn list_identities(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn identity_status(&self, name: &str) -> Result<Option<IdentityStatus>> {
            self.gate.notified().await;
            Ok(Some(IdentityStatus {
                name: name.to_string(),
                identity_type: IdentityType::Domain,
                verified: true,
                dkim_status: DkimStatus::Success,
                dkim_tokens: vec!["t1".into()],
                config_set: None,
                mail_from_domain: None,
            }))
        }

        async fn set_configuration_set(
            &self,
            _identity: &str,
            _config_set: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }

        async fn set_mail_from(&self, _domain: &str, _mail_from: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    struct OpeningResolver {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl DnsResolver for OpeningResolver {
        async fn resolve(&self, name: &str, _record_type: RecordType) -> Result<Vec<String>> {
            self.gate.notify_one();
            match name {
                "t1._domainkey.example.com" => Ok(vec!["t1.dkim.amazonses.com".into()]),
                "example.com" => Ok(vec![SPF_VALUE.into()]),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_verify_runs_identity_query_alongside_lookups() {
        let gate = Arc::new(Notify::new());
        let identities = GatedIdentities { gate: gate.clone() };
        let resolver = OpeningResolver { gate };
        let inputs = RecordInputs {
            dkim_tokens: Vec::new(),
            ..inputs()
        };

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            verify(&resolver, &identities, inputs),
        )
        .await
        .expect("identity query did not overlap the DNS lookups")
        .unwrap();

        assert!(report.identity.is_some());
        assert_eq!(report.group(RecordGroup::Dkim).unwrap().status, RecordStatus::Verified);
        assert_eq!(report.group(RecordGroup::Spf).unwrap().status, RecordStatus::Verified);
        assert_eq!(report.group(RecordGroup::Dmarc).unwrap().status, RecordStatus::Missing);
    }
}
