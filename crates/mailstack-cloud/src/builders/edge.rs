use super::{GroupBuilder, names, nodes};
use crate::dns::tracking_redirector;
use crate::error::{Result, StackError};
use crate::graph::{ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, outputs, reference};
use crate::planner::{CertificateValidation, FeatureFlags, PlanContext};
use serde_json::{Value, json};

/// CloudFront only accepts certificates from this region
pub const CERTIFICATE_REGION: &str = "us-east-1";
/// Requests per client IP per evaluation window
pub const RATE_LIMIT: u32 = 2000;
pub const RATE_WINDOW_SECS: u32 = 300;

const ORIGIN_ID: &str = "tracking-redirector";

/// Custom HTTPS tracking domain: certificate, firewall and distribution
pub struct EdgeBuilder;

impl GroupBuilder for EdgeBuilder {
    fn group(&self) -> ResourceGroup {
        ResourceGroup::Edge
    }

    fn build(
        &self,
        ctx: &PlanContext,
        flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()> {
        let group = self.group();
        let tracking = flags.tracking_domain.as_deref().ok_or_else(|| {
            StackError::InvalidPlan("https tracking requires a tracking domain".to_string())
        })?;

        if let Some(existing) = &ctx.existing_distribution {
            tracing::info!(
                "Reusing distribution {} already serving {}",
                existing.id,
                tracking
            );
            graph.add_output(
                outputs::DISTRIBUTION_DOMAIN,
                group,
                json!(existing.domain_name),
            );
            return Ok(());
        }

        graph.add(ResourceNode::new(
            nodes::US_EAST_1,
            ResourceKind::RegionProvider,
            group,
            json!({ "region": CERTIFICATE_REGION }),
        ));
        graph.add(
            ResourceNode::new(
                nodes::CERTIFICATE,
                ResourceKind::Certificate,
                group,
                json!({
                    "domainName": tracking,
                    "validationMethod": "DNS",
                }),
            )
            .with_provider(nodes::US_EAST_1),
        );
        graph.add_output(
            outputs::CERTIFICATE_ARN,
            group,
            json!(reference(nodes::CERTIFICATE, "arn")),
        );
        graph.add_output(
            outputs::CERTIFICATE_VALIDATION,
            group,
            json!(reference(nodes::CERTIFICATE, "domainValidationOptions")),
        );

        let certificate_arn = match &ctx.validation {
            CertificateValidation::Automatic { zone_id } => {
                let option = |field: &str| {
                    reference(
                        nodes::CERTIFICATE,
                        &format!("domainValidationOptions[0].{}", field),
                    )
                };
                graph.add(ResourceNode::new(
                    nodes::VALIDATION_RECORD,
                    ResourceKind::DnsRecord,
                    group,
                    json!({
                        "zoneId": zone_id,
                        "name": option("resourceRecordName"),
                        "type": option("resourceRecordType"),
                        "records": [option("resourceRecordValue")],
                        "ttl": 60,
                        "allowOverwrite": true,
                    }),
                ));
                graph.add(
                    ResourceNode::new(
                        nodes::CERTIFICATE_VALIDATION,
                        ResourceKind::CertificateValidation,
                        group,
                        json!({
                            "certificateArn": reference(nodes::CERTIFICATE, "arn"),
                            "validationRecordFqdns": [reference(nodes::VALIDATION_RECORD, "fqdn")],
                        }),
                    )
                    .with_provider(nodes::US_EAST_1),
                );
                Some(reference(nodes::CERTIFICATE_VALIDATION, "certificateArn"))
            }
            // the distribution waits for an update once the records are published
            CertificateValidation::Manual if ctx.certificate_recorded => {
                Some(reference(nodes::CERTIFICATE, "arn"))
            }
            CertificateValidation::Manual => None,
        };

        graph.add(
            ResourceNode::new(
                nodes::FIREWALL,
                ResourceKind::Firewall,
                group,
                firewall_properties(),
            )
            .with_provider(nodes::US_EAST_1),
        );

        if let Some(certificate_arn) = certificate_arn {
            graph.add(ResourceNode::new(
                nodes::DISTRIBUTION,
                ResourceKind::Distribution,
                group,
                distribution_properties(tracking, &ctx.region, &certificate_arn),
            ));
            graph.add_output(
                outputs::DISTRIBUTION_DOMAIN,
                group,
                json!(reference(nodes::DISTRIBUTION, "domainName")),
            );
        }
        Ok(())
    }
}

fn firewall_properties() -> Value {
    let visibility = |metric: &str| {
        json!({
            "cloudwatchMetricsEnabled": true,
            "metricName": metric,
            "sampledRequestsEnabled": true,
        })
    };
    json!({
        "name": names::FIREWALL,
        "scope": "CLOUDFRONT",
        "defaultAction": { "allow": {} },
        "rules": [{
            "name": "rate-limit-per-ip",
            "priority": 1,
            "action": { "block": {} },
            "statement": {
                "rateBasedStatement": {
                    "limit": RATE_LIMIT,
                    "evaluationWindowSec": RATE_WINDOW_SECS,
                    "aggregateKeyType": "IP",
                },
            },
            "visibilityConfig": visibility("mailstackTrackingRateLimit"),
        }],
        "visibilityConfig": visibility("mailstackTrackingFirewall"),
    })
}

fn distribution_properties(tracking: &str, region: &str, certificate_arn: &str) -> Value {
    json!({
        "enabled": true,
        "comment": format!("mailstack tracking for {}", tracking),
        "aliases": [tracking],
        "priceClass": "PriceClass_100",
        "origins": [{
            "originId": ORIGIN_ID,
            "domainName": tracking_redirector(region),
            "customOriginConfig": {
                "httpPort": 80,
                "httpsPort": 443,
                "originProtocolPolicy": "https-only",
                "originSslProtocols": ["TLSv1.2"],
            },
        }],
        "defaultCacheBehavior": {
            "targetOriginId": ORIGIN_ID,
            "viewerProtocolPolicy": "redirect-to-https",
            "allowedMethods": ["GET", "HEAD", "OPTIONS"],
            "cachedMethods": ["GET", "HEAD"],
            "forwardedValues": {
                "queryString": true,
                "headers": ["*"],
                "cookies": { "forward": "all" },
            },
            "minTtl": 0,
            "defaultTtl": 0,
            "maxTtl": 0,
        },
        "restrictions": { "geoRestriction": { "restrictionType": "none" } },
        "viewerCertificate": {
            "acmCertificateArn": certificate_arn,
            "sslSupportMethod": "sni-only",
            "minimumProtocolVersion": "TLSv1.2_2021",
        },
        "webAclId": reference(nodes::FIREWALL, "arn"),
    })
}
