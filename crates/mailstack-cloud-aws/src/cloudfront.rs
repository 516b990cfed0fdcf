//! CloudFront distribution lookups

use crate::context::AwsContext;
use crate::error::sdk_error;
use async_trait::async_trait;
use mailstack_cloud::provider::ExistingDistribution;
use mailstack_cloud::{DistributionApi, Result};

pub struct CloudFrontDistributions {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontDistributions {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudfront_client(),
        }
    }
}

fn serves_alias(aliases: &[String], alias: &str) -> bool {
    let alias = alias.trim_end_matches('.');
    aliases.iter().any(|a| a.eq_ignore_ascii_case(alias))
}

#[async_trait]
impl DistributionApi for CloudFrontDistributions {
    async fn find_by_alias(&self, alias: &str) -> Result<Option<ExistingDistribution>> {
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .client
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("cloudfront", "cloudfront:ListDistributions", e))?;

            let Some(list) = page.distribution_list() else {
                return Ok(None);
            };

            let found = list.items().iter().find(|d| {
                d.aliases()
                    .is_some_and(|aliases| serves_alias(aliases.items(), alias))
            });
            if let Some(distribution) = found {
                tracing::info!(
                    "Reusing distribution {} ({}) for {}",
                    distribution.id(),
                    distribution.domain_name(),
                    alias
                );
                return Ok(Some(ExistingDistribution {
                    id: distribution.id().to_string(),
                    domain_name: distribution.domain_name().to_string(),
                }));
            }

            match list.next_marker() {
                Some(next) if list.is_truncated() => marker = Some(next.to_string()),
                _ => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serves_alias() {
        let aliases = vec!["Track.Example.com".to_string(), "cdn.example.com".to_string()];
        assert!(serves_alias(&aliases, "track.example.com."));
        assert!(!serves_alias(&aliases, "example.com"));
        assert!(!serves_alias(&[], "track.example.com"));
    }
}
