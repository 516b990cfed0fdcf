//! Sending metrics read with brokered credentials
//!
//! The dashboard never sees the operator's own keys: it reads CloudWatch
//! through a client built from a [`Credential`] the broker issued for the
//! stack's role.

use crate::error::sdk_error;
use aws_sdk_cloudwatch::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::Statistic;
use chrono::Utc;
use mailstack_cloud::{Credential, Result, StackError};

const NAMESPACE: &str = "AWS/SES";
const PROVIDER_NAME: &str = "mailstack-broker";

/// Totals over a time window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SesMetrics {
    pub sends: f64,
    pub deliveries: f64,
    pub bounces: f64,
    pub complaints: f64,
}

impl SesMetrics {
    /// Share of sends that bounced, `None` before anything was sent
    pub fn bounce_rate(&self) -> Option<f64> {
        (self.sends > 0.0).then(|| self.bounces / self.sends)
    }

    pub fn complaint_rate(&self) -> Option<f64> {
        (self.sends > 0.0).then(|| self.complaints / self.sends)
    }
}

pub struct SesMetricsReader {
    client: aws_sdk_cloudwatch::Client,
}

impl SesMetricsReader {
    pub fn new(credential: &Credential, region: &str) -> Self {
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.clone(),
            Some(credential.session_token.clone()),
            Some(credential.expires_at.into()),
            PROVIDER_NAME,
        );
        let config = aws_sdk_cloudwatch::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();

        Self {
            client: aws_sdk_cloudwatch::Client::from_conf(config),
        }
    }

    /// Send, delivery, bounce and complaint sums over the last `hours`
    pub async fn sums(&self, hours: u32) -> Result<SesMetrics> {
        if hours == 0 {
            return Err(StackError::InvalidConfig(
                "the metrics window must be at least one hour".to_string(),
            ));
        }

        let (sends, deliveries, bounces, complaints) = tokio::try_join!(
            self.sum("Send", hours),
            self.sum("Delivery", hours),
            self.sum("Bounce", hours),
            self.sum("Complaint", hours),
        )?;

        Ok(SesMetrics {
            sends,
            deliveries,
            bounces,
            complaints,
        })
    }

    async fn sum(&self, metric: &str, hours: u32) -> Result<f64> {
        let end = Utc::now().timestamp();
        let window = i64::from(hours) * 3600;

        let output = self
            .client
            .get_metric_statistics()
            .namespace(NAMESPACE)
            .metric_name(metric)
            .start_time(AwsDateTime::from_secs(end - window))
            .end_time(AwsDateTime::from_secs(end))
            .period(i32::try_from(window).unwrap_or(i32::MAX))
            .statistics(Statistic::Sum)
            .send()
            .await
            .map_err(|e| sdk_error("cloudwatch", "cloudwatch:GetMetricStatistics", e))?;

        let total = total(output.datapoints().iter().map(|d| d.sum()));
        tracing::debug!("{}/{} over {}h = {}", NAMESPACE, metric, hours, total);
        Ok(total)
    }
}

fn total(sums: impl Iterator<Item = Option<f64>>) -> f64 {
    sums.flatten().sum()
}
