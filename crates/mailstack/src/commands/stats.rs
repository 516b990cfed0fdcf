use crate::app::App;
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::{BrokerConfig, CredentialBroker, StackError};
use mailstack_cloud_aws::{SesMetrics, SesMetricsReader, StsRoleAssumer};
use std::sync::Arc;
use std::time::Duration;

fn rate(value: Option<f64>) -> String {
    value
        .map(|r| format!("{:.2}%", r * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_metrics(metrics: &SesMetrics, hours: u32) {
    println!("{}", format!("Sending over the last {}h", hours).bold());
    println!("  sends:       {}", metrics.sends);
    println!("  deliveries:  {}", metrics.deliveries);
    println!("  bounces:     {}", metrics.bounces);
    println!("  complaints:  {}", metrics.complaints);
    println!("  bounce rate:    {}", rate(metrics.bounce_rate()));
    println!("  complaint rate: {}", rate(metrics.complaint_rate()));
}

pub async fn handle(
    region: Option<String>,
    role_arn: Option<String>,
    external_id: Option<String>,
    hours: u32,
) -> anyhow::Result<()> {
    if hours == 0 {
        return Err(StackError::InvalidConfig(
            "--hours must be at least 1".to_string(),
        ))
        .context("parse --hours");
    }

    let app = App::load(region, external_id.clone()).await?;

    let role_arn = match role_arn {
        Some(arn) => arn,
        None => app
            .require_connection()
            .await?
            .outputs
            .role_arn
            .ok_or_else(|| StackError::State("the connection has no recorded role".to_string()))
            .context("find the stack role")?,
    };

    let broker = CredentialBroker::with_config(
        Arc::new(StsRoleAssumer::new(&app.aws)),
        BrokerConfig {
            safety_margin: Duration::from_secs(app.settings.credential_safety_margin_secs),
            ..Default::default()
        },
    );
    let credential = broker
        .get_credentials(&role_arn, external_id.as_deref())
        .await
        .with_context(|| format!("assume {}", role_arn))?;
    tracing::debug!("Using brokered credentials {:?}", credential);

    let metrics = SesMetricsReader::new(&credential, &app.region)
        .sums(hours)
        .await
        .context("read sending metrics")?;

    print_metrics(&metrics, hours);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_formatting() {
        assert_eq!(rate(Some(0.0312)), "3.12%");
        assert_eq!(rate(None), "n/a");
    }
}
