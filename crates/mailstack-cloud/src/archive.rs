//! Archive binder
//!
//! Creating an archive and linking it to the configuration set are two
//! separate API calls. A failed link leaves a created, unlinked archive
//! that the next `update` links again; nothing is rolled back.

use crate::builders::nodes;
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::provider::ArchiveApi;
use crate::record::ArchiveRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retention periods the archive service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveRetention {
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "9m")]
    NineMonths,
    #[default]
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "18m")]
    EighteenMonths,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "30m")]
    ThirtyMonths,
    #[serde(rename = "3y")]
    ThreeYears,
    #[serde(rename = "4y")]
    FourYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "6y")]
    SixYears,
    #[serde(rename = "7y")]
    SevenYears,
    #[serde(rename = "8y")]
    EightYears,
    #[serde(rename = "9y")]
    NineYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "permanent")]
    Permanent,
}

impl ArchiveRetention {
    pub const ALL: [ArchiveRetention; 16] = [
        ArchiveRetention::ThreeMonths,
        ArchiveRetention::SixMonths,
        ArchiveRetention::NineMonths,
        ArchiveRetention::OneYear,
        ArchiveRetention::EighteenMonths,
        ArchiveRetention::TwoYears,
        ArchiveRetention::ThirtyMonths,
        ArchiveRetention::ThreeYears,
        ArchiveRetention::FourYears,
        ArchiveRetention::FiveYears,
        ArchiveRetention::SixYears,
        ArchiveRetention::SevenYears,
        ArchiveRetention::EightYears,
        ArchiveRetention::NineYears,
        ArchiveRetention::TenYears,
        ArchiveRetention::Permanent,
    ];

    /// Short form used on the command line and in records
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveRetention::ThreeMonths => "3m",
            ArchiveRetention::SixMonths => "6m",
            ArchiveRetention::NineMonths => "9m",
            ArchiveRetention::OneYear => "1y",
            ArchiveRetention::EighteenMonths => "18m",
            ArchiveRetention::TwoYears => "2y",
            ArchiveRetention::ThirtyMonths => "30m",
            ArchiveRetention::ThreeYears => "3y",
            ArchiveRetention::FourYears => "4y",
            ArchiveRetention::FiveYears => "5y",
            ArchiveRetention::SixYears => "6y",
            ArchiveRetention::SevenYears => "7y",
            ArchiveRetention::EightYears => "8y",
            ArchiveRetention::NineYears => "9y",
            ArchiveRetention::TenYears => "10y",
            ArchiveRetention::Permanent => "permanent",
        }
    }

    /// Enumeration value of the archive API
    pub fn api_name(&self) -> &'static str {
        match self {
            ArchiveRetention::ThreeMonths => "THREE_MONTHS",
            ArchiveRetention::SixMonths => "SIX_MONTHS",
            ArchiveRetention::NineMonths => "NINE_MONTHS",
            ArchiveRetention::OneYear => "ONE_YEAR",
            ArchiveRetention::EighteenMonths => "EIGHTEEN_MONTHS",
            ArchiveRetention::TwoYears => "TWO_YEARS",
            ArchiveRetention::ThirtyMonths => "THIRTY_MONTHS",
            ArchiveRetention::ThreeYears => "THREE_YEARS",
            ArchiveRetention::FourYears => "FOUR_YEARS",
            ArchiveRetention::FiveYears => "FIVE_YEARS",
            ArchiveRetention::SixYears => "SIX_YEARS",
            ArchiveRetention::SevenYears => "SEVEN_YEARS",
            ArchiveRetention::EightYears => "EIGHT_YEARS",
            ArchiveRetention::NineYears => "NINE_YEARS",
            ArchiveRetention::TenYears => "TEN_YEARS",
            ArchiveRetention::Permanent => "PERMANENT",
        }
    }
}

impl fmt::Display for ArchiveRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveRetention {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        ArchiveRetention::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let accepted: Vec<&str> = ArchiveRetention::ALL.iter().map(|r| r.as_str()).collect();
                StackError::InvalidConfig(format!(
                    "unknown archive retention '{}' (expected one of {})",
                    s,
                    accepted.join(", ")
                ))
            })
    }
}

/// What the binder is asked to do
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub name: String,
    pub retention: ArchiveRetention,
    pub kms_key_arn: Option<String>,
    pub config_set: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveProperties {
    name: String,
    retention: ArchiveRetention,
    #[serde(default)]
    kms_key_arn: Option<String>,
}

impl ArchiveRequest {
    /// Request described by the graph's archive node, if one is planned
    pub fn from_graph(graph: &ResourceGraph, config_set: &str) -> Result<Option<Self>> {
        let Some(node) = graph.node(nodes::ARCHIVE) else {
            return Ok(None);
        };
        let props: ArchiveProperties = serde_json::from_value(node.properties.clone())?;
        Ok(Some(ArchiveRequest {
            name: props.name,
            retention: props.retention,
            kms_key_arn: props.kms_key_arn,
            config_set: config_set.to_string(),
        }))
    }
}

/// Result of a bind; a link failure is reported, not raised
#[derive(Debug)]
pub struct BindOutcome {
    pub record: ArchiveRecord,
    pub link_error: Option<StackError>,
}

pub struct ArchiveBinder<'a> {
    api: &'a dyn ArchiveApi,
}

impl<'a> ArchiveBinder<'a> {
    pub fn new(api: &'a dyn ArchiveApi) -> Self {
        Self { api }
    }

    /// Create the archive unless `existing` already has one, then link it
    ///
    /// Fails only when the archive itself cannot be created.
    pub async fn bind(
        &self,
        request: &ArchiveRequest,
        existing: Option<&ArchiveRecord>,
    ) -> Result<BindOutcome> {
        let mut record = match existing {
            Some(existing) => existing.clone(),
            None => {
                let handle = self
                    .api
                    .create_archive(
                        &request.name,
                        request.retention,
                        request.kms_key_arn.as_deref(),
                    )
                    .await?;
                tracing::info!("Created archive {} ({})", handle.id, request.retention);
                ArchiveRecord {
                    archive_id: handle.id,
                    archive_arn: handle.arn,
                    retention: request.retention,
                    linked: false,
                }
            }
        };

        if record.linked {
            return Ok(BindOutcome {
                record,
                link_error: None,
            });
        }

        match self
            .api
            .link_archive(&request.config_set, &record.archive_arn)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Linked archive {} to configuration set {}",
                    record.archive_id,
                    request.config_set
                );
                record.linked = true;
                Ok(BindOutcome {
                    record,
                    link_error: None,
                })
            }
            Err(e) => {
                tracing::warn!("Archive {} created but not linked: {}", record.archive_id, e);
                Ok(BindOutcome {
                    record,
                    link_error: Some(e),
                })
            }
        }
    }

    /// Unlink then delete; resources already gone are fine
    pub async fn unbind(&self, record: &ArchiveRecord, config_set: Option<&str>) -> Result<()> {
        if let (true, Some(config_set)) = (record.linked, config_set) {
            match self.api.unlink_archive(config_set).await {
                Ok(()) => tracing::info!("Unlinked archive from {}", config_set),
                Err(e) if e.is_not_found() => {
                    tracing::warn!("Configuration set {} already gone", config_set)
                }
                Err(e) => return Err(e),
            }
        }

        match self.api.delete_archive(&record.archive_id).await {
            Ok(()) => {
                tracing::info!("Deleted archive {}", record.archive_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("Archive {} already deleted", record.archive_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
