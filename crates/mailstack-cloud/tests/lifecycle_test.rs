//! Lifecycle end-to-end tests against in-memory collaborators

mod common;

use common::{FakeResolver, Harness, REGION};
use mailstack_cloud::archive::ArchiveRetention;
use mailstack_cloud::dns::{RecordGroup, RecordStatus, RecordType};
use mailstack_cloud::record::{FeatureAction, IdentityAction};
use mailstack_cloud::{
    AttachPolicy, DeployRequest, DestroyOutcome, FeatureFlags, FeatureName, HostingProvider,
    LifecycleOptions, OverallStatus, Preset, ResourceGroup, RestoreOutcome, StackError, UpgradeRequest,
};
use std::collections::BTreeSet;

fn custom(flags: FeatureFlags) -> DeployRequest {
    let mut request = DeployRequest::init(REGION, HostingProvider::Aws, Preset::Custom);
    request.flags = flags;
    request
}

fn with_config_set() -> FeatureFlags {
    FeatureFlags {
        config_set: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_starter_init_skips_config_set() {
    let h = Harness::new();
    h.identities.add("example.com", None);

    let report = h
        .orchestrator
        .init(DeployRequest::init(REGION, HostingProvider::Aws, Preset::Starter))
        .await
        .unwrap();

    let record = &report.record;
    assert_eq!(
        record.feature(FeatureName::ConfigSet).unwrap().action,
        FeatureAction::Skip
    );
    assert!(record.identities.is_empty());
    assert!(record.outputs.role_arn.is_some());
    assert!(!report.is_partial());

    let stored = h.orchestrator.connection(REGION).await.unwrap().unwrap();
    assert_eq!(&stored, record);
    // untouched because there is no configuration set to attach
    assert_eq!(h.identities.get("example.com").unwrap().config_set, None);
}

#[tokio::test]
async fn test_init_twice_is_a_conflict() {
    let h = Harness::new();
    h.orchestrator
        .init(DeployRequest::connect(REGION, HostingProvider::Railway))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .init(DeployRequest::connect(REGION, HostingProvider::Railway))
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::ConnectionExists { .. }));
    assert_eq!(err.code(), "STACK_EXISTS");
}

#[tokio::test]
async fn test_upgrade_adds_tracking_and_keeps_identities() {
    let h = Harness::new();
    h.identities.add("example.com", None);
    h.identities.add("ops@example.org", None);

    let first = h.orchestrator.init(custom(with_config_set())).await.unwrap();
    assert_eq!(first.record.identities.len(), 2);
    assert!(
        first
            .record
            .identities
            .iter()
            .all(|i| i.action == IdentityAction::Attached)
    );

    // a later identity must not change the ones already recorded
    h.identities.add("news.example.com", None);
    let report = h
        .orchestrator
        .upgrade(UpgradeRequest {
            region: REGION.into(),
            flags: FeatureFlags {
                event_tracking: true,
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();

    let record = &report.record;
    assert!(record.is_enabled(FeatureName::EventTracking));
    assert!(record.is_enabled(FeatureName::ConfigSet));
    assert!(!record.outputs.function_arns.is_empty());
    assert!(record.outputs.history_table_name.is_some());
    assert!(report.applied.contains(&ResourceGroup::History));
    for identity in &first.record.identities {
        assert_eq!(record.identity(&identity.name), Some(identity));
    }
    assert_eq!(record.identities.len(), 3);
}

#[tokio::test]
async fn test_destroy_after_stack_removed_out_of_band() {
    let h = Harness::new();
    h.orchestrator
        .init(DeployRequest::init(REGION, HostingProvider::Aws, Preset::Starter))
        .await
        .unwrap();
    h.engine.forget(&h.stack_id());

    let DestroyOutcome::Destroyed(report) = h.orchestrator.destroy(REGION).await.unwrap() else {
        panic!("expected a teardown");
    };
    assert!(!report.stack_removed);
    assert!(report.record_deleted);
    assert!(h.orchestrator.connection(REGION).await.unwrap().is_none());

    let second = h.orchestrator.destroy(REGION).await.unwrap();
    assert!(matches!(second, DestroyOutcome::NothingToDestroy));
}

#[tokio::test]
async fn test_verify_reports_missing_dmarc_as_pending() {
    let h = Harness::new();
    h.identities.add("example.com", None);

    let mut resolver = FakeResolver::default();
    for token in ["a1", "b2", "c3"] {
        resolver.publish(
            &format!("{}._domainkey.example.com", token),
            &format!("{}.dkim.amazonses.com", token),
        );
    }
    resolver.publish("example.com", "v=spf1 include:amazonses.com ~all");

    let report = h
        .orchestrator
        .verify(&resolver, "example.com", REGION)
        .await
        .unwrap();

    assert_eq!(report.group(RecordGroup::Dkim).unwrap().status, RecordStatus::Verified);
    assert_eq!(report.group(RecordGroup::Spf).unwrap().status, RecordStatus::Verified);
    assert_eq!(report.group(RecordGroup::Dmarc).unwrap().status, RecordStatus::Missing);
    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.overall, OverallStatus::Pending);
}

#[tokio::test]
async fn test_failed_optional_group_is_a_diagnostic() {
    let h = Harness::new();
    h.engine.fail_group(ResourceGroup::History);

    let report = h
        .orchestrator
        .init(custom(FeatureFlags {
            event_tracking: true,
            ..Default::default()
        }))
        .await
        .unwrap();

    assert!(report.is_partial());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].group, Some(ResourceGroup::History));
    assert_eq!(report.diagnostics[0].code, "ENGINE_FAILED");
    assert!(!report.applied.contains(&ResourceGroup::History));

    let record = &report.record;
    assert!(record.is_enabled(FeatureName::ConfigSet));
    assert!(!record.is_enabled(FeatureName::EventTracking));
    assert!(record.outputs.function_arns.is_empty());
    assert!(record.outputs.incomplete_groups.contains(&ResourceGroup::History));
}

#[tokio::test]
async fn test_failed_group_kept_while_later_groups_apply() {
    let h = Harness::new();
    h.engine.fail_group(ResourceGroup::History);

    let report = h
        .orchestrator
        .init(custom(FeatureFlags {
            event_tracking: true,
            tracking_domain: Some("track.example.com".into()),
            https_tracking: true,
            ..Default::default()
        }))
        .await
        .unwrap();

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].group, Some(ResourceGroup::History));
    assert!(report.applied.contains(&ResourceGroup::Edge));
    assert!(!report.applied.contains(&ResourceGroup::History));

    // no apply after the failure may leave the history resources out
    let graphs = h.engine.applied.lock().unwrap().clone();
    let failed_at = graphs
        .iter()
        .position(|g| g.nodes.iter().any(|n| n.group == ResourceGroup::History))
        .unwrap();
    assert!(failed_at + 1 < graphs.len());
    for graph in &graphs[failed_at..] {
        assert!(graph.nodes.iter().any(|n| n.group == ResourceGroup::History));
    }

    let record = &report.record;
    assert!(record.is_enabled(FeatureName::HttpsTracking));
    assert!(record.outputs.certificate_arn.is_some());
    assert_eq!(
        record.outputs.incomplete_groups,
        BTreeSet::from([ResourceGroup::History])
    );

    // update retries the incomplete group
    h.engine.failing.lock().unwrap().clear();
    let retried = h.orchestrator.update(REGION).await.unwrap();
    assert!(retried.diagnostics.is_empty());
    assert!(retried.applied.contains(&ResourceGroup::History));
    let record = &retried.record;
    assert!(record.is_enabled(FeatureName::EventTracking));
    assert!(record.outputs.history_table_name.is_some());
    assert!(record.outputs.incomplete_groups.is_empty());
    assert!(record.is_enabled(FeatureName::HttpsTracking));
}

#[tokio::test]
async fn test_failed_base_stage_leaves_no_stack() {
    let h = Harness::new();
    h.engine.fail_group(ResourceGroup::Core);

    let err = h
        .orchestrator
        .init(DeployRequest::init(REGION, HostingProvider::Aws, Preset::Starter))
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::Engine(_)));
    assert!(!h.engine.has_stack(&h.stack_id()));
    assert!(h.orchestrator.connection(REGION).await.unwrap().is_none());

    // the lock was released with the failed command
    h.engine.failing.lock().unwrap().clear();
    h.orchestrator
        .init(DeployRequest::init(REGION, HostingProvider::Aws, Preset::Starter))
        .await
        .unwrap_or_else(|e| panic!("retry failed: {}", e));
}

#[tokio::test]
async fn test_restore_puts_back_original_config_sets() {
    let h = Harness::new();
    h.identities.add("legacy.example.com", Some("legacy-tracking"));
    h.identities.add("fresh.example.com", None);

    let mut request = custom(with_config_set());
    request.attach = AttachPolicy::All;
    let report = h.orchestrator.init(request).await.unwrap();
    let config_set = report.record.outputs.config_set_name.clone().unwrap();
    assert_eq!(
        h.identities.get("legacy.example.com").unwrap().config_set,
        Some(config_set.clone())
    );
    assert_eq!(
        report.record.identity("legacy.example.com").unwrap().action,
        IdentityAction::Replaced
    );

    let plan = h.orchestrator.restore_plan(REGION).await.unwrap();
    assert_eq!(plan.identities.len(), 2);

    let RestoreOutcome::Restored(restored) = h.orchestrator.restore(REGION).await.unwrap() else {
        panic!("expected a restore");
    };
    assert!(restored.mismatches.is_empty());
    assert!(restored.teardown.record_deleted);
    assert_eq!(restored.teardown.identities_reverted.len(), 2);
    assert_eq!(
        h.identities.get("legacy.example.com").unwrap().config_set,
        Some("legacy-tracking".to_string())
    );
    assert_eq!(h.identities.get("fresh.example.com").unwrap().config_set, None);
}

#[tokio::test]
async fn test_restore_leaves_identities_moved_since() {
    let h = Harness::new();
    h.identities.add("fresh.example.com", None);
    h.orchestrator.init(custom(with_config_set())).await.unwrap();

    h.identities.update("fresh.example.com", |status| {
        status.config_set = Some("someone-else".to_string());
    });

    let RestoreOutcome::Restored(restored) = h.orchestrator.restore(REGION).await.unwrap() else {
        panic!("expected a restore");
    };
    assert!(restored.teardown.identities_reverted.is_empty());
    assert_eq!(restored.teardown.diagnostics.len(), 1);
    assert_eq!(
        h.identities.get("fresh.example.com").unwrap().config_set,
        Some("someone-else".to_string())
    );
}

#[tokio::test]
async fn test_restore_with_nothing_to_restore_keeps_record() {
    let h = Harness::new();
    h.orchestrator
        .init(DeployRequest::init(REGION, HostingProvider::Aws, Preset::Starter))
        .await
        .unwrap();

    let outcome = h.orchestrator.restore(REGION).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::NothingToRestore));
    assert!(h.orchestrator.connection(REGION).await.unwrap().is_some());
    assert!(h.engine.has_stack(&h.stack_id()));
}

#[tokio::test]
async fn test_status_without_record() {
    let h = Harness::new();
    let err = h.orchestrator.status(None, REGION).await.unwrap_err();
    assert!(matches!(err, StackError::ConnectionNotFound { .. }));
    assert!(err.suggestion().unwrap().contains("init"));
}

#[tokio::test]
async fn test_status_reads_outputs_and_identities() {
    let h = Harness::new();
    h.identities.add("example.com", None);
    let mut request = custom(with_config_set());
    request.domain = Some("example.com".into());
    h.orchestrator.init(request).await.unwrap();

    let report = h.orchestrator.status(None, REGION).await.unwrap();
    let outputs = report.outputs.unwrap();
    assert!(report.engine_error.is_none());
    assert_eq!(outputs.config_set_name(), Some("mailstack-email-tracking"));
    assert_eq!(report.identities.len(), 1);
    assert_eq!(report.identities[0].name, "example.com");
}

#[tokio::test]
async fn test_unlinked_archive_is_relinked_by_update() {
    let h = Harness::new();
    *h.archives.fail_link.lock().unwrap() = true;

    let report = h
        .orchestrator
        .init(custom(FeatureFlags {
            archiving: Some(ArchiveRetention::OneYear),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].group, Some(ResourceGroup::Archive));
    let archive = report.record.outputs.archive.clone().unwrap();
    assert!(!archive.linked);

    *h.archives.fail_link.lock().unwrap() = false;
    let report = h.orchestrator.update(REGION).await.unwrap();
    let relinked = report.record.outputs.archive.clone().unwrap();
    assert!(relinked.linked);
    assert_eq!(relinked.archive_id, archive.archive_id);
    assert_eq!(h.archives.archives.lock().unwrap().len(), 1);

    let DestroyOutcome::Destroyed(teardown) = h.orchestrator.destroy(REGION).await.unwrap() else {
        panic!("expected a teardown");
    };
    assert!(teardown.archive_removed);
    assert!(h.archives.archives.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_created_with_configured_key() {
    let key = "arn:aws:kms:us-east-1:123456789012:key/archive";
    let h = Harness::with_options(LifecycleOptions {
        kms_key_arn: Some(key.to_string()),
        ..Default::default()
    });

    let report = h
        .orchestrator
        .init(custom(FeatureFlags {
            archiving: Some(ArchiveRetention::ThreeMonths),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert!(report.record.outputs.archive.as_ref().unwrap().linked);
    assert_eq!(
        *h.archives.kms_keys.lock().unwrap(),
        vec![Some(key.to_string())]
    );

    // without a configured key the service default is used
    let plain = Harness::new();
    plain
        .orchestrator
        .init(custom(FeatureFlags {
            archiving: Some(ArchiveRetention::ThreeMonths),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(*plain.archives.kms_keys.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn test_mail_from_original_restored_on_destroy() {
    let h = Harness::new();
    h.identities.add("example.com", None);
    h.identities.update("example.com", |status| {
        status.mail_from_domain = Some("bounce.example.com".to_string());
    });

    let mut request = custom(FeatureFlags {
        mail_from: Some("mail".into()),
        ..Default::default()
    });
    request.domain = Some("example.com".into());
    let report = h.orchestrator.init(request).await.unwrap();

    let feature = report.record.feature(FeatureName::MailFrom).unwrap();
    assert_eq!(feature.action, FeatureAction::Replace);
    assert_eq!(feature.original_value.as_deref(), Some("bounce.example.com"));
    assert_eq!(
        h.identities.get("example.com").unwrap().mail_from_domain.as_deref(),
        Some("mail.example.com")
    );

    let records = report.dns.unwrap().records().to_vec();
    assert!(
        records
            .iter()
            .any(|r| r.record_type == RecordType::Mx && r.name == "mail.example.com")
    );

    h.orchestrator.destroy(REGION).await.unwrap();
    assert_eq!(
        h.identities.get("example.com").unwrap().mail_from_domain.as_deref(),
        Some("bounce.example.com")
    );
}
