//! init, connect, upgrade and update
//!
//! All four converge on [`Orchestrator::deploy`]: plan, staged apply,
//! archive binding, identity attachment, MAIL FROM, DNS, then one save.
//! Once the engine has run, nothing aborts before the record is written;
//! later failures become diagnostics.

use super::{Diagnostic, Orchestrator};
use crate::archive::{ArchiveBinder, ArchiveRequest};
use crate::builders::nodes;
use crate::dns::{self, DnsOutcome, RecordInputs};
use crate::error::{Result, StackError};
use crate::graph::{FlatOutputs, PlanSummary, ResourceGraph, ResourceGroup, StackOutputs};
use crate::iam;
use crate::planner::{self, CertificateValidation, FeatureFlags, PlanContext, Preset};
use crate::provider::{ExistingDistribution, ZoneProvider};
use crate::record::{
    AdoptedResources, ArchiveRecord, AttachPolicy, ConnectionRecord, FeatureAction, FeatureName,
    FeatureState, HostingProvider, IdentityAction, IdentityState, IntegrationLevel,
    RecordedOutputs,
};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeSet;

/// Parameters of `init` and `connect`
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub region: String,
    pub provider: HostingProvider,
    pub level: IntegrationLevel,
    pub preset: Preset,
    /// Explicitly requested features, merged over the preset
    pub flags: FeatureFlags,
    pub domain: Option<String>,
    pub attach: AttachPolicy,
}

impl DeployRequest {
    /// Read-only dashboard connection
    pub fn connect(region: impl Into<String>, provider: HostingProvider) -> Self {
        Self {
            region: region.into(),
            provider,
            level: IntegrationLevel::DashboardOnly,
            preset: Preset::Starter,
            flags: FeatureFlags::default(),
            domain: None,
            attach: AttachPolicy::None,
        }
    }

    /// Full sending stack
    pub fn init(region: impl Into<String>, provider: HostingProvider, preset: Preset) -> Self {
        Self {
            region: region.into(),
            provider,
            level: IntegrationLevel::Enhanced,
            preset,
            flags: FeatureFlags::default(),
            domain: None,
            attach: AttachPolicy::Unset,
        }
    }
}

/// Parameters of `upgrade`; an empty request is `update`
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub region: String,
    pub level: Option<IntegrationLevel>,
    pub preset: Option<Preset>,
    pub flags: FeatureFlags,
    pub domain: Option<String>,
    pub attach: Option<AttachPolicy>,
}

#[derive(Debug)]
pub struct DeployReport {
    pub record: ConnectionRecord,
    pub summary: PlanSummary,
    pub applied: BTreeSet<ResourceGroup>,
    /// Groups not attempted because a dependency is missing
    pub skipped: Vec<ResourceGroup>,
    pub diagnostics: Vec<Diagnostic>,
    pub dns: Option<DnsOutcome>,
}

impl DeployReport {
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.is_empty() || !self.skipped.is_empty()
    }
}

struct Staged {
    outputs: StackOutputs,
    applied: BTreeSet<ResourceGroup>,
    skipped: Vec<ResourceGroup>,
    diagnostics: Vec<Diagnostic>,
    incomplete: BTreeSet<ResourceGroup>,
}

impl Orchestrator {
    /// `init` and `connect`: create the stack for a key that has none
    pub async fn init(&self, request: DeployRequest) -> Result<DeployReport> {
        let key = self.resolve_key(&request.region).await?;
        let lock = self.store.acquire_lock(&key).await?;

        if self.store.load(&key).await?.is_some() {
            return Err(StackError::ConnectionExists {
                account_id: key.account_id.clone(),
                region: key.region.clone(),
            });
        }

        let flags = FeatureFlags::resolve(request.preset, &request.flags);
        let mut record =
            ConnectionRecord::new(&key, request.provider, request.level, request.preset);
        record.domain = request.domain;
        record.attach_policy = request.attach;

        tracing::info!(
            "Deploying {} stack {} ({} provider, {} preset)",
            record.integration_level,
            record.stack_id,
            record.provider.name(),
            record.preset
        );
        let report = self.deploy(record, flags, true).await?;
        lock.release().await?;
        Ok(report)
    }

    /// `upgrade`: merge new features or a higher level into a deployed stack
    pub async fn upgrade(&self, request: UpgradeRequest) -> Result<DeployReport> {
        let key = self.resolve_key(&request.region).await?;
        let lock = self.store.acquire_lock(&key).await?;
        let mut record = self.store.require(&key).await?;
        record.validate()?;

        if let Some(level) = request.level {
            record.integration_level = record.integration_level.max(level);
        }
        if let Some(preset) = request.preset {
            record.preset = preset;
        }
        if let Some(domain) = request.domain {
            match record.domain.as_deref() {
                Some(current) if current != domain => {
                    return Err(StackError::InvalidConfig(format!(
                        "this connection already sends from {}; destroy it to switch domains",
                        current
                    )));
                }
                _ => record.domain = Some(domain),
            }
        }
        if let Some(attach) = request.attach {
            record.attach_policy = attach;
        }

        let requested = record
            .enabled_flags()
            .merge(&record.incomplete_flags())
            .merge(&request.flags);
        let flags = FeatureFlags::resolve(request.preset.unwrap_or(Preset::Custom), &requested);

        tracing::info!("Updating stack {}", record.stack_id);
        let report = self.deploy(record, flags, false).await?;
        lock.release().await?;
        Ok(report)
    }

    /// `update`: re-apply the recorded configuration
    ///
    /// Resumes manual certificate validation and re-links an unlinked archive.
    pub async fn update(&self, region: &str) -> Result<DeployReport> {
        self.upgrade(UpgradeRequest {
            region: region.to_string(),
            ..Default::default()
        })
        .await
    }

    async fn deploy(
        &self,
        mut record: ConnectionRecord,
        flags: FeatureFlags,
        fresh: bool,
    ) -> Result<DeployReport> {
        let ctx = self.plan_context(&record, &flags, fresh).await?;
        let graph = planner::plan(record.integration_level, &flags, &ctx)?;
        let summary = graph.summary();
        tracing::info!("Applying {} to {}", summary, record.stack_id);

        let previous = deployed_groups(&record);
        let staged = self
            .apply_staged(
                &record.stack_id,
                &graph,
                &previous,
                &record.outputs.incomplete_groups,
                fresh,
            )
            .await?;
        let Staged {
            outputs,
            applied,
            mut skipped,
            mut diagnostics,
            incomplete,
        } = staged;

        let mut archive = record.outputs.archive.clone();
        if graph.groups().contains(&ResourceGroup::Archive) {
            let ready = ResourceGroup::Archive
                .dependencies()
                .iter()
                .all(|g| applied.contains(g));
            match outputs.config_set_name() {
                Some(config_set) if ready => {
                    match self.bind_archive(&graph, config_set, archive.as_ref()).await {
                        Ok((bound, link_error)) => {
                            if let Some(e) = link_error {
                                diagnostics.push(Diagnostic::from_error(
                                    "link archive",
                                    Some(ResourceGroup::Archive),
                                    &e,
                                ));
                            }
                            archive = bound;
                        }
                        Err(e) => diagnostics.push(Diagnostic::from_error(
                            "create archive",
                            Some(ResourceGroup::Archive),
                            &e,
                        )),
                    }
                }
                _ => skipped.push(ResourceGroup::Archive),
            }
        }

        record.adopted = AdoptedResources {
            oidc_provider_arn: ctx.existing_oidc_provider.clone(),
            domain_identity: ctx.domain_identity_exists,
            distribution_id: ctx.existing_distribution.as_ref().map(|d| d.id.clone()),
        };
        record_features(&mut record, &outputs, &applied, archive.as_ref());
        record.outputs = recorded_outputs(&outputs, archive, incomplete);

        if let Some(config_set) = outputs.config_set_name() {
            if record.attach_policy != AttachPolicy::None {
                let created = graph
                    .node(nodes::DOMAIN_IDENTITY)
                    .and(record.domain.clone());
                let states = self
                    .attach_identities(&record, config_set, created.as_deref(), &mut diagnostics)
                    .await;
                record.merge_identities(states);
            }
        }

        self.apply_mail_from(&mut record, &flags, &mut diagnostics)
            .await;

        let dns = match record.domain.clone() {
            Some(domain) => Some(
                self.publish_dns(&record, &domain, &outputs, &ctx, &mut diagnostics)
                    .await,
            ),
            None => None,
        };

        record.updated_at = Utc::now();
        self.store.save(&record).await?;
        tracing::info!(
            "Saved connection {} ({} diagnostics)",
            record.key(),
            diagnostics.len()
        );

        Ok(DeployReport {
            record,
            summary,
            applied,
            skipped,
            diagnostics,
            dns,
        })
    }

    /// Look up what the plan must reuse rather than create
    async fn plan_context(
        &self,
        record: &ConnectionRecord,
        flags: &FeatureFlags,
        fresh: bool,
    ) -> Result<PlanContext> {
        let mut ctx = PlanContext::new(&record.account_id, &record.region, record.provider.clone());
        ctx.domain = record.domain.clone();
        ctx.console_access = self.options.console_access.clone();
        ctx.kms_key_arn = self.options.kms_key_arn.clone();
        ctx.certificate_recorded = record.outputs.certificate_arn.is_some();

        if let HostingProvider::Vercel { team_slug, .. } = &record.provider {
            ctx.existing_oidc_provider = if fresh || record.outputs.oidc_provider_arn.is_none() {
                self.cloud
                    .account
                    .find_oidc_provider(&iam::vercel_issuer(team_slug))
                    .await?
            } else {
                record.adopted.oidc_provider_arn.clone()
            };
        }

        if let Some(domain) = &record.domain {
            ctx.domain_identity_exists = if record.outputs.domain.as_deref() == Some(domain.as_str()) {
                record.adopted.domain_identity
            } else {
                self.cloud.identities.identity_status(domain).await?.is_some()
            };
        }

        if flags.event_tracking {
            ctx.function_artifact = match &self.options.function_artifact {
                Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
                    Some(path.display().to_string())
                }
                Some(path) => {
                    tracing::warn!("Event-processor artifact {} not found", path.display());
                    None
                }
                None => None,
            };
        }

        if let (true, Some(tracking)) = (flags.https_tracking, &flags.tracking_domain) {
            ctx.existing_distribution = match (
                &record.adopted.distribution_id,
                &record.outputs.distribution_domain,
            ) {
                (Some(id), Some(domain_name)) => Some(ExistingDistribution {
                    id: id.clone(),
                    domain_name: domain_name.clone(),
                }),
                // a recorded distribution we did not adopt is our own
                (None, Some(_)) => None,
                _ => self.cloud.distributions.find_by_alias(tracking).await?,
            };

            if let Some(zone) = self.cloud.zone_control(tracking).await? {
                if zone.provider() == ZoneProvider::Route53 {
                    ctx.validation = CertificateValidation::Automatic {
                        zone_id: zone.zone_id,
                    };
                }
            }
        }

        Ok(ctx)
    }

    /// Apply the base groups, then each optional group cumulatively
    ///
    /// The first stage also carries groups an earlier deploy already
    /// applied, so an upgrade never drops them from the stack. A group that
    /// fails stays in every later graph and the remaining stages are
    /// targeted, so the engine keeps whatever it created.
    async fn apply_staged(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        previous: &BTreeSet<ResourceGroup>,
        incomplete: &BTreeSet<ResourceGroup>,
        fresh: bool,
    ) -> Result<Staged> {
        let engine_groups: BTreeSet<ResourceGroup> = graph
            .engine_nodes()
            .map(|n| n.group)
            .chain(graph.outputs.values().map(|o| o.group))
            .collect();

        let mut applied: BTreeSet<ResourceGroup> = engine_groups
            .iter()
            .copied()
            .filter(|g| g.is_base() || previous.contains(g))
            .collect();
        let mut kept: BTreeSet<ResourceGroup> = incomplete
            .iter()
            .copied()
            .filter(|g| engine_groups.contains(g) && !applied.contains(g))
            .collect();

        let mut flat = match self.apply_stage(stack_id, graph, &applied, &kept).await {
            Ok(flat) => flat,
            Err(e) => {
                if fresh {
                    self.discard_stack(stack_id).await;
                }
                return Err(e);
            }
        };

        let pending: Vec<ResourceGroup> = engine_groups
            .iter()
            .filter(|g| !applied.contains(g))
            .copied()
            .collect();
        let mut skipped = Vec::new();
        let mut diagnostics = Vec::new();
        for group in pending {
            if let Some(missing) = group.dependencies().iter().find(|d| !applied.contains(d)) {
                tracing::warn!("Skipping {} group: {} group is not applied", group, missing);
                skipped.push(group);
                continue;
            }

            let mut stage = applied.clone();
            stage.insert(group);
            match self.apply_stage(stack_id, graph, &stage, &kept).await {
                Ok(outputs) => {
                    tracing::info!("Applied {} group", group);
                    flat = outputs;
                    applied = stage;
                    kept.remove(&group);
                }
                Err(e) => {
                    tracing::warn!("{} group failed: {}", group, e);
                    diagnostics.push(Diagnostic::from_error(
                        format!("apply {} group", group),
                        Some(group),
                        &e,
                    ));
                    kept.insert(group);
                }
            }
        }

        if !kept.is_empty() {
            // pick up whatever the failed groups exported before failing
            match self.engine.outputs(stack_id).await {
                Ok(latest) if StackOutputs::from_flat(&latest).is_ok() => flat = latest,
                Ok(_) => tracing::debug!("Keeping outputs of the last complete stage"),
                Err(e) => tracing::warn!("Could not read outputs of {}: {}", stack_id, e),
            }
        }

        let outputs = match StackOutputs::from_flat(&flat) {
            Ok(outputs) => outputs,
            Err(e) => {
                if fresh {
                    self.discard_stack(stack_id).await;
                }
                return Err(e);
            }
        };

        Ok(Staged {
            outputs,
            applied,
            skipped,
            diagnostics,
            incomplete: kept,
        })
    }

    /// One engine run over `groups`
    ///
    /// `kept` groups stay in the graph but outside the targets.
    async fn apply_stage(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        groups: &BTreeSet<ResourceGroup>,
        kept: &BTreeSet<ResourceGroup>,
    ) -> Result<FlatOutputs> {
        if kept.is_empty() {
            return self.engine.apply(stack_id, &engine_graph(graph, groups)).await;
        }
        let carried: BTreeSet<ResourceGroup> = groups.union(kept).copied().collect();
        self.engine
            .apply_targeted(stack_id, &engine_graph(graph, &carried), groups)
            .await
    }

    /// Best-effort removal of a stack that never got a record
    async fn discard_stack(&self, stack_id: &str) {
        tracing::warn!("Removing partially created stack {}", stack_id);
        match self.engine.destroy(stack_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!("Could not remove stack {}: {}", stack_id, e),
        }
    }

    async fn bind_archive(
        &self,
        graph: &ResourceGraph,
        config_set: &str,
        existing: Option<&ArchiveRecord>,
    ) -> Result<(Option<ArchiveRecord>, Option<StackError>)> {
        let Some(request) = ArchiveRequest::from_graph(graph, config_set)? else {
            return Ok((existing.cloned(), None));
        };
        let outcome = ArchiveBinder::new(self.cloud.archives.as_ref())
            .bind(&request, existing)
            .await?;
        Ok((Some(outcome.record), outcome.link_error))
    }

    /// Attach the configuration set to pre-existing identities
    ///
    /// Identities the stack created and identities already on record are
    /// left alone.
    async fn attach_identities(
        &self,
        record: &ConnectionRecord,
        config_set: &str,
        created: Option<&str>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<IdentityState> {
        let names = match self.cloud.identities.list_identities().await {
            Ok(names) => names,
            Err(e) => {
                diagnostics.push(Diagnostic::from_error("list identities", None, &e));
                return Vec::new();
            }
        };
        let candidates: Vec<String> = names
            .into_iter()
            .filter(|name| Some(name.as_str()) != created && record.identity(name).is_none())
            .collect();

        let identities = &self.cloud.identities;
        let statuses = join_all(candidates.iter().map(|name| identities.identity_status(name))).await;

        let mut states = Vec::new();
        for (name, status) in candidates.iter().zip(statuses) {
            let status = match status {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    diagnostics.push(Diagnostic::from_error(
                        format!("read identity {}", name),
                        None,
                        &e,
                    ));
                    continue;
                }
            };

            let action = match status.config_set.as_deref() {
                Some(current) if current == config_set => {
                    states.push(IdentityState {
                        name: name.clone(),
                        identity_type: status.identity_type,
                        original_config_set: Some(config_set.to_string()),
                        current_config_set: Some(config_set.to_string()),
                        action: IdentityAction::NoChange,
                    });
                    continue;
                }
                None => IdentityAction::Attached,
                Some(_) if record.attach_policy == AttachPolicy::All => IdentityAction::Replaced,
                Some(other) => {
                    tracing::debug!("Leaving {} on configuration set {}", name, other);
                    continue;
                }
            };

            match identities.set_configuration_set(name, Some(config_set)).await {
                Ok(()) => {
                    tracing::info!("{} {} to {}", action, name, config_set);
                    states.push(IdentityState {
                        name: name.clone(),
                        identity_type: status.identity_type,
                        original_config_set: status.config_set.clone(),
                        current_config_set: Some(config_set.to_string()),
                        action,
                    });
                }
                Err(e) => diagnostics.push(Diagnostic::from_error(
                    format!("attach {}", name),
                    None,
                    &e,
                )),
            }
        }
        states
    }

    async fn apply_mail_from(
        &self,
        record: &mut ConnectionRecord,
        flags: &FeatureFlags,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let (Some(label), Some(domain)) = (flags.mail_from.as_deref(), record.domain.clone())
        else {
            return;
        };
        let target = dns::mail_from_domain(label, &domain);
        let recorded = record.feature(FeatureName::MailFrom).cloned();
        if recorded
            .as_ref()
            .is_some_and(|f| f.enabled && f.current_value.as_deref() == Some(target.as_str()))
        {
            return;
        }

        let live = match self.cloud.identities.identity_status(&domain).await {
            Ok(status) => status.and_then(|s| s.mail_from_domain),
            Err(e) => {
                diagnostics.push(Diagnostic::from_error("read MAIL FROM", None, &e));
                return;
            }
        };
        // the first value we replaced stays the original across changes
        let original = match recorded {
            Some(f) if f.action == FeatureAction::Replace => f.original_value,
            Some(f) if f.enabled => None,
            _ => live.filter(|value| *value != target),
        };

        match self
            .cloud
            .identities
            .set_mail_from(&domain, Some(&target))
            .await
        {
            Ok(()) => {
                tracing::info!("Set MAIL FROM of {} to {}", domain, target);
                let state = match original {
                    Some(original) => FeatureState::replaced(original, target),
                    None => FeatureState::deployed(Some(target)),
                };
                record.set_feature(FeatureName::MailFrom, state);
            }
            Err(e) => diagnostics.push(Diagnostic::from_error("set MAIL FROM", None, &e)),
        }
    }

    async fn publish_dns(
        &self,
        record: &ConnectionRecord,
        domain: &str,
        outputs: &StackOutputs,
        ctx: &PlanContext,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> DnsOutcome {
        let mut dkim_tokens = outputs
            .sending
            .as_ref()
            .map(|s| s.dkim_tokens.clone())
            .unwrap_or_default();
        if dkim_tokens.is_empty() {
            match self.cloud.identities.identity_status(domain).await {
                Ok(Some(status)) => dkim_tokens = status.dkim_tokens,
                Ok(None) => {}
                Err(e) => diagnostics.push(Diagnostic::from_error("read DKIM tokens", None, &e)),
            }
        }

        let inputs = RecordInputs {
            domain: domain.to_string(),
            region: record.region.clone(),
            dkim_tokens,
            tracking_domain: outputs.sending.as_ref().and_then(|s| s.tracking_domain.clone()),
            distribution_domain: outputs.edge.as_ref().and_then(|e| e.distribution_domain.clone()),
            mail_from_domain: record
                .feature(FeatureName::MailFrom)
                .filter(|f| f.enabled)
                .and_then(|f| f.current_value.clone()),
        };
        let mut records = dns::required_records(&inputs);
        if !matches!(ctx.validation, CertificateValidation::Automatic { .. }) {
            if let Some(edge) = &outputs.edge {
                records.extend(edge.validation_records.iter().cloned());
            }
        }

        let zone = match self.cloud.zone_control(domain).await {
            Ok(zone) => zone,
            Err(e) => {
                diagnostics.push(Diagnostic::from_error("find DNS zone", None, &e));
                None
            }
        };
        match dns::reconcile(zone.as_ref(), records.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                diagnostics.push(Diagnostic::from_error("publish DNS records", None, &e));
                DnsOutcome::Manual { records }
            }
        }
    }
}

/// Engine-managed part of `graph` restricted to `groups`
fn engine_graph(graph: &ResourceGraph, groups: &BTreeSet<ResourceGroup>) -> ResourceGraph {
    let mut subgraph = graph.subgraph(groups);
    subgraph.nodes.retain(|n| n.kind.is_engine_managed());
    subgraph
}

/// Engine groups a record says are already in the stack
fn deployed_groups(record: &ConnectionRecord) -> BTreeSet<ResourceGroup> {
    let mut groups = BTreeSet::from([ResourceGroup::Core, ResourceGroup::Sending]);
    if record.is_enabled(FeatureName::EventTracking) {
        groups.insert(ResourceGroup::History);
    }
    if record.is_enabled(FeatureName::HttpsTracking) {
        groups.insert(ResourceGroup::Edge);
    }
    groups
}

/// Mark features the apply delivered; replaced features keep their original
fn record_features(
    record: &mut ConnectionRecord,
    outputs: &StackOutputs,
    applied: &BTreeSet<ResourceGroup>,
    archive: Option<&ArchiveRecord>,
) {
    let mut enable = |name: FeatureName, value: Option<String>| {
        let keep = record
            .feature(name)
            .is_some_and(|f| f.action == FeatureAction::Replace);
        if !keep {
            record.set_feature(name, FeatureState::deployed(value));
        }
    };

    if let Some(config_set) = outputs.config_set_name() {
        enable(FeatureName::ConfigSet, Some(config_set.to_string()));
    }
    if let Some(history) = &outputs.history {
        enable(FeatureName::EventTracking, Some(history.table_name.clone()));
    }
    if let Some(tracking) = outputs.sending.as_ref().and_then(|s| s.tracking_domain.clone()) {
        enable(FeatureName::TrackingDomain, Some(tracking));
    }
    if applied.contains(&ResourceGroup::Edge) {
        let value = outputs
            .edge
            .as_ref()
            .and_then(|e| e.distribution_domain.clone().or(e.certificate_arn.clone()));
        enable(FeatureName::HttpsTracking, value);
    }
    if let Some(archive) = archive {
        enable(FeatureName::EmailArchiving, Some(archive.archive_arn.clone()));
    }
}

fn recorded_outputs(
    outputs: &StackOutputs,
    archive: Option<ArchiveRecord>,
    incomplete_groups: BTreeSet<ResourceGroup>,
) -> RecordedOutputs {
    let sending = outputs.sending.as_ref();
    let edge = outputs.edge.as_ref();
    RecordedOutputs {
        role_arn: Some(outputs.role_arn.clone()),
        oidc_provider_arn: outputs.oidc_provider_arn.clone(),
        config_set_name: outputs.config_set_name().map(str::to_string),
        history_table_name: outputs.history.as_ref().map(|h| h.table_name.clone()),
        function_arns: outputs
            .history
            .as_ref()
            .map(|h| h.function_arns.clone())
            .unwrap_or_default(),
        domain: sending.and_then(|s| s.domain.clone()),
        dkim_tokens: sending.map(|s| s.dkim_tokens.clone()).unwrap_or_default(),
        tracking_domain: sending.and_then(|s| s.tracking_domain.clone()),
        distribution_domain: edge.and_then(|e| e.distribution_domain.clone()),
        certificate_arn: edge.and_then(|e| e.certificate_arn.clone()),
        archive,
        incomplete_groups,
    }
}
