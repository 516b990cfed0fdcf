use async_trait::async_trait;
use mailstack_cloud::archive::ArchiveRetention;
use mailstack_cloud::graph::{FlatOutputs, ResourceGraph, ResourceGroup};
use mailstack_cloud::provider::{
    AccountApi, ArchiveApi, ArchiveHandle, CloudApis, DistributionApi, DkimStatus, DnsResolver,
    ExistingDistribution, IdentityApi, IdentityStatus, ProvisioningEngine,
};
use mailstack_cloud::record::IdentityType;
use mailstack_cloud::{LifecycleOptions, MetadataStore, Orchestrator, Result, StackError};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-east-1";

/// Engine that "creates" a graph by resolving its outputs to fake values
#[derive(Default)]
pub struct FakeEngine {
    pub stacks: Mutex<HashMap<String, FlatOutputs>>,
    #[allow(dead_code)]
    pub applied: Mutex<Vec<ResourceGraph>>,
    pub failing: Mutex<BTreeSet<ResourceGroup>>,
}

impl FakeEngine {
    pub fn fail_group(&self, group: ResourceGroup) {
        self.failing.lock().unwrap().insert(group);
    }

    /// Simulate a stack removed out-of-band
    pub fn forget(&self, stack_id: &str) {
        self.stacks.lock().unwrap().remove(stack_id);
    }

    pub fn has_stack(&self, stack_id: &str) -> bool {
        self.stacks.lock().unwrap().contains_key(stack_id)
    }
}

fn resolve(graph: &ResourceGraph, value: &Value) -> Value {
    match value {
        Value::String(s) if s.starts_with("${") && s.ends_with('}') => {
            let expr = &s[2..s.len() - 1];
            let (node, attr) = expr.split_once('.').unwrap_or((expr, ""));
            match attr {
                "arn" => json!(format!("arn:aws:fake:{}:{}:{}", REGION, ACCOUNT, node)),
                "dkimSigningAttributes.tokens" => json!(["tok1", "tok2", "tok3"]),
                "domainValidationOptions" => json!([{
                    "resourceRecordName": "_abc.track.example.com.",
                    "resourceRecordType": "CNAME",
                    "resourceRecordValue": "_xyz.acm-validations.aws."
                }]),
                "domainName" => json!("d111.cloudfront.net"),
                other => graph
                    .node(node)
                    .and_then(|n| n.properties.get(other).cloned())
                    .unwrap_or_else(|| json!(format!("{}-{}", node, other))),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(graph, v)).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn apply(&self, stack_id: &str, graph: &ResourceGraph) -> Result<FlatOutputs> {
        self.applied.lock().unwrap().push(graph.clone());
        // the stack exists as soon as the engine starts
        self.stacks
            .lock()
            .unwrap()
            .entry(stack_id.to_string())
            .or_default();

        let failing = self.failing.lock().unwrap().clone();
        if let Some(node) = graph.nodes.iter().find(|n| failing.contains(&n.group)) {
            return Err(StackError::Engine(format!("creating {} failed", node.name)));
        }

        let outputs: FlatOutputs = graph
            .outputs
            .iter()
            .map(|(name, output)| (name.clone(), resolve(graph, &output.value)))
            .collect();
        self.stacks
            .lock()
            .unwrap()
            .insert(stack_id.to_string(), outputs.clone());
        Ok(outputs)
    }

    async fn apply_targeted(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        targets: &BTreeSet<ResourceGroup>,
    ) -> Result<FlatOutputs> {
        self.applied.lock().unwrap().push(graph.clone());

        let failing = self.failing.lock().unwrap().clone();
        if let Some(node) = graph
            .nodes
            .iter()
            .find(|n| targets.contains(&n.group) && failing.contains(&n.group))
        {
            return Err(StackError::Engine(format!("creating {} failed", node.name)));
        }

        // untargeted outputs keep their last value
        let mut stacks = self.stacks.lock().unwrap();
        let outputs = stacks.entry(stack_id.to_string()).or_default();
        for (name, output) in &graph.outputs {
            if targets.contains(&output.group) {
                outputs.insert(name.clone(), resolve(graph, &output.value));
            }
        }
        Ok(outputs.clone())
    }

    async fn destroy(&self, stack_id: &str) -> Result<()> {
        match self.stacks.lock().unwrap().remove(stack_id) {
            Some(_) => Ok(()),
            None => Err(StackError::StackNotFound(stack_id.to_string())),
        }
    }

    async fn outputs(&self, stack_id: &str) -> Result<FlatOutputs> {
        self.stacks
            .lock()
            .unwrap()
            .get(stack_id)
            .cloned()
            .ok_or_else(|| StackError::StackNotFound(stack_id.to_string()))
    }
}

pub struct FakeAccount;

#[async_trait]
impl AccountApi for FakeAccount {
    async fn caller_account(&self) -> Result<String> {
        Ok(ACCOUNT.to_string())
    }

    async fn find_oidc_provider(&self, _issuer: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct FakeIdentities {
    pub identities: Mutex<BTreeMap<String, IdentityStatus>>,
}

impl FakeIdentities {
    pub fn add(&self, name: &str, config_set: Option<&str>) {
        self.identities.lock().unwrap().insert(
            name.to_string(),
            IdentityStatus {
                name: name.to_string(),
                identity_type: IdentityType::of(name),
                verified: true,
                dkim_status: DkimStatus::Success,
                dkim_tokens: vec!["a1".into(), "b2".into(), "c3".into()],
                config_set: config_set.map(str::to_string),
                mail_from_domain: None,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<IdentityStatus> {
        self.identities.lock().unwrap().get(name).cloned()
    }

    pub fn update(&self, name: &str, change: impl FnOnce(&mut IdentityStatus)) {
        if let Some(status) = self.identities.lock().unwrap().get_mut(name) {
            change(status);
        }
    }
}

#[async_trait]
impl IdentityApi for FakeIdentities {
    async fn list_identities(&self) -> Result<Vec<String>> {
        Ok(self.identities.lock().unwrap().keys().cloned().collect())
    }

    async fn identity_status(&self, name: &str) -> Result<Option<IdentityStatus>> {
        Ok(self.get(name))
    }

    async fn set_configuration_set(&self, identity: &str, config_set: Option<&str>) -> Result<()> {
        let mut identities = self.identities.lock().unwrap();
        let status = identities
            .get_mut(identity)
            .ok_or_else(|| StackError::ResourceNotFound(identity.to_string()))?;
        status.config_set = config_set.map(str::to_string);
        Ok(())
    }

    async fn set_mail_from(&self, domain: &str, mail_from: Option<&str>) -> Result<()> {
        let mut identities = self.identities.lock().unwrap();
        let status = identities
            .get_mut(domain)
            .ok_or_else(|| StackError::ResourceNotFound(domain.to_string()))?;
        status.mail_from_domain = mail_from.map(str::to_string);
        Ok(())
    }
}

pub struct NoDistributions;

#[async_trait]
impl DistributionApi for NoDistributions {
    async fn find_by_alias(&self, _alias: &str) -> Result<Option<ExistingDistribution>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct FakeArchives {
    pub fail_link: Mutex<bool>,
    pub archives: Mutex<BTreeMap<String, Option<String>>>,
    /// Key passed to each `create_archive`
    pub kms_keys: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl ArchiveApi for FakeArchives {
    async fn create_archive(
        &self,
        name: &str,
        _retention: ArchiveRetention,
        kms_key_arn: Option<&str>,
    ) -> Result<ArchiveHandle> {
        self.kms_keys
            .lock()
            .unwrap()
            .push(kms_key_arn.map(str::to_string));
        let id = format!("{}-{}", name, self.archives.lock().unwrap().len());
        self.archives.lock().unwrap().insert(id.clone(), None);
        Ok(ArchiveHandle {
            arn: format!("arn:aws:ses:{}:{}:mailmanager-archive/{}", REGION, ACCOUNT, id),
            id,
        })
    }

    async fn link_archive(&self, config_set: &str, archive_arn: &str) -> Result<()> {
        if *self.fail_link.lock().unwrap() {
            return Err(StackError::api("sesv2", Some("BadRequestException"), "link refused"));
        }
        let id = archive_arn.rsplit('/').next().unwrap_or_default().to_string();
        self.archives
            .lock()
            .unwrap()
            .insert(id, Some(config_set.to_string()));
        Ok(())
    }

    async fn unlink_archive(&self, _config_set: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_archive(&self, archive_id: &str) -> Result<()> {
        self.archives
            .lock()
            .unwrap()
            .remove(archive_id)
            .map(|_| ())
            .ok_or_else(|| StackError::ResourceNotFound(archive_id.to_string()))
    }
}

/// Resolver answering from a fixed table
#[derive(Default)]
pub struct FakeResolver {
    pub answers: HashMap<String, Vec<String>>,
}

impl FakeResolver {
    pub fn publish(&mut self, name: &str, value: &str) {
        self.answers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
}

#[async_trait]
impl DnsResolver for FakeResolver {
    async fn resolve(
        &self,
        name: &str,
        _record_type: mailstack_cloud::dns::RecordType,
    ) -> Result<Vec<String>> {
        Ok(self.answers.get(name).cloned().unwrap_or_default())
    }
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub identities: Arc<FakeIdentities>,
    pub archives: Arc<FakeArchives>,
    pub orchestrator: Orchestrator,
    #[allow(dead_code)]
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(LifecycleOptions::default())
    }

    /// Harness with an event-processor artifact added to `options`
    pub fn with_options(options: LifecycleOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("event-processor.zip");
        std::fs::write(&artifact, b"zip").unwrap();

        let engine = Arc::new(FakeEngine::default());
        let identities = Arc::new(FakeIdentities::default());
        let archives = Arc::new(FakeArchives::default());
        let cloud = CloudApis {
            account: Arc::new(FakeAccount),
            identities: identities.clone(),
            distributions: Arc::new(NoDistributions),
            archives: archives.clone(),
            zones: Vec::new(),
        };
        let orchestrator = Orchestrator::new(
            engine.clone(),
            cloud,
            MetadataStore::new(dir.path().join("connections")),
            LifecycleOptions {
                function_artifact: Some(artifact),
                ..options
            },
        );

        Self {
            engine,
            identities,
            archives,
            orchestrator,
            dir,
        }
    }

    pub fn stack_id(&self) -> String {
        format!("mailstack-{}-{}", ACCOUNT, REGION)
    }
}
