//! Kubernetes resource probe.
//!
//! Performs `create`, `delete`, `present` or `absent` against a dynamically
//! typed resource. Explicit resource names take priority over selectors.

use super::result::ProbeResultStore;
use super::template;
use super::types::{K8sInputs, K8sOperation, Probe};
use crate::error::{FaultlineError, Result};
use crate::retry::RetryPolicy;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::fmt;
use tracing::{debug, error, info};

/// Group, version and plural resource name of a dynamic resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

impl From<&K8sInputs> for GroupVersionResource {
    fn from(inputs: &K8sInputs) -> Self {
        Self::new(&inputs.group, &inputs.version, &inputs.resource)
    }
}

// ============================================================================
// Resource Client
// ============================================================================

/// Dynamic Kubernetes client used by resource probes.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Create the object described by a YAML manifest.
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &str,
    ) -> Result<()>;

    /// Names of objects matching the selectors.
    async fn list(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Vec<String>>;

    /// Fetch an object by name. `None` when it does not exist.
    async fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<String>>;

    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;
}

/// [`ResourceClient`] backed by a kube client.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig or in-cluster config.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn api(&self, gvr: &GroupVersionResource, kind: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            api_version: gvr.api_version(),
            kind: kind.to_string(),
            plural: gvr.resource.clone(),
        };
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &str,
    ) -> Result<()> {
        let object: DynamicObject = serde_yaml::from_str(manifest)?;
        let kind = object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default();
        let namespace = namespace.map(str::to_string).or_else(|| object.namespace());

        let created = self
            .api(gvr, &kind, namespace.as_deref())
            .create(&PostParams::default(), &object)
            .await?;
        debug!(resource = %gvr, name = %created.name_any(), "Created resource");
        Ok(())
    }

    async fn list(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Vec<String>> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        if !field_selector.is_empty() {
            params = params.fields(field_selector);
        }
        let list = self.api(gvr, "", namespace).list(&params).await?;
        Ok(list.items.iter().map(|o| o.name_any()).collect())
    }

    async fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<String>> {
        let object = self.api(gvr, "", namespace).get_opt(name).await?;
        Ok(object.map(|o| o.name_any()))
    }

    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.api(gvr, "", namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

// ============================================================================
// Operations
// ============================================================================

fn parse_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Target<'a> {
    probe: &'a str,
    gvr: GroupVersionResource,
    namespace: Option<&'a str>,
    label_selector: String,
    field_selector: String,
    names: Vec<String>,
}

impl Target<'_> {
    fn fail(&self, reason: String) -> FaultlineError {
        FaultlineError::probe_failed(self.probe, reason)
    }

    async fn list(&self, client: &dyn ResourceClient) -> Result<Vec<String>> {
        client
            .list(&self.gvr, self.namespace, &self.label_selector, &self.field_selector)
            .await
            .map_err(|e| {
                self.fail(format!(
                    "unable to list the resources with matching selector, err: {}",
                    e
                ))
            })
    }

    fn no_match(&self) -> FaultlineError {
        self.fail(format!(
            "no resource found with provided {{labelSelectors: {}, fieldSelectors: {}}} selectors",
            self.label_selector, self.field_selector
        ))
    }

    async fn all_named_present(&self, client: &dyn ResourceClient) -> Result<()> {
        for name in &self.names {
            match client.get(&self.gvr, self.namespace, name).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Err(self.fail(format!("unable to get the resources with name {}", name)))
                }
                Err(e) => {
                    return Err(self.fail(format!(
                        "unable to get the resources with name {}, err: {}",
                        name, e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn present(&self, client: &dyn ResourceClient) -> Result<()> {
        if !self.names.is_empty() {
            return self.all_named_present(client).await;
        }
        if self.list(client).await?.is_empty() {
            return Err(self.no_match());
        }
        Ok(())
    }

    async fn absent(&self, client: &dyn ResourceClient) -> Result<()> {
        if !self.names.is_empty() {
            for name in &self.names {
                match client.get(&self.gvr, self.namespace, name).await {
                    Ok(None) => {}
                    Ok(Some(_)) => {
                        return Err(self.fail(format!(
                            "resource '{}' exists but it is expected to be absent",
                            name
                        )))
                    }
                    Err(e) => {
                        return Err(self.fail(format!(
                            "unable to get the resources with name {} from k8s, err: {}",
                            name, e
                        )))
                    }
                }
            }
            return Ok(());
        }

        let found = self.list(client).await?;
        if !found.is_empty() {
            return Err(self.fail(format!(
                "resource with {{labelSelectors: {}, fieldSelectors: {}}} should not exists, found {} resources with matching selectors",
                self.label_selector,
                self.field_selector,
                found.len()
            )));
        }
        Ok(())
    }

    async fn delete(&self, client: &dyn ResourceClient) -> Result<()> {
        let names = if !self.names.is_empty() {
            self.all_named_present(client).await?;
            self.names.clone()
        } else {
            let found = self.list(client).await?;
            if found.is_empty() {
                return Err(self.no_match());
            }
            found
        };

        for name in &names {
            client
                .delete(&self.gvr, self.namespace, name)
                .await
                .map_err(|e| self.fail(e.to_string()))?;
        }
        Ok(())
    }

    async fn create(&self, client: &dyn ResourceClient, manifest: Option<&str>) -> Result<()> {
        let manifest = manifest.ok_or_else(|| {
            FaultlineError::evaluation(self.probe, "create operation requires a manifest in data")
        })?;
        client
            .create(&self.gvr, self.namespace, manifest)
            .await
            .map_err(|e| self.fail(e.to_string()))
    }
}

pub(crate) async fn run(
    client: Option<&dyn ResourceClient>,
    probe: &Probe,
    inputs: &K8sInputs,
    results: &ProbeResultStore,
    policy: &RetryPolicy,
) -> Result<String> {
    let client = client.ok_or_else(|| {
        FaultlineError::Config(format!(
            "no Kubernetes client configured for k8s probe '{}'",
            probe.name
        ))
    })?;

    let artifacts = results.artifacts();
    let target = Target {
        probe: &probe.name,
        gvr: GroupVersionResource::from(inputs),
        namespace: inputs.namespace.as_deref(),
        label_selector: template::render(&inputs.label_selector, &artifacts)?,
        field_selector: template::render(&inputs.field_selector, &artifacts)?,
        names: parse_names(&template::render(&inputs.resource_names, &artifacts)?),
    };

    info!(
        probe = %probe.name,
        resource = %target.gvr,
        namespace = ?target.namespace,
        operation = %inputs.operation,
        "[Probe]: The k8s probe information"
    );

    let id = probe.id();
    policy
        .try_with_timeout(|_| {
            let target = &target;
            let id = &id;
            async move {
                results.increment_run_count(id);
                let outcome = match inputs.operation {
                    K8sOperation::Create => target.create(client, inputs.data.as_deref()).await,
                    K8sOperation::Delete => target.delete(client).await,
                    K8sOperation::Present => target.present(client).await,
                    K8sOperation::Absent => target.absent(client).await,
                };
                if let Err(e) = outcome {
                    error!(probe = %probe.name, error = %e, "The k8s probe has Failed");
                    return Err(e);
                }
                Ok(format!(
                    "Probe is successfully performed the '{}' operation on kubernetes resource",
                    inputs.operation
                ))
            }
        })
        .await
}
