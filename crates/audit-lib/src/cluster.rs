//! Cluster client provider
//!
//! Loads credentials, builds the Kubernetes client and exposes the list
//! and port-forward operations the audit needs behind [`ClusterApi`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::{Api, DynamicObject, ListParams, ResourceExt};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::enumerator::Gateway;
use crate::error::{Error, Result};
use crate::kinds::ResourceKind;
use crate::tunnel::{EdgePodReference, PortDialer, Upstream};

/// Where to load cluster credentials from
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Explicit kubeconfig file; falls back to `KUBECONFIG`, `~/.kube/config` or in-cluster config
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,
}

/// Connection configuration plus the client built from it
#[derive(Clone)]
pub struct ClusterConnection {
    config: Config,
    client: Client,
}

impl ClusterConnection {
    /// Load credentials and build the client
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let config = match (&options.kubeconfig, &options.context) {
            (None, None) => Config::infer().await?,
            (path, context) => {
                let kube_options = KubeConfigOptions {
                    context: context.clone(),
                    ..Default::default()
                };
                match path {
                    Some(path) => {
                        let kubeconfig = Kubeconfig::read_from(path)?;
                        Config::from_custom_kubeconfig(kubeconfig, &kube_options).await?
                    }
                    None => Config::from_kubeconfig(&kube_options).await?,
                }
            }
        };

        let client = Client::try_from(config.clone())?;
        info!(
            cluster_url = %config.cluster_url,
            default_namespace = %config.default_namespace,
            "Cluster client created"
        );

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

/// Cluster operations used by the enumerator and the tunnel orchestrator
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Names of all namespaces in API order
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    async fn count_services(&self, namespace: &str) -> Result<usize>;

    async fn count_pods(&self, namespace: &str) -> Result<usize>;

    /// Count objects of a mesh custom resource kind
    async fn count_custom(&self, kind: ResourceKind, namespace: &str) -> Result<usize>;

    /// List gateways with their decoded specs
    async fn list_gateways(&self, namespace: &str) -> Result<Vec<Gateway>>;

    /// Names of pods matching a label selector, in API order
    async fn list_pod_names(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;

    /// Dialer opening port-forward streams to a pod port
    fn port_dialer(&self, pod: &EdgePodReference, port: u16) -> Arc<dyn PortDialer>;
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(connection: &ClusterConnection) -> Self {
        Self {
            client: connection.client(),
        }
    }

    fn dynamic(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn count_services(&self, namespace: &str) -> Result<usize> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items.len())
    }

    async fn count_pods(&self, namespace: &str) -> Result<usize> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items.len())
    }

    async fn count_custom(&self, kind: ResourceKind, namespace: &str) -> Result<usize> {
        let list = self
            .dynamic(kind, namespace)
            .list(&ListParams::default())
            .await?;
        debug!(
            kind = kind.kind(),
            namespace = %namespace,
            count = list.items.len(),
            "Listed custom resources"
        );
        Ok(list.items.len())
    }

    async fn list_gateways(&self, namespace: &str) -> Result<Vec<Gateway>> {
        let list = self
            .dynamic(ResourceKind::Gateway, namespace)
            .list(&ListParams::default())
            .await?;

        list.items.into_iter().map(Gateway::try_from).collect()
    }

    async fn list_pod_names(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items.iter().map(|pod| pod.name_any()).collect())
    }

    fn port_dialer(&self, pod: &EdgePodReference, port: u16) -> Arc<dyn PortDialer> {
        Arc::new(PodDialer {
            pods: Api::namespaced(self.client.clone(), &pod.namespace),
            pod_name: pod.name.clone(),
            port,
        })
    }
}

/// Opens a websocket port-forward to one pod port per dial
pub struct PodDialer {
    pods: Api<Pod>,
    pod_name: String,
    port: u16,
}

#[async_trait]
impl PortDialer for PodDialer {
    async fn dial(&self) -> Result<Upstream> {
        let mut forwarder = self.pods.portforward(&self.pod_name, &[self.port]).await?;
        let stream = forwarder.take_stream(self.port).ok_or_else(|| {
            Error::Transport(format!(
                "port {} missing from port-forward to pod {}",
                self.port, self.pod_name
            ))
        })?;
        debug!(pod = %self.pod_name, port = self.port, "Port-forward stream opened");
        Ok(Upstream::forwarded(stream, forwarder))
    }
}
