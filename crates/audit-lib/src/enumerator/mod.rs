//! Resource enumeration per namespace
//!
//! Lists the audited namespaces and counts services, pods and the mesh
//! custom resources in each of them, one list call per kind.

mod gateway;

pub use gateway::{
    count_hostnames, Gateway, GatewayServer, GatewaySpec, ServerPort, CROSS_CLUSTER_PORT,
};

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::cluster::ClusterApi;
use crate::config::{AuditConfig, HostnameCounting};
use crate::error::{within, Result};
use crate::kinds::ResourceKind;

/// System namespaces that are never audited
pub const SYSTEM_NAMESPACES: [&str; 5] = [
    "kube-system",
    "istio-system",
    "istio-gateway",
    "tsb",
    "cert-manager",
];

/// Exclusion set applied to the namespace list
#[derive(Debug, Clone)]
pub struct NamespaceSelector {
    excluded: HashSet<String>,
}

impl Default for NamespaceSelector {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl NamespaceSelector {
    /// Build a selector excluding the system namespaces plus `extra`
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let excluded = SYSTEM_NAMESPACES
            .iter()
            .map(|ns| ns.to_string())
            .chain(extra.into_iter().map(Into::into))
            .collect();
        Self { excluded }
    }

    pub fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded.contains(namespace)
    }

    /// Drop excluded names, keeping the order of the rest
    pub fn select(&self, namespaces: Vec<String>) -> Vec<String> {
        namespaces
            .into_iter()
            .filter(|ns| !self.is_excluded(ns))
            .collect()
    }
}

/// Resource counts for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTally {
    pub namespace: String,
    pub services: usize,
    pub pods: usize,
    pub gateways: usize,
    pub gateway_hostnames: usize,
    pub virtual_services: usize,
    pub destination_rules: usize,
    pub service_entries: usize,
    pub tier1_gateways: usize,
    pub ingress_gateways: usize,
}

impl ResourceTally {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for ResourceTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Namespace {} has {} services, {} pods, {} gateways with {} hostnames, \
             {} virtual services, {} destination rules, {} service entries, \
             {} tier1 gateway pods and {} ingressgateway pods.",
            self.namespace,
            self.services,
            self.pods,
            self.gateways,
            self.gateway_hostnames,
            self.virtual_services,
            self.destination_rules,
            self.service_entries,
            self.tier1_gateways,
            self.ingress_gateways,
        )
    }
}

/// Counts resources through a [`ClusterApi`]
pub struct Enumerator<'a> {
    cluster: &'a dyn ClusterApi,
    selector: NamespaceSelector,
    counting: HostnameCounting,
    multicluster_namespace: String,
    api_timeout: Duration,
}

impl<'a> Enumerator<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, config: &AuditConfig) -> Self {
        Self {
            cluster,
            selector: NamespaceSelector::new(config.extra_excluded_namespaces.iter().cloned()),
            counting: config.hostname_counting,
            multicluster_namespace: config.multicluster_namespace.clone(),
            api_timeout: config.api_timeout(),
        }
    }

    /// Audited namespaces in API order
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let all = within(
            "namespace list",
            self.api_timeout,
            self.cluster.list_namespaces(),
        )
        .await?;
        let total = all.len();
        let selected = self.selector.select(all);
        debug!(
            total,
            selected = selected.len(),
            "Filtered namespace list"
        );
        Ok(selected)
    }

    /// Count every audited kind in `namespace`
    pub async fn count_resources(&self, namespace: &str) -> Result<ResourceTally> {
        let mut tally = ResourceTally::new(namespace);
        let limit = self.api_timeout;

        tally.services = within(
            "service list",
            limit,
            self.cluster.count_services(namespace),
        )
        .await?;
        tally.pods = within("pod list", limit, self.cluster.count_pods(namespace)).await?;

        let gateways = within("gateway list", limit, self.cluster.list_gateways(namespace)).await?;
        tally.gateways = gateways.len();
        tally.gateway_hostnames = count_hostnames(&gateways, self.counting);

        tally.virtual_services = self
            .count_custom(ResourceKind::VirtualService, namespace)
            .await?;
        tally.destination_rules = self
            .count_custom(ResourceKind::DestinationRule, namespace)
            .await?;
        tally.service_entries = self
            .count_custom(ResourceKind::ServiceEntry, namespace)
            .await?;
        tally.tier1_gateways = self
            .count_custom(ResourceKind::Tier1Gateway, namespace)
            .await?;
        tally.ingress_gateways = self
            .count_custom(ResourceKind::IngressGateway, namespace)
            .await?;

        Ok(tally)
    }

    /// Service entries in the multicluster namespace
    pub async fn count_multicluster_service_entries(&self) -> Result<usize> {
        self.count_custom(ResourceKind::ServiceEntry, &self.multicluster_namespace)
            .await
    }

    async fn count_custom(&self, kind: ResourceKind, namespace: &str) -> Result<usize> {
        within(
            "custom resource list",
            self.api_timeout,
            self.cluster.count_custom(kind, namespace),
        )
        .await
    }
}
