//! Gateway spec decoding and hostname counting

use kube::api::{DynamicObject, ResourceExt};
use serde::Deserialize;

use crate::config::HostnameCounting;
use crate::error::Error;
use crate::kinds::ResourceKind;

/// Port reserved by the mesh for cross-cluster traffic
pub const CROSS_CLUSTER_PORT: u32 = 15443;

/// A listed gateway with its decoded spec
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    pub name: String,
    pub spec: GatewaySpec,
}

/// The subset of the Gateway spec the audit reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySpec {
    #[serde(default)]
    pub servers: Vec<GatewayServer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayServer {
    #[serde(default)]
    pub port: Option<ServerPort>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServerPort {
    pub number: u32,
}

impl TryFrom<DynamicObject> for Gateway {
    type Error = Error;

    /// Decode the `spec` of a listed object; an object without one has no servers
    fn try_from(obj: DynamicObject) -> Result<Self, Self::Error> {
        let name = obj.name_any();
        let spec = match obj.data.get("spec") {
            Some(spec) => serde_json::from_value(spec.clone()).map_err(|source| Error::Decode {
                kind: ResourceKind::Gateway.kind(),
                name: name.clone(),
                source,
            })?,
            None => GatewaySpec::default(),
        };
        Ok(Gateway { name, spec })
    }
}

impl GatewayServer {
    pub fn is_cross_cluster(&self) -> bool {
        self.port.map(|p| p.number) == Some(CROSS_CLUSTER_PORT)
    }
}

/// Count hostnames over every server of every gateway, skipping the cross-cluster port.
///
/// With [`HostnameCounting::LastServer`] the last qualifying server overwrites
/// the count; with [`HostnameCounting::Sum`] the hosts are added up.
pub fn count_hostnames(gateways: &[Gateway], counting: HostnameCounting) -> usize {
    let mut hostnames = 0;
    for server in gateways.iter().flat_map(|gw| gw.spec.servers.iter()) {
        if server.is_cross_cluster() {
            continue;
        }
        match counting {
            HostnameCounting::LastServer => hostnames = server.hosts.len(),
            HostnameCounting::Sum => hostnames += server.hosts.len(),
        }
    }
    hostnames
}
