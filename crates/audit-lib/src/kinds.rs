//! Custom resource kinds counted by the audit
//!
//! The addressing of every mesh kind lives in one table so that list calls
//! never build group/version/plural triples inline.

use kube::api::{ApiResource, GroupVersionKind};

const ISTIO_NETWORKING: (&str, &str) = ("networking.istio.io", "v1alpha3");
const TETRATE_INSTALL: (&str, &str) = ("install.tetrate.io", "v1alpha1");

/// Mesh custom resources listed through the dynamic API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Gateway,
    VirtualService,
    DestinationRule,
    ServiceEntry,
    Tier1Gateway,
    IngressGateway,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Gateway,
        ResourceKind::VirtualService,
        ResourceKind::DestinationRule,
        ResourceKind::ServiceEntry,
        ResourceKind::Tier1Gateway,
        ResourceKind::IngressGateway,
    ];

    /// (group, version, kind, plural)
    fn descriptor(self) -> (&'static str, &'static str, &'static str, &'static str) {
        let ((group, version), kind, plural) = match self {
            ResourceKind::Gateway => (ISTIO_NETWORKING, "Gateway", "gateways"),
            ResourceKind::VirtualService => (ISTIO_NETWORKING, "VirtualService", "virtualservices"),
            ResourceKind::DestinationRule => {
                (ISTIO_NETWORKING, "DestinationRule", "destinationrules")
            }
            ResourceKind::ServiceEntry => (ISTIO_NETWORKING, "ServiceEntry", "serviceentries"),
            ResourceKind::Tier1Gateway => (TETRATE_INSTALL, "Tier1Gateway", "tier1gateways"),
            ResourceKind::IngressGateway => (TETRATE_INSTALL, "IngressGateway", "ingressgateways"),
        };
        (group, version, kind, plural)
    }

    pub fn kind(self) -> &'static str {
        self.descriptor().2
    }

    pub fn plural(self) -> &'static str {
        self.descriptor().3
    }

    /// Build the dynamic API descriptor for this kind
    pub fn api_resource(self) -> ApiResource {
        let (group, version, kind, plural) = self.descriptor();
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
    }
}
