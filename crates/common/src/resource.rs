//! Resource-type names used as keys in scan configs and result records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A resource type a collector can enumerate for one project.
///
/// The known set matches the collectors shipped with the `gcp` crate. Names
/// outside it are kept as [`ResourceType::Other`] so externally registered
/// collectors still round-trip through configs and records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    ComputeInstances,
    ComputeImages,
    MachineImages,
    ComputeDisks,
    ComputeSnapshots,
    StaticIps,
    Subnets,
    FirewallRules,
    StorageBuckets,
    ManagedZones,
    DnsPolicies,
    SqlInstances,
    BigQuery,
    PubSubSubscriptions,
    CloudFunctions,
    BigtableInstances,
    SpannerInstances,
    FilestoreInstances,
    Kms,
    Endpoints,
    Services,
    SourceRepos,
    ServiceAccounts,
    IamPolicy,
    AppServices,
    GkeClusters,
    Other(String),
}

impl ResourceType {
    /// Every named variant, in the order collectors are launched.
    pub const KNOWN: [ResourceType; 26] = [
        ResourceType::IamPolicy,
        ResourceType::ServiceAccounts,
        ResourceType::ComputeInstances,
        ResourceType::ComputeImages,
        ResourceType::MachineImages,
        ResourceType::ComputeDisks,
        ResourceType::ComputeSnapshots,
        ResourceType::StaticIps,
        ResourceType::Subnets,
        ResourceType::FirewallRules,
        ResourceType::AppServices,
        ResourceType::StorageBuckets,
        ResourceType::ManagedZones,
        ResourceType::DnsPolicies,
        ResourceType::GkeClusters,
        ResourceType::SqlInstances,
        ResourceType::BigQuery,
        ResourceType::PubSubSubscriptions,
        ResourceType::CloudFunctions,
        ResourceType::BigtableInstances,
        ResourceType::SpannerInstances,
        ResourceType::FilestoreInstances,
        ResourceType::Kms,
        ResourceType::Endpoints,
        ResourceType::Services,
        ResourceType::SourceRepos,
    ];

    /// Key used in config files and output records.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::ComputeInstances => "compute_instances",
            ResourceType::ComputeImages => "compute_images",
            ResourceType::MachineImages => "machine_images",
            ResourceType::ComputeDisks => "compute_disks",
            ResourceType::ComputeSnapshots => "compute_snapshots",
            ResourceType::StaticIps => "static_ips",
            ResourceType::Subnets => "subnets",
            ResourceType::FirewallRules => "firewall_rules",
            ResourceType::StorageBuckets => "storage_buckets",
            ResourceType::ManagedZones => "managed_zones",
            ResourceType::DnsPolicies => "dns_policies",
            ResourceType::SqlInstances => "sql_instances",
            ResourceType::BigQuery => "bq",
            ResourceType::PubSubSubscriptions => "pubsub_subs",
            ResourceType::CloudFunctions => "cloud_functions",
            ResourceType::BigtableInstances => "bigtable_instances",
            ResourceType::SpannerInstances => "spanner_instances",
            ResourceType::FilestoreInstances => "filestore_instances",
            ResourceType::Kms => "kms",
            ResourceType::Endpoints => "endpoints",
            ResourceType::Services => "services",
            ResourceType::SourceRepos => "sourcerepos",
            ResourceType::ServiceAccounts => "service_accounts",
            ResourceType::IamPolicy => "iam_policy",
            ResourceType::AppServices => "app_services",
            ResourceType::GkeClusters => "gke_clusters",
            ResourceType::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ResourceType::Other(_))
    }
}

impl FromStr for ResourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::KNOWN
            .iter()
            .find(|known| known.as_str() == s)
            .cloned()
            .unwrap_or_else(|| ResourceType::Other(s.to_string())))
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ResourceType::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_parse_back() {
        for ty in ResourceType::KNOWN.iter() {
            assert_eq!(&ResourceType::from(ty.as_str()), ty);
            assert!(ty.is_known());
        }
    }

    #[test]
    fn test_unknown_name_is_other() {
        let ty = ResourceType::from("datastore_kinds");
        assert_eq!(ty, ResourceType::Other("datastore_kinds".into()));
        assert_eq!(ty.to_string(), "datastore_kinds");
        assert!(!ty.is_known());
    }

    #[test]
    fn test_known_names_are_unique() {
        let mut names: Vec<&str> = ResourceType::KNOWN.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ResourceType::KNOWN.len());
    }
}
