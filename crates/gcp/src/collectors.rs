//! REST collectors for the known resource types.
//!
//! Most types are a single paged GET described by an [`Endpoint`]. IAM policy
//! and KMS need more than one call and get their own collectors.

use crate::{GcpClient, ResourceManager};
use async_trait::async_trait;
use common::{Credential, Project, ResourceSettings, ResourceType};
use crawler::{Collector, CollectorError, CollectorRegistry};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const KMS_BASE: &str = "https://cloudkms.googleapis.com/v1";

/// How a listing response is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{ key: [...], nextPageToken }`
    List(&'static str),
    /// `{ items: { scope: { key: [...] } }, nextPageToken }`
    Aggregated(&'static str),
}

/// A paged GET. `{project}` in the template is replaced by the project ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub template: &'static str,
    pub shape: Shape,
}

impl Endpoint {
    const fn list(template: &'static str, key: &'static str) -> Self {
        Self {
            template,
            shape: Shape::List(key),
        }
    }

    const fn aggregated(template: &'static str, key: &'static str) -> Self {
        Self {
            template,
            shape: Shape::Aggregated(key),
        }
    }

    pub fn url(&self, project_id: &str) -> String {
        self.template.replace("{project}", project_id)
    }

    /// The single-listing endpoint for `ty`, if it has one.
    pub fn for_type(ty: &ResourceType) -> Option<Self> {
        let endpoint = match ty {
            ResourceType::ComputeInstances => Self::aggregated(
                "https://compute.googleapis.com/compute/v1/projects/{project}/aggregated/instances",
                "instances",
            ),
            ResourceType::ComputeImages => Self::list(
                "https://compute.googleapis.com/compute/v1/projects/{project}/global/images",
                "items",
            ),
            ResourceType::MachineImages => Self::list(
                "https://compute.googleapis.com/compute/v1/projects/{project}/global/machineImages",
                "items",
            ),
            ResourceType::ComputeDisks => Self::aggregated(
                "https://compute.googleapis.com/compute/v1/projects/{project}/aggregated/disks",
                "disks",
            ),
            ResourceType::ComputeSnapshots => Self::list(
                "https://compute.googleapis.com/compute/v1/projects/{project}/global/snapshots",
                "items",
            ),
            ResourceType::StaticIps => Self::aggregated(
                "https://compute.googleapis.com/compute/v1/projects/{project}/aggregated/addresses",
                "addresses",
            ),
            ResourceType::Subnets => Self::aggregated(
                "https://compute.googleapis.com/compute/v1/projects/{project}/aggregated/subnetworks",
                "subnetworks",
            ),
            ResourceType::FirewallRules => Self::list(
                "https://compute.googleapis.com/compute/v1/projects/{project}/global/firewalls",
                "items",
            ),
            ResourceType::StorageBuckets => Self::list(
                "https://storage.googleapis.com/storage/v1/b?project={project}",
                "items",
            ),
            ResourceType::ManagedZones => Self::list(
                "https://dns.googleapis.com/dns/v1/projects/{project}/managedZones",
                "managedZones",
            ),
            ResourceType::DnsPolicies => Self::list(
                "https://dns.googleapis.com/dns/v1/projects/{project}/policies",
                "policies",
            ),
            ResourceType::SqlInstances => Self::list(
                "https://sqladmin.googleapis.com/sql/v1beta4/projects/{project}/instances",
                "items",
            ),
            ResourceType::BigQuery => Self::list(
                "https://bigquery.googleapis.com/bigquery/v2/projects/{project}/datasets",
                "datasets",
            ),
            ResourceType::PubSubSubscriptions => Self::list(
                "https://pubsub.googleapis.com/v1/projects/{project}/subscriptions",
                "subscriptions",
            ),
            ResourceType::CloudFunctions => Self::list(
                "https://cloudfunctions.googleapis.com/v1/projects/{project}/locations/-/functions",
                "functions",
            ),
            ResourceType::BigtableInstances => Self::list(
                "https://bigtableadmin.googleapis.com/v2/projects/{project}/instances",
                "instances",
            ),
            ResourceType::SpannerInstances => Self::list(
                "https://spanner.googleapis.com/v1/projects/{project}/instances",
                "instances",
            ),
            ResourceType::FilestoreInstances => Self::list(
                "https://file.googleapis.com/v1/projects/{project}/locations/-/instances",
                "instances",
            ),
            ResourceType::Endpoints => Self::list(
                "https://servicemanagement.googleapis.com/v1/services?producerProjectId={project}",
                "services",
            ),
            ResourceType::Services => Self::list(
                "https://serviceusage.googleapis.com/v1/projects/{project}/services?filter=state:ENABLED",
                "services",
            ),
            ResourceType::SourceRepos => Self::list(
                "https://sourcerepo.googleapis.com/v1/projects/{project}/repos",
                "repos",
            ),
            ResourceType::ServiceAccounts => Self::list(
                "https://iam.googleapis.com/v1/projects/{project}/serviceAccounts",
                "accounts",
            ),
            ResourceType::AppServices => Self::list(
                "https://appengine.googleapis.com/v1/apps/{project}/services",
                "services",
            ),
            ResourceType::GkeClusters => Self::list(
                "https://container.googleapis.com/v1/projects/{project}/locations/-/clusters",
                "clusters",
            ),
            ResourceType::IamPolicy | ResourceType::Kms | ResourceType::Other(_) => return None,
        };
        Some(endpoint)
    }
}

/// Collector for one [`Endpoint`].
#[derive(Debug, Clone)]
pub struct RestCollector {
    client: GcpClient,
    endpoint: Endpoint,
}

impl RestCollector {
    pub fn new(client: GcpClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Collector for RestCollector {
    async fn collect(
        &self,
        project: &Project,
        credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        let url = self.endpoint.url(&project.id);
        let items = match self.endpoint.shape {
            Shape::List(key) => self.client.list_paged(credential, &url, key).await?,
            Shape::Aggregated(key) => self.client.list_aggregated(credential, &url, key).await?,
        };
        Ok(Value::Array(items))
    }
}

/// The project's IAM policy bindings.
#[derive(Debug, Clone)]
pub struct IamPolicyCollector {
    manager: ResourceManager,
}

#[async_trait]
impl Collector for IamPolicyCollector {
    async fn collect(
        &self,
        project: &Project,
        credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        let mut policy = self.manager.iam_policy(credential, &project.id).await?;
        Ok(policy
            .get_mut("bindings")
            .map(Value::take)
            .unwrap_or(Value::Array(Vec::new())))
    }
}

/// KMS key rings across every location of the project.
#[derive(Debug, Clone)]
pub struct KmsCollector {
    client: GcpClient,
}

#[async_trait]
impl Collector for KmsCollector {
    async fn collect(
        &self,
        project: &Project,
        credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        let locations = self
            .client
            .list_paged(
                credential,
                &format!("{KMS_BASE}/projects/{}/locations", project.id),
                "locations",
            )
            .await?;

        let mut rings = Vec::new();
        for location in location_ids(&locations) {
            let url = format!(
                "{KMS_BASE}/projects/{}/locations/{location}/keyRings",
                project.id
            );
            match self.client.list_paged(credential, &url, "keyRings").await {
                Ok(found) => rings.extend(found),
                Err(e) => debug!(project = %project.id, location, error = %e, "key ring listing failed"),
            }
        }
        Ok(Value::Array(rings))
    }
}

fn location_ids(locations: &[Value]) -> Vec<&str> {
    locations
        .iter()
        .filter_map(|l| l.get("locationId").and_then(Value::as_str))
        .collect()
}

/// Registry with a collector for every known resource type.
pub fn default_registry(client: &GcpClient) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    for ty in ResourceType::KNOWN.iter() {
        let collector: Arc<dyn Collector> = match ty {
            ResourceType::IamPolicy => Arc::new(IamPolicyCollector {
                manager: ResourceManager::new(client.clone()),
            }),
            ResourceType::Kms => Arc::new(KmsCollector {
                client: client.clone(),
            }),
            other => match Endpoint::for_type(other) {
                Some(endpoint) => Arc::new(RestCollector::new(client.clone(), endpoint)),
                None => continue,
            },
        };
        registry.register(ty.clone(), collector);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_known_type_is_registered() {
        let registry = default_registry(&GcpClient::new().unwrap());
        assert_eq!(registry.len(), ResourceType::KNOWN.len());
        for ty in ResourceType::KNOWN.iter() {
            assert!(registry.contains(ty), "missing collector for {ty}");
        }
        assert!(!registry.contains(&ResourceType::from("custom")));
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint::for_type(&ResourceType::StorageBuckets).unwrap();
        assert_eq!(
            endpoint.url("acme-prod"),
            "https://storage.googleapis.com/storage/v1/b?project=acme-prod"
        );
        assert_eq!(
            Endpoint::for_type(&ResourceType::ComputeInstances).unwrap().shape,
            Shape::Aggregated("instances")
        );
        assert!(Endpoint::for_type(&ResourceType::Kms).is_none());
    }

    #[test]
    fn test_location_ids() {
        let locations = vec![
            json!({"locationId": "global", "name": "projects/p/locations/global"}),
            json!({"name": "projects/p/locations/broken"}),
            json!({"locationId": "us-east1"}),
        ];
        assert_eq!(location_ids(&locations), ["global", "us-east1"]);
    }
}
