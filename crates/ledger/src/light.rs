//! Light-scan projection: keep a fixed set of fields per resource type.

use common::ResourceType;
use serde_json::{Map, Value};

/// Allow-listed fields for a resource type, or `None` if the type has no
/// light schema (its data passes through untouched).
pub fn light_fields(ty: &ResourceType) -> Option<&'static [&'static str]> {
    let fields: &'static [&'static str] = match ty {
        ResourceType::ComputeInstances => {
            &["name", "zone", "machineType", "networkInterfaces", "status"]
        }
        ResourceType::ComputeImages => &["name", "status", "diskSizeGb", "sourceDisk"],
        ResourceType::MachineImages => &[
            "name",
            "description",
            "status",
            "sourceInstance",
            "totalStorageBytes",
            "savedDisks",
        ],
        ResourceType::ComputeDisks => {
            &["name", "sizeGb", "zone", "status", "sourceImage", "users"]
        }
        ResourceType::ComputeSnapshots => &["name", "status", "sourceDisk", "downloadBytes"],
        ResourceType::ManagedZones => &["name", "dnsName", "description", "nameServers"],
        ResourceType::SqlInstances => {
            &["name", "region", "ipAddresses", "databaseVersion", "state"]
        }
        ResourceType::CloudFunctions => &[
            "name",
            "eventTrigger",
            "status",
            "entryPoint",
            "serviceAccountEmail",
        ],
        ResourceType::Kms => &["name", "primary", "purpose", "createTime"],
        ResourceType::Services => &["name"],
        _ => return None,
    };
    Some(fields)
}

/// Projects every entry of a list down to the type's allow-list.
///
/// Missing fields become `null`. Non-list data, non-object entries and types
/// without a schema are returned unchanged.
pub fn project_light(ty: &ResourceType, data: Value) -> Value {
    let Some(fields) = light_fields(ty) else {
        return data;
    };
    match data {
        Value::Array(entries) => Value::Array(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(obj) => Value::Object(keep_fields(&obj, fields)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn keep_fields(obj: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| (f.to_string(), obj.get(*f).cloned().unwrap_or(Value::Null)))
        .collect()
}
