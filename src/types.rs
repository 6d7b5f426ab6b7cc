use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a service: the owning host plus the service description.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId {
    pub host_name: String,
    pub service_description: String,
}

impl ServiceId {
    pub fn new(host_name: impl Into<String>, service_description: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            service_description: service_description.into(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host_name, self.service_description)
    }
}

impl<H: Into<String>, S: Into<String>> From<(H, S)> for ServiceId {
    fn from((host, service): (H, S)) -> Self {
        ServiceId::new(host, service)
    }
}

/// Retained state for every host and service of one pass.
///
/// Services are serialized as a list of `{host_name, service_description, data}`
/// entries because JSON objects only accept string keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: serde::de::DeserializeOwned"
))]
pub struct RetentionData<T> {
    #[serde(default)]
    pub hosts: BTreeMap<String, T>,
    #[serde(default, with = "service_entries")]
    pub services: BTreeMap<ServiceId, T>,
}

impl<T> Default for RetentionData<T> {
    fn default() -> Self {
        Self {
            hosts: BTreeMap::new(),
            services: BTreeMap::new(),
        }
    }
}

impl<T> RetentionData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host_name: impl Into<String>, data: T) -> Self {
        self.hosts.insert(host_name.into(), data);
        self
    }

    pub fn with_service(mut self, id: impl Into<ServiceId>, data: T) -> Self {
        self.services.insert(id.into(), data);
        self
    }

    pub fn len(&self) -> usize {
        self.hosts.len() + self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.services.is_empty()
    }

    /// The identities this data set covers, in the shape `load` expects.
    pub fn identities(&self) -> RetentionIdentities {
        RetentionIdentities {
            hosts: self.hosts.keys().cloned().collect(),
            services: self.services.keys().cloned().collect(),
        }
    }
}

/// Hosts and services the daemon currently tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionIdentities {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub services: Vec<ServiceId>,
}

mod service_entries {
    use super::ServiceId;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct EntryRef<'a, T> {
        host_name: &'a str,
        service_description: &'a str,
        data: &'a T,
    }

    #[derive(Deserialize)]
    #[serde(bound(deserialize = "T: DeserializeOwned"))]
    struct Entry<T> {
        host_name: String,
        service_description: String,
        data: T,
    }

    pub fn serialize<S, T>(map: &BTreeMap<ServiceId, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.iter().map(|(id, data)| EntryRef {
            host_name: &id.host_name,
            service_description: &id.service_description,
            data,
        }))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<ServiceId, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let entries: Vec<Entry<T>> = Vec::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| (ServiceId::new(e.host_name, e.service_description), e.data))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_services_serialize_as_entry_list() {
        let data = RetentionData::new()
            .with_host("web1", json!({"state": 0}))
            .with_service(("web1", "HTTP"), json!({"state": 2}));

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["hosts"]["web1"]["state"], 0);
        assert_eq!(value["services"][0]["host_name"], "web1");
        assert_eq!(value["services"][0]["service_description"], "HTTP");
        assert_eq!(value["services"][0]["data"]["state"], 2);
    }

    #[test]
    fn test_parse_from_json_file_shape() {
        let raw = r#"{
            "hosts": {"db1": {"last_chk": 1700000000}},
            "services": [
                {"host_name": "db1", "service_description": "Disk /var", "data": {"acked": true}}
            ]
        }"#;
        let data: RetentionData<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(data.len(), 2);
        let id = ServiceId::new("db1", "Disk /var");
        assert_eq!(data.services[&id]["acked"], true);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let data: RetentionData<serde_json::Value> = serde_json::from_str("{}").unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_identities_cover_every_entry() {
        let data = RetentionData::new()
            .with_host("a", 1)
            .with_host("b", 2)
            .with_service(("a", "PING"), 3);
        let ids = data.identities();
        assert_eq!(ids.hosts, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ids.services, vec![ServiceId::new("a", "PING")]);
    }
}
