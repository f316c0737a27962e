//! Dockerinfo: container-name to endpoint mapping consumed during dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;

/// Network endpoint of one service container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub address: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Base URL for the service's control interface.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Wire form of a dockerinfo document:
/// `{"docker_info_list": [{"container_name", "ip_address", "port"}, ...]}`.
/// Ports arrive as strings and must parse as `u16`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerInfoDoc {
    pub docker_info_list: Vec<DockerInfoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerInfoEntry {
    pub container_name: String,
    pub ip_address: String,
    pub port: String,
}

/// Validated container-name to endpoint map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerInfo {
    endpoints: BTreeMap<String, ServiceEndpoint>,
}

impl DockerInfo {
    pub fn parse(doc: &DockerInfoDoc) -> Result<Self, BlueprintError> {
        if doc.docker_info_list.is_empty() {
            return Err(BlueprintError::InvalidStructure(
                "docker_info_list must not be empty".to_string(),
            ));
        }

        let mut endpoints = BTreeMap::new();
        for entry in &doc.docker_info_list {
            if entry.container_name.trim().is_empty() {
                return Err(BlueprintError::InvalidStructure(
                    "container_name must not be empty".to_string(),
                ));
            }
            if entry.ip_address.trim().is_empty() {
                return Err(BlueprintError::InvalidStructure(format!(
                    "ip_address missing for {:?}",
                    entry.container_name
                )));
            }
            let port: u16 = entry.port.parse().map_err(|_| BlueprintError::InvalidPort {
                container: entry.container_name.clone(),
                port: entry.port.clone(),
            })?;
            endpoints.insert(
                entry.container_name.clone(),
                ServiceEndpoint {
                    address: entry.ip_address.clone(),
                    port,
                },
            );
        }
        Ok(Self { endpoints })
    }

    pub fn endpoint(&self, container: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.get(container)
    }

    pub fn containers(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(entries: &[(&str, &str, &str)]) -> DockerInfoDoc {
        DockerInfoDoc {
            docker_info_list: entries
                .iter()
                .map(|(name, ip, port)| DockerInfoEntry {
                    container_name: name.to_string(),
                    ip_address: ip.to_string(),
                    port: port.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_and_resolve() {
        let info = DockerInfo::parse(&doc(&[("a", "10.0.0.5", "8001"), ("b", "10.0.0.6", "8002")]))
            .unwrap();

        let endpoint = info.endpoint("a").unwrap();
        assert_eq!(endpoint.base_url(), "http://10.0.0.5:8001");
        assert!(info.endpoint("missing").is_none());
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        let err = DockerInfo::parse(&doc(&[("a", "10.0.0.5", "eighty")])).unwrap_err();
        assert!(matches!(err, BlueprintError::InvalidPort { .. }));
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = DockerInfo::parse(&DockerInfoDoc {
            docker_info_list: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, BlueprintError::InvalidStructure(_)));
    }
}
