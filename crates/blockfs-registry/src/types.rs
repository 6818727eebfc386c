//! Registry Record Types
//!
//! Serialized forms of the host and logical-volume records kept in the
//! coordination store. These are maintained externally (hosts register
//! themselves, operators create volumes); clients only read and mirror
//! them.

use crate::selector::EqualsPredicate;
use serde::{Deserialize, Serialize};

/// Label key that gives a logical volume its path-prefix identity.
pub const MOUNT_LABEL: &str = "mount";

/// Network configuration of a host's name service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameServiceConfig {
    pub bind_address: String,
    pub advertise_address: String,
}

/// Network configuration of a host's block service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockServiceConfig {
    pub bind_address: String,
    pub advertise_address: String,
}

/// A registered storage host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub id: String,
    pub hostname: String,
    pub name_service: NameServiceConfig,
    pub block_service: BlockServiceConfig,
}

/// A key/value label attached to a logical volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// A named group of physical volumes forming a placement unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalVolumeConfig {
    pub id: String,
    pub pv_ids: Vec<String>,
    pub labels: Vec<Label>,
}

impl LogicalVolumeConfig {
    /// The volume's mount path, if it carries a `mount` label.
    ///
    /// A volume without one is not mountable and is skipped by clients.
    pub fn mount(&self) -> Option<&str> {
        let predicate = EqualsPredicate::key_exists(MOUNT_LABEL);
        self.labels
            .iter()
            .find(|label| predicate.evaluate(&label.key, &label.value))
            .map(|label| label.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_comes_from_the_mount_label() {
        let lv = LogicalVolumeConfig {
            id: "lv0".to_string(),
            pv_ids: vec!["pv-1".to_string()],
            labels: vec![
                Label {
                    key: "tier".to_string(),
                    value: "ssd".to_string(),
                },
                Label {
                    key: "mount".to_string(),
                    value: "/data".to_string(),
                },
            ],
        };
        assert_eq!(lv.mount(), Some("/data"));
    }

    #[test]
    fn volume_without_mount_label_is_unmountable() {
        let lv = LogicalVolumeConfig {
            id: "lv1".to_string(),
            pv_ids: vec![],
            labels: vec![Label {
                key: "tier".to_string(),
                value: "hdd".to_string(),
            }],
        };
        assert_eq!(lv.mount(), None);
    }

    #[test]
    fn host_config_tolerates_missing_fields() {
        let config: HostConfig =
            serde_json::from_str(r#"{"id":"h1","hostname":"node-1"}"#).unwrap();
        assert_eq!(config.id, "h1");
        assert_eq!(config.name_service.advertise_address, "");
    }
}
