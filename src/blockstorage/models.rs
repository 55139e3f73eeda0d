use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DefinedTags = BTreeMap<String, BTreeMap<String, serde_json::Value>>;
pub type FreeformTags = BTreeMap<String, String>;

crate::oci_enum! {
    pub enum VolumeLifecycleState {
        Provisioning => "PROVISIONING",
        Restoring => "RESTORING",
        Available => "AVAILABLE",
        Terminating => "TERMINATING",
        Terminated => "TERMINATED",
        Faulty => "FAULTY",
    }
}

crate::oci_enum! {
    pub enum ListVolumesSortBy {
        TimeCreated => "TIMECREATED",
        DisplayName => "DISPLAYNAME",
    }
}

crate::oci_enum! {
    pub enum SortOrder {
        Asc => "ASC",
        Desc => "DESC",
    }
}

/// Where a new volume's data comes from, keyed on `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VolumeSourceDetails {
    #[serde(rename = "volume")]
    Volume { id: String },
    #[serde(rename = "volumeBackup")]
    VolumeBackup { id: String },
    #[serde(rename = "blockVolumeReplica")]
    BlockVolumeReplica { id: String },
    /// A source type added to the service after this crate was released.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub availability_domain: String,
    pub compartment_id: String,
    pub display_name: String,
    pub id: String,
    pub lifecycle_state: VolumeLifecycleState,
    #[serde(rename = "sizeInMBs")]
    pub size_in_mbs: i64,
    pub time_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_tags: Option<DefinedTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<FreeformTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hydrated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(rename = "vpusPerGB", default, skip_serializing_if = "Option::is_none")]
    pub vpus_per_gb: Option<i64>,
    #[serde(rename = "sizeInGBs", default, skip_serializing_if = "Option::is_none")]
    pub size_in_gbs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_details: Option<VolumeSourceDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_tune_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeDetails {
    pub availability_domain: String,
    pub compartment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "sizeInGBs", default, skip_serializing_if = "Option::is_none")]
    pub size_in_gbs: Option<i64>,
    #[serde(rename = "vpusPerGB", default, skip_serializing_if = "Option::is_none")]
    pub vpus_per_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_details: Option<VolumeSourceDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_backup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_tune_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_tags: Option<DefinedTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<FreeformTags>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVolumeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "sizeInGBs", default, skip_serializing_if = "Option::is_none")]
    pub size_in_gbs: Option<i64>,
    #[serde(rename = "vpusPerGB", default, skip_serializing_if = "Option::is_none")]
    pub vpus_per_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_tune_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_tags: Option<DefinedTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<FreeformTags>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeVolumeCompartmentDetails {
    pub compartment_id: String,
}

#[cfg(test)]
mod tests {
    use super::{CreateVolumeDetails, Volume, VolumeLifecycleState, VolumeSourceDetails};

    #[test]
    fn volume_decodes_wire_names_and_ignores_unknown_fields() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "availabilityDomain": "Uocm:PHX-AD-1",
            "compartmentId": "ocid1.compartment.oc1..c",
            "displayName": "data",
            "id": "ocid1.volume.oc1..v",
            "lifecycleState": "available",
            "sizeInMBs": 51200,
            "sizeInGBs": 50,
            "vpusPerGB": 10,
            "timeCreated": "2016-08-25T21:10:29.600Z",
            "sourceDetails": {"type": "volumeBackup", "id": "ocid1.volumebackup.oc1..b"},
            "someFutureField": [1, 2, 3]
        }))
        .expect("volume");
        assert_eq!(volume.lifecycle_state, VolumeLifecycleState::Available);
        assert_eq!(volume.size_in_gbs, Some(50));
        assert_eq!(
            volume.source_details,
            Some(VolumeSourceDetails::VolumeBackup {
                id: "ocid1.volumebackup.oc1..b".to_owned()
            })
        );
    }

    #[test]
    fn unknown_source_type_and_lifecycle_state_are_tolerated() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "availabilityDomain": "AD-1",
            "compartmentId": "c",
            "displayName": "d",
            "id": "v",
            "lifecycleState": "MIGRATING",
            "sizeInMBs": 1024,
            "timeCreated": "2016-08-25T21:10:29.600Z",
            "sourceDetails": {"type": "quantumSnapshot", "id": "q"}
        }))
        .expect("volume");
        assert_eq!(
            volume.lifecycle_state,
            VolumeLifecycleState::Unknown("MIGRATING".to_owned())
        );
        assert_eq!(volume.source_details, Some(VolumeSourceDetails::Unknown));
    }

    #[test]
    fn create_details_omit_unset_fields() {
        let details = CreateVolumeDetails {
            availability_domain: "AD-1".to_owned(),
            compartment_id: "c".to_owned(),
            size_in_gbs: Some(100),
            source_details: Some(VolumeSourceDetails::Volume { id: "src".to_owned() }),
            ..CreateVolumeDetails::default()
        };
        assert_eq!(
            serde_json::to_value(&details).expect("encode"),
            serde_json::json!({
                "availabilityDomain": "AD-1",
                "compartmentId": "c",
                "sizeInGBs": 100,
                "sourceDetails": {"type": "volume", "id": "src"}
            })
        );
    }
}
