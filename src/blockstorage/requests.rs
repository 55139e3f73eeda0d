use http::Method;

use super::models::{
    ChangeVolumeCompartmentDetails, CreateVolumeDetails, ListVolumesSortBy, SortOrder,
    UpdateVolumeDetails, Volume, VolumeLifecycleState,
};
use crate::Result;
use crate::binding::{OPC_REQUEST_ID_HEADER, OciRequest, OciResponse, RequestDescriptor, ResponseBinder};
use crate::enums::validate_enum;
use crate::execute::OperationSpec;
use crate::pagination::{PageableRequest, PageableResponse};
use crate::response::RawResponse;
use crate::retry::RetryPolicy;

pub const GET_VOLUME: OperationSpec = OperationSpec {
    name: "GetVolume",
    method: Method::GET,
    path: "/volumes/{volumeId}",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/GetVolume",
    ),
    retry_token: false,
};

pub const LIST_VOLUMES: OperationSpec = OperationSpec {
    name: "ListVolumes",
    method: Method::GET,
    path: "/volumes",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/ListVolumes",
    ),
    retry_token: false,
};

pub const CREATE_VOLUME: OperationSpec = OperationSpec {
    name: "CreateVolume",
    method: Method::POST,
    path: "/volumes",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/CreateVolume",
    ),
    retry_token: true,
};

pub const UPDATE_VOLUME: OperationSpec = OperationSpec {
    name: "UpdateVolume",
    method: Method::PUT,
    path: "/volumes/{volumeId}",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/UpdateVolume",
    ),
    retry_token: false,
};

pub const DELETE_VOLUME: OperationSpec = OperationSpec {
    name: "DeleteVolume",
    method: Method::DELETE,
    path: "/volumes/{volumeId}",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/DeleteVolume",
    ),
    retry_token: false,
};

pub const CHANGE_VOLUME_COMPARTMENT: OperationSpec = OperationSpec {
    name: "ChangeVolumeCompartment",
    method: Method::POST,
    path: "/volumes/{volumeId}/actions/changeCompartment",
    api_reference_link: Some(
        "https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/ChangeVolumeCompartment",
    ),
    retry_token: true,
};

#[derive(Clone, Debug, Default)]
pub struct GetVolumeRequest {
    pub volume_id: String,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for GetVolumeRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.path_param("volumeId", &self.volume_id);
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct GetVolumeResponse {
    pub raw: RawResponse,
    pub volume: Volume,
    pub etag: Option<String>,
    pub opc_request_id: Option<String>,
}

impl OciResponse for GetVolumeResponse {
    fn from_response(response: ResponseBinder) -> Result<Self> {
        Ok(Self {
            volume: response.json_body()?,
            etag: response.header("etag")?,
            opc_request_id: response.opc_request_id(),
            raw: response.into_raw(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListVolumesRequest {
    pub compartment_id: Option<String>,
    pub availability_domain: Option<String>,
    pub limit: Option<i32>,
    pub page: Option<String>,
    pub display_name: Option<String>,
    pub sort_by: Option<ListVolumesSortBy>,
    pub sort_order: Option<SortOrder>,
    pub volume_group_id: Option<String>,
    pub lifecycle_state: Option<VolumeLifecycleState>,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for ListVolumesRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request
            .query_opt("availabilityDomain", self.availability_domain.as_ref())
            .query_opt("compartmentId", self.compartment_id.as_ref())
            .query_opt("limit", self.limit.as_ref())
            .query_opt("page", self.page.as_ref())
            .query_opt("displayName", self.display_name.as_ref())
            .query_opt("sortBy", self.sort_by.as_ref())
            .query_opt("sortOrder", self.sort_order.as_ref())
            .query_opt("volumeGroupId", self.volume_group_id.as_ref())
            .query_opt("lifecycleState", self.lifecycle_state.as_ref());
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn invalid_enum_values(&self) -> Vec<String> {
        let mut errors = Vec::new();
        validate_enum("ListVolumesSortByEnum", self.sort_by.as_ref(), &mut errors);
        validate_enum("ListVolumesSortOrderEnum", self.sort_order.as_ref(), &mut errors);
        validate_enum(
            "VolumeLifecycleStateEnum",
            self.lifecycle_state.as_ref(),
            &mut errors,
        );
        errors
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

impl PageableRequest for ListVolumesRequest {
    fn set_page(&mut self, page: Option<String>) {
        self.page = page;
    }
}

#[derive(Clone, Debug)]
pub struct ListVolumesResponse {
    pub raw: RawResponse,
    pub items: Vec<Volume>,
    pub opc_next_page: Option<String>,
    pub opc_request_id: Option<String>,
}

impl OciResponse for ListVolumesResponse {
    fn from_response(response: ResponseBinder) -> Result<Self> {
        Ok(Self {
            items: response.json_body()?,
            opc_next_page: response.opc_next_page(),
            opc_request_id: response.opc_request_id(),
            raw: response.into_raw(),
        })
    }
}

impl PageableResponse for ListVolumesResponse {
    type Item = Volume;

    fn next_page(&self) -> Option<&str> {
        self.opc_next_page.as_deref()
    }

    fn into_items(self) -> Vec<Volume> {
        self.items
    }
}

#[derive(Clone, Debug, Default)]
pub struct CreateVolumeRequest {
    pub create_volume_details: CreateVolumeDetails,
    /// Generated before the first attempt when unset.
    pub opc_retry_token: Option<String>,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for CreateVolumeRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.json_body(&self.create_volume_details)?;
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn retry_token(&self) -> Option<&str> {
        self.opc_retry_token.as_deref()
    }

    fn set_retry_token(&mut self, token: String) {
        self.opc_retry_token = Some(token);
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct CreateVolumeResponse {
    pub raw: RawResponse,
    pub volume: Volume,
    pub etag: Option<String>,
    pub opc_request_id: Option<String>,
}

impl OciResponse for CreateVolumeResponse {
    fn from_response(response: ResponseBinder) -> Result<Self> {
        Ok(Self {
            volume: response.json_body()?,
            etag: response.header("etag")?,
            opc_request_id: response.opc_request_id(),
            raw: response.into_raw(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct UpdateVolumeRequest {
    pub volume_id: String,
    pub update_volume_details: UpdateVolumeDetails,
    pub if_match: Option<String>,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for UpdateVolumeRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.path_param("volumeId", &self.volume_id);
        request.json_body(&self.update_volume_details)?;
        request.header_opt("if-match", self.if_match.as_ref())?;
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

pub type UpdateVolumeResponse = GetVolumeResponse;

#[derive(Clone, Debug, Default)]
pub struct DeleteVolumeRequest {
    pub volume_id: String,
    pub if_match: Option<String>,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for DeleteVolumeRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.path_param("volumeId", &self.volume_id);
        request.header_opt("if-match", self.if_match.as_ref())?;
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

/// Response of operations that return no body.
#[derive(Clone, Debug)]
pub struct EmptyResponse {
    pub raw: RawResponse,
    pub opc_request_id: Option<String>,
    pub opc_work_request_id: Option<String>,
}

impl OciResponse for EmptyResponse {
    fn from_response(response: ResponseBinder) -> Result<Self> {
        Ok(Self {
            opc_request_id: response.opc_request_id(),
            opc_work_request_id: response.header("opc-work-request-id")?,
            raw: response.into_raw(),
        })
    }
}

pub type DeleteVolumeResponse = EmptyResponse;

#[derive(Clone, Debug, Default)]
pub struct ChangeVolumeCompartmentRequest {
    pub volume_id: String,
    pub change_volume_compartment_details: ChangeVolumeCompartmentDetails,
    pub opc_retry_token: Option<String>,
    pub opc_request_id: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
}

impl OciRequest for ChangeVolumeCompartmentRequest {
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.path_param("volumeId", &self.volume_id);
        request.json_body(&self.change_volume_compartment_details)?;
        request.header_opt(OPC_REQUEST_ID_HEADER, self.opc_request_id.as_ref())?;
        Ok(())
    }

    fn retry_token(&self) -> Option<&str> {
        self.opc_retry_token.as_deref()
    }

    fn set_retry_token(&mut self, token: String) {
        self.opc_retry_token = Some(token);
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }
}

pub type ChangeVolumeCompartmentResponse = EmptyResponse;

#[cfg(test)]
mod tests {
    use http::Method;

    use super::{LIST_VOLUMES, ListVolumesRequest};
    use crate::binding::{OciRequest, RequestDescriptor};
    use crate::blockstorage::models::{ListVolumesSortBy, SortOrder, VolumeLifecycleState};
    use crate::region::Endpoint;

    #[test]
    fn list_request_binds_every_query_field() {
        let request = ListVolumesRequest {
            compartment_id: Some("ocid1.compartment.oc1..c".to_owned()),
            limit: Some(2),
            page: Some("cursor".to_owned()),
            sort_by: Some(ListVolumesSortBy::parse("timecreated")),
            sort_order: Some(SortOrder::Desc),
            lifecycle_state: Some(VolumeLifecycleState::Available),
            ..ListVolumesRequest::default()
        };
        assert!(request.invalid_enum_values().is_empty());
        let mut descriptor = RequestDescriptor::new(LIST_VOLUMES.name, Method::GET, LIST_VOLUMES.path);
        request.bind(&mut descriptor).expect("bind");
        let url = descriptor
            .build_url(
                &Endpoint::parse("https://iaas.us-ashburn-1.oraclecloud.com")
                    .expect("endpoint")
                    .with_base_path("20160918"),
            )
            .expect("url");
        assert_eq!(url.path(), "/20160918/volumes");
        assert_eq!(
            url.query(),
            Some(
                "compartmentId=ocid1.compartment.oc1..c&limit=2&page=cursor&sortBy=TIMECREATED&sortOrder=DESC&lifecycleState=AVAILABLE"
            )
        );
    }

    #[test]
    fn unknown_enum_values_are_reported_together() {
        let request = ListVolumesRequest {
            sort_by: Some(ListVolumesSortBy::parse("size")),
            sort_order: Some(SortOrder::parse("sideways")),
            ..ListVolumesRequest::default()
        };
        let errors = request.invalid_enum_values();
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            "unsupported enum value for ListVolumesSortByEnum: size. Supported values are: TIMECREATED,DISPLAYNAME."
        );
    }

    #[test]
    fn api_reference_links_share_the_version_prefix() {
        for spec in [
            &super::GET_VOLUME,
            &super::LIST_VOLUMES,
            &super::CREATE_VOLUME,
            &super::UPDATE_VOLUME,
            &super::DELETE_VOLUME,
            &super::CHANGE_VOLUME_COMPARTMENT,
        ] {
            let link = spec.api_reference_link.expect("link");
            assert!(
                link.starts_with("https://docs.oracle.com/iaas/api/#/en/iaas/20160918/Volume/"),
                "{link}"
            );
            assert!(link.ends_with(spec.name), "{link}");
        }
    }
}
