//! Volume operations of the OCI Block Storage service, built on [`ServiceClient`].

mod models;
mod requests;

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

pub use self::models::{
    ChangeVolumeCompartmentDetails, CreateVolumeDetails, DefinedTags, FreeformTags,
    ListVolumesSortBy, SortOrder, UpdateVolumeDetails, Volume, VolumeLifecycleState,
    VolumeSourceDetails,
};
pub use self::requests::{
    CHANGE_VOLUME_COMPARTMENT, CREATE_VOLUME, ChangeVolumeCompartmentRequest,
    ChangeVolumeCompartmentResponse, CreateVolumeRequest, CreateVolumeResponse, DELETE_VOLUME,
    DeleteVolumeRequest, DeleteVolumeResponse, EmptyResponse, GET_VOLUME, GetVolumeRequest,
    GetVolumeResponse, LIST_VOLUMES, ListVolumesRequest, ListVolumesResponse, UPDATE_VOLUME,
    UpdateVolumeRequest, UpdateVolumeResponse,
};
use crate::Result;
use crate::client::{ServiceClient, ServiceClientBuilder};
use crate::config::ConfigurationProvider;
use crate::context::CallContext;
use crate::pagination::Paginator;
use crate::region::IAAS_ENDPOINT_TEMPLATE;

pub const SERVICE: &str = "Blockstorage";
pub const BASE_PATH: &str = "20160918";

#[derive(Clone, Debug)]
pub struct BlockstorageClient {
    client: ServiceClient,
}

impl BlockstorageClient {
    /// A [`ServiceClientBuilder`] preset with the service name, endpoint template and API version.
    pub fn builder(provider: Arc<dyn ConfigurationProvider>) -> ServiceClientBuilder {
        ServiceClient::builder(SERVICE, provider)
            .endpoint_template(IAAS_ENDPOINT_TEMPLATE)
            .base_path(BASE_PATH)
    }

    pub fn new(provider: Arc<dyn ConfigurationProvider>) -> Result<Self> {
        Self::builder(provider).try_build().map(Self::from_client)
    }

    pub fn from_client(client: ServiceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn get_volume(
        &self,
        ctx: &CallContext,
        request: GetVolumeRequest,
    ) -> Result<GetVolumeResponse> {
        self.client.execute(ctx, &GET_VOLUME, request).await
    }

    pub async fn list_volumes(
        &self,
        ctx: &CallContext,
        request: ListVolumesRequest,
    ) -> Result<ListVolumesResponse> {
        self.client.execute(ctx, &LIST_VOLUMES, request).await
    }

    pub async fn create_volume(
        &self,
        ctx: &CallContext,
        request: CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse> {
        self.client.execute(ctx, &CREATE_VOLUME, request).await
    }

    pub async fn update_volume(
        &self,
        ctx: &CallContext,
        request: UpdateVolumeRequest,
    ) -> Result<UpdateVolumeResponse> {
        self.client.execute(ctx, &UPDATE_VOLUME, request).await
    }

    pub async fn delete_volume(
        &self,
        ctx: &CallContext,
        request: DeleteVolumeRequest,
    ) -> Result<DeleteVolumeResponse> {
        self.client.execute(ctx, &DELETE_VOLUME, request).await
    }

    pub async fn change_volume_compartment(
        &self,
        ctx: &CallContext,
        request: ChangeVolumeCompartmentRequest,
    ) -> Result<ChangeVolumeCompartmentResponse> {
        self.client
            .execute(ctx, &CHANGE_VOLUME_COMPARTMENT, request)
            .await
    }

    /// Pages through `ListVolumes`, starting from `request.page`.
    pub fn list_volumes_paginator<'a>(
        &'a self,
        ctx: &'a CallContext,
        request: ListVolumesRequest,
    ) -> Paginator<
        ListVolumesRequest,
        impl Fn(ListVolumesRequest) -> BoxFuture<'a, Result<ListVolumesResponse>> + 'a,
    > {
        Paginator::new(request, move |page_request| {
            self.list_volumes(ctx, page_request).boxed()
        })
    }
}
