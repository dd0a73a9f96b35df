// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::derive_partial_eq_without_eq)]

//! Protobuf and gRPC types for the device manager agent.
//!
//! The definitions mirror `proto/devicemanager.proto` and are checked in so
//! that building the workspace does not need `protoc`. Messages also derive
//! serde for JSON debugging output.

/// Device manager types (package `devicemanager`).
pub mod devicemanager {
    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct GetAvailableDevicesRequest {
        #[prost(string, tag = "1")]
        pub vendor: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub model: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct FreeDeviceResources {
        #[prost(string, tag = "1")]
        pub device_id: ::prost::alloc::string::String,
        #[prost(double, tag = "2")]
        pub requests: f64,
        #[prost(double, tag = "3")]
        pub memory: f64,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct GetAvailableDevicesResponse {
        #[prost(message, repeated, tag = "1")]
        pub free: ::prost::alloc::vec::Vec<FreeDeviceResources>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct ReservePodQuotaRequest {
        #[prost(string, tag = "1")]
        pub device_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub pod_id: ::prost::alloc::string::String,
        #[prost(double, tag = "3")]
        pub requests: f64,
        #[prost(double, tag = "4")]
        pub memory: f64,
        #[prost(double, tag = "5")]
        pub limit: f64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct ReservePodQuotaResponse {}

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct UnreservePodQuotaRequest {
        #[prost(string, tag = "1")]
        pub device_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub pod_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    pub struct UnreservePodQuotaResponse {}

    /// Client stub for `devicemanager.DeviceManager`.
    pub mod device_manager_client {
        #![allow(
            unused_variables,
            dead_code,
            missing_docs,
            clippy::wildcard_imports,
            clippy::let_unit_value
        )]
        use tonic::codegen::*;

        const SERVICE: &str = "devicemanager.DeviceManager";

        #[derive(Debug, Clone)]
        pub struct DeviceManagerClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl<T> DeviceManagerClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
        {
            pub fn new(inner: T) -> Self {
                let inner = tonic::client::Grpc::new(inner);
                Self { inner }
            }

            async fn ready(&mut self) -> std::result::Result<(), tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })
            }

            pub async fn get_available_devices(
                &mut self,
                request: impl tonic::IntoRequest<super::GetAvailableDevicesRequest>,
            ) -> std::result::Result<tonic::Response<super::GetAvailableDevicesResponse>, tonic::Status>
            {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/devicemanager.DeviceManager/GetAvailableDevices",
                );
                let mut req = request.into_request();
                req.extensions_mut()
                    .insert(GrpcMethod::new(SERVICE, "GetAvailableDevices"));
                self.inner.unary(req, path, codec).await
            }

            pub async fn reserve_pod_quota(
                &mut self,
                request: impl tonic::IntoRequest<super::ReservePodQuotaRequest>,
            ) -> std::result::Result<tonic::Response<super::ReservePodQuotaResponse>, tonic::Status>
            {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/devicemanager.DeviceManager/ReservePodQuota",
                );
                let mut req = request.into_request();
                req.extensions_mut()
                    .insert(GrpcMethod::new(SERVICE, "ReservePodQuota"));
                self.inner.unary(req, path, codec).await
            }

            pub async fn unreserve_pod_quota(
                &mut self,
                request: impl tonic::IntoRequest<super::UnreservePodQuotaRequest>,
            ) -> std::result::Result<tonic::Response<super::UnreservePodQuotaResponse>, tonic::Status>
            {
                self.ready().await?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/devicemanager.DeviceManager/UnreservePodQuota",
                );
                let mut req = request.into_request();
                req.extensions_mut()
                    .insert(GrpcMethod::new(SERVICE, "UnreservePodQuota"));
                self.inner.unary(req, path, codec).await
            }
        }
    }
}

pub use devicemanager::device_manager_client::DeviceManagerClient;
