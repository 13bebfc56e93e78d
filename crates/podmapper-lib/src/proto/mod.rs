//! Kubelet pod-resources protobuf types
//!
//! With the `proto-gen` feature the code is generated at build time by
//! tonic-build from `proto/podresources/v1alpha1/api.proto`. Otherwise the
//! checked-in stub types below are used; they are wire-compatible.

#[cfg(feature = "proto-gen")]
pub mod podresources {
    pub mod v1alpha1 {
        tonic::include_proto!("v1alpha1");
    }
}

#[cfg(not(feature = "proto-gen"))]
pub mod podresources {
    pub mod v1alpha1 {
        use prost::Message;

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodResourcesRequest {}

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodResourcesResponse {
            #[prost(message, repeated, tag = "1")]
            pub pod_resources: Vec<PodResources>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodResources {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub namespace: String,
            #[prost(message, repeated, tag = "3")]
            pub containers: Vec<ContainerResources>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerResources {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(message, repeated, tag = "2")]
            pub devices: Vec<ContainerDevices>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerDevices {
            #[prost(string, tag = "1")]
            pub resource_name: String,
            #[prost(string, repeated, tag = "2")]
            pub device_ids: Vec<String>,
        }

        pub mod pod_resources_lister_client {
            use super::*;
            use tonic::codegen::*;
            use tonic::transport::Uri;

            #[derive(Debug, Clone)]
            pub struct PodResourcesListerClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl PodResourcesListerClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> PodResourcesListerClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }

                pub async fn list(
                    &mut self,
                    request: impl tonic::IntoRequest<ListPodResourcesRequest>,
                ) -> Result<tonic::Response<ListPodResourcesResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/v1alpha1.PodResourcesLister/List",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use podresources::v1alpha1::pod_resources_lister_client::PodResourcesListerClient;
pub use podresources::v1alpha1::*;
