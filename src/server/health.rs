//! Standard `grpc.health.v1.Health` endpoint backed by [`HealthRegistry`]
//!
//! - `Check("")` - aggregate status of every dependency
//! - `Check(name)` - status of one exposed service, `UNKNOWN` if never recorded
//! - `Watch` - accepted and completed immediately without any update

use crate::health::{HealthRegistry, ServingStatus};
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::debug;

/// Health-check service reading the statuses published by the aggregator
#[derive(Debug, Clone)]
pub struct HealthService {
    registry: HealthRegistry,
}

impl HealthService {
    pub fn new(registry: HealthRegistry) -> Self {
        Self { registry }
    }

    pub fn into_server(self) -> HealthServer<Self> {
        HealthServer::new(self)
    }
}

fn wire_status(status: ServingStatus) -> WireStatus {
    match status {
        ServingStatus::Unknown => WireStatus::Unknown,
        ServingStatus::Serving => WireStatus::Serving,
        ServingStatus::NotServing => WireStatus::NotServing,
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    type WatchStream = futures::stream::Empty<Result<HealthCheckResponse, Status>>;

    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        let status = self.registry.status(&service);

        debug!(service = %service, status = ?status, "Health check");

        Ok(Response::new(HealthCheckResponse {
            status: wire_status(status) as i32,
        }))
    }

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        debug!(service = %request.get_ref().service, "Health watch not supported, closing stream");
        Ok(Response::new(futures::stream::empty()))
    }
}
