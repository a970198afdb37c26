use std::sync::Arc;

use poem::Result as PoemResult;
use poem_openapi::{OpenApi, payload::Json};

use crate::{
    domain::errors::StoreError,
    presentation::http::{
        endpoints::root::{ApiState, EndpointsTags},
        responses::QueueStatusDto,
    },
};

#[derive(Clone)]
pub struct QueueEndpoints {
    state: Arc<ApiState>,
}

impl QueueEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl QueueEndpoints {
    /// Transport readiness and message counts per status.
    #[oai(path = "/status", method = "get", tag = EndpointsTags::Queue)]
    pub async fn status(&self) -> PoemResult<Json<QueueStatusDto>> {
        let status = self
            .state
            .queue_status_usecase
            .execute()
            .await
            .map_err(internal_error)?;

        Ok(Json(QueueStatusDto {
            ready: status.ready,
            pending: status.counts.pending,
            sent: status.counts.sent,
            failed: status.counts.failed,
        }))
    }
}

fn internal_error(err: StoreError) -> poem::Error {
    poem::Error::from_string(
        err.to_string(),
        poem::http::StatusCode::INTERNAL_SERVER_ERROR,
    )
}
