use std::sync::Arc;

use poem_openapi::Tags;

use crate::application::usecases::queue_status::GetQueueStatusUseCase;

#[derive(Clone)]
pub struct ApiState {
    pub queue_status_usecase: Arc<GetQueueStatusUseCase>,
}

/// Enum of API sections (tags)
#[derive(Tags)]
pub enum EndpointsTags {
    Health,
    Queue,
}
