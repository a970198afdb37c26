use std::sync::Arc;

use poem::{Route, Server, listener::TcpListener};
use poem_openapi::OpenApiService;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::presentation::http::endpoints::{
    health::HealthEndpoints,
    queue::QueueEndpoints,
    root::ApiState,
};

pub mod endpoints;
pub mod responses;

pub fn routes(state: Arc<ApiState>, server_url: &str) -> Route {
    let api_service = OpenApiService::new(
        (HealthEndpoints, QueueEndpoints::new(state)),
        "Chat Dispatch API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("{server_url}/api"));
    let ui = api_service.swagger_ui();
    Route::new().nest("/api", api_service).nest("/", ui)
}

/// Serves the operator API in the background. The task ends with the process.
pub fn spawn(state: Arc<ApiState>, port: u16) -> JoinHandle<()> {
    let server_url = format!("http://localhost:{port}");
    let app = routes(state, &server_url);

    tokio::spawn(async move {
        info!(url = %server_url, "starting operator api");
        if let Err(err) = Server::new(TcpListener::bind(format!("0.0.0.0:{port}")))
            .run(app)
            .await
        {
            error!(error = %err, "operator api stopped");
        }
    })
}
