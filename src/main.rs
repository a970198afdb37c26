use std::sync::Arc;

use tokio::{main, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_dispatch::{
    application::{
        handlers::{
            message_dispatcher::{DispatchConfig, MessageDispatcher},
            orchestrator::{Orchestrator, RunMode},
            transport_supervisor::TransportSupervisor,
        },
        services::{pacer::TokioPacer, readiness::ReadinessGate, transport::TransportSession},
        usecases::{
            purge_sent::PurgeSentMessages,
            queue_status::GetQueueStatusUseCase,
            requeue_failed::{FailedMessagePolicy, RequeueFailedMessages},
        },
    },
    config::Config,
    domain::repositories::MessageRepository,
    infrastructure::{
        messaging::{http_bridge::HttpBridgeClient, qr_file::FileQrCodeSink},
        repositories::postgres::{self, PostgresMessageRepository},
    },
    presentation::http::{self, endpoints::root::ApiState},
};

#[main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_dispatch=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::try_parse()?;

    let pool = match postgres::connect(
        &config.store_connection_string,
        config.store_max_connections,
    )
    .await
    {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to message store");
            return Err(err.into());
        }
    };
    info!("connected to message store");

    let store: Arc<dyn MessageRepository> = PostgresMessageRepository::new(pool);

    RequeueFailedMessages::new(
        store.clone(),
        FailedMessagePolicy::from_flag(config.retry_failed_messages),
    )
    .execute()
    .await?;

    let gate = ReadinessGate::new(config.readiness_poll_interval);
    let client = HttpBridgeClient::new(config.transport.clone())?;
    let session = TransportSession::new(client, gate.clone());

    let (stop, stopped) = watch::channel(false);
    let stop = Arc::new(stop);
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("shutdown requested, finishing current message");
                stop.send_replace(true);
            }
        });
    }

    let supervisor = TransportSupervisor::new(
        session.clone(),
        Arc::new(FileQrCodeSink::new(config.qr_code_path.clone())),
        config.reconnect_backoff,
    )
    .spawn(stopped.clone());

    let server = config.http_port.map(|port| {
        let state = Arc::new(ApiState {
            queue_status_usecase: Arc::new(GetQueueStatusUseCase::new(store.clone(), gate.clone())),
        });
        http::spawn(state, port)
    });

    let dispatcher = MessageDispatcher::new(
        store.clone(),
        session,
        Arc::new(TokioPacer),
        PurgeSentMessages::new(store.clone(), config.delete_sent_messages),
        DispatchConfig {
            pacing_delay: config.pacing_delay,
            chat_suffix: config.chat_suffix.clone(),
        },
    );

    let outcome = Orchestrator::new(dispatcher, RunMode::from_interval(config.poll_interval), stopped)
        .run()
        .await;

    stop.send_replace(true);
    if let Err(err) = supervisor.await {
        warn!(error = %err, "transport supervisor task failed");
    }
    if let Some(server) = server {
        server.abort();
    }

    match outcome {
        Ok(summary) => {
            info!(sent = summary.sent, failed = summary.failed, "dispatch complete");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "dispatch aborted");
            Err(err.into())
        }
    }
}
