use crate::{config::Config, ctx::Ctx, routes::get_routes};
use anyhow::Context;
use dotenvy::dotenv;

pub async fn start_server() -> anyhow::Result<()> {
    // must run before tracing init so RUST_LOG in .env file will be loaded
    let dotenv_result = dotenv();

    let config = Config::from_env()?;

    match &config.log_dir {
        Some(log_dir) => analytics_tracing::init_tracing_to_file(log_dir.clone()),
        None => analytics_tracing::init_tracing_to_stdout(),
    }

    match dotenv_result {
        Ok(path) => tracing::info!(".env read successfully from {}", path.display()),
        Err(e) => tracing::warn!("Could not load .env file: {e}"),
    };

    tracing::info!(
        data_root = %config.local_data_root.display(),
        image_caption = config.image_caption.backend().as_ref(),
        object_detection = config.object_detection.backend().as_ref(),
        resident_models = config.offload_duration.is_none(),
        "configuration loaded"
    );

    let ctx = Ctx::init(&config).await?;

    let app = get_routes(ctx, config.max_upload_size);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!("Listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl-C received, shut down...");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, shut down...");
        },
    }
}
