use std::sync::Arc;

use scanctl::api::api_routes;
use scanctl::config::ApiConfig;
use scanctl::control::ControlPlane;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ApiConfig::from_env();
    let plane = ControlPlane::from_config(&config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    eprintln!("🛰  scanctl v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", config.bind_addr());
    eprintln!("   Engine: {}", config.engine_program);
    if let Some(root) = &config.scratch_root {
        eprintln!("   Scratch: {}", root.display());
    }

    tracing::info!(address = %config.bind_addr(), "Running REST-JSON API server");
    tracing::info!(admin_task = %plane.admin_id(), "Admin task ID");

    let app = api_routes(Arc::new(plane));
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
