use dealer_onboarding::config::{SequencerConfig, ServerConfig};
use dealer_onboarding::error::Result;
use dealer_onboarding::onboarding::{
    OnboardingRouteState, OnboardingSequencer, cors_layer, onboarding_routes,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let sequencer_config = SequencerConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    let addr = server_config.socket_addr()?;

    eprintln!("Dealer Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Step delay: {:?}", sequencer_config.step_delay);
    eprintln!("   API: http://{}/api/onboarding", addr);
    eprintln!("   WS:  ws://{}/ws\n", addr);

    let sequencer = OnboardingSequencer::new(sequencer_config);
    let app = onboarding_routes(OnboardingRouteState {
        sequencer: sequencer.clone(),
    })
    .layer(cors_layer(&server_config.cors_origins));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Onboarding server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    // Drop any in-flight continuation on the way out.
    sequencer.reset().await;
    tracing::info!("Onboarding server stopped");
    Ok(())
}
