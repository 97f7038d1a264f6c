use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use notification_cell::{DispatcherConfig, LogChannel, NotificationDispatcher};
use reminder_cell::{ReminderSweeperService, SweeperConfig};
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting VetBook API server");

    // Load configuration
    let config = AppConfig::from_env();
    let state = Arc::new(config);

    // Notification dispatcher runs for the whole process lifetime.
    let notifications = NotificationDispatcher::start_persisted(
        Arc::new(LogChannel),
        DispatcherConfig::default(),
        &state,
    );

    // Background sweeps need the service-role key; without it the HTTP
    // surface still works, reminders and no-show detection just stay off.
    if state.is_sweeper_configured() {
        let sweeper = Arc::new(ReminderSweeperService::new(
            &state,
            SweeperConfig::default(),
            Arc::clone(&notifications),
        ));
        sweeper.spawn_loops();
    } else {
        warn!("Service role key missing, reminder and no-show sweeps disabled");
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(state, notifications)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .await
        .unwrap();
}
