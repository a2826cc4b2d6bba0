use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use busline_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    // Init Redis client (construction only; connection checked in health)
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url.clone())?);

    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);

    // Best-effort side-effect collaborators, dependency-injected so the
    // orchestrators never touch a transport directly.
    let notifier: Arc<dyn api::services::notifications::Notifier> =
        Arc::new(api::services::notifications::LogNotifier);
    let publisher: Arc<dyn api::services::realtime::RealtimePublisher> =
        Arc::new(api::services::realtime::RedisRealtimePublisher::new(
            redis_client.clone(),
            cfg.realtime_channel_prefix.clone(),
        ));

    // Spawn the post-commit event processor
    tokio::spawn(api::events::process_events(event_rx, notifier, publisher));

    // Payment gateway adapter
    let gateway: Arc<dyn api::services::payments::PaymentGateway> =
        Arc::new(api::services::payments::HttpPaymentGateway::new(
            cfg.payment_gateway_base_url.clone(),
            cfg.payment_gateway_api_key.clone(),
        ));

    // Build services
    let shared_sender = Arc::new(event_sender.clone());
    let booking_service = api::services::booking::BookingService::new(
        db_arc.clone(),
        gateway.clone(),
        Some(shared_sender.clone()),
        cfg.reservation_ttl(),
        cfg.payment_expiry(),
    );
    let refund_service = api::services::refunds::RefundService::new(
        db_arc.clone(),
        gateway.clone(),
        Some(shared_sender.clone()),
    );
    let trip_service = api::services::trips::TripService::new(
        db_arc.clone(),
        gateway.clone(),
        Some(shared_sender.clone()),
    );
    let order_service = api::services::orders::OrderService::new(db_arc.clone());
    let pricing_service = api::services::pricing::PricingService::new(db_arc.clone());
    let coupon_service = api::services::coupons::CouponService::new(db_arc.clone());

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        booking_service,
        refund_service,
        trip_service,
        order_service,
        pricing_service,
        coupon_service,
        redis: redis_client.clone(),
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    let app = Router::<api::AppState>::new()
        .route("/", axum::routing::get(|| async { "busline-api up" }))
        .merge(api::shell_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("busline-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
