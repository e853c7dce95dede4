use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use pawpost::client::{self, RemoteConnector};
use pawpost::config::{remote_timeout_from_env, BackendConfig};
use pawpost::dal::Dal;
use pawpost::openapi::ApiDoc;
use pawpost::rate_limit::{RateLimitConfig, SubmissionLimiter};
use pawpost::routes::{config, AppState};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; production sets variables externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping pawpost server");

    let backend = BackendConfig::from_env();
    backend.report();

    let handles = client::global();
    if handles.initialize(&backend, &RemoteConnector).await {
        handles.prepare().await;
    }

    let state = AppState {
        dal: Dal::new(handles).with_timeout(remote_timeout_from_env()),
        missing_config: backend.missing(),
        limiter: Some(SubmissionLimiter::new(RateLimitConfig::from_env())),
    };
    let openapi = ApiDoc::openapi();
    let bind = std::env::var("PAWPOST_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local Vite dev server
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(actix_web::web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind)?;

    info!("Listening on http://{bind}");

    server.run().await
}
