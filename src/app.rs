use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{accounts, accounts::dto::OkResponse, config::AppConfig, pictures, state::AppState};

/// Fixed pages: route -> file under the public directory.
const PAGES: &[(&str, &str)] = &[
    ("/", "index.html"),
    ("/index", "index.html"),
    ("/login", "html/login-form.html"),
    ("/register", "html/createacc-form.html"),
    ("/accountsettings", "html/acc-settings.html"),
    ("/orgchart", "html/org-chart.html"),
    ("/feedback", "html/feedback-form.html"),
    ("/dashboard", "html/dashboard.html"),
];

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();
    Router::new()
        .merge(accounts::router())
        .merge(pictures::router(config.max_picture_bytes))
        .route("/api/health", get(|| async { Json(OkResponse::ok()) }))
        .merge(static_routes(&config))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

fn static_routes(config: &AppConfig) -> Router<AppState> {
    let public = &config.public_dir;
    let mut router = Router::new();
    for &(route, file) in PAGES {
        router = router.route_service(route, ServeFile::new(public.join(file)));
    }
    router
        .nest_service("/css", ServeDir::new(public.join("css")))
        .nest_service("/js", ServeDir::new(public.join("js")))
        .nest_service("/img", ServeDir::new(public.join("img")))
        .nest_service("/uploads/profiles", ServeDir::new(config.profile_dir()))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl-c received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
