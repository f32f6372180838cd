use axum::{
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api;
use crate::api::state::AppState;
use crate::config::ServerConfig;
use crate::error::AbsensiError;

pub struct WebServer {
    host: String,
    port: u16,
    cors_origins: Vec<String>,
    static_dir: Option<PathBuf>,
}

impl WebServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: config.cors_origins.clone(),
            static_dir: config.static_dir.clone(),
        }
    }

    pub async fn start(&self, state: AppState) -> Result<(), AbsensiError> {
        let app = self.create_router(state);

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AbsensiError::Error(format!("Invalid address: {}", e)))?;

        println!("Absensi server starting on http://{}", addr);
        if let Some(dir) = &self.static_dir {
            println!("   Serving frontend from {}", dir.display());
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AbsensiError::Error(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Server ready to handle requests");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                info!("Shutdown signal received, finishing in-flight requests");
                println!("\nShutdown signal received - stopping server gracefully...");
            })
            .await
            .map_err(|e| AbsensiError::Error(format!("Server error: {}", e)))?;

        info!("Server shutdown complete");
        println!("   Server stopped");
        Ok(())
    }

    pub fn create_router(&self, state: AppState) -> Router {
        let app = Router::new()
            // Health check
            .route("/health", get(health_check))
            .route("/", get(api::app::root))
            .route("/api/app-info", get(api::app::get_app_info))

            // Session
            .route("/api/auth/login", post(api::auth::login_user))
            .route("/api/auth/me", get(api::auth::get_me))

            // Attendance
            .route("/api/absensi/scan", post(api::attendance::scan))
            .route("/api/absensi/recap", get(api::attendance::recap))
            .route("/api/absensi/analytics", get(api::attendance::analytics))
            .route("/api/absensi/export", get(api::attendance::export_csv))

            // Admin dashboard and reports
            .route("/api/admin/dashboard-stats", get(api::admin::get_dashboard_stats))
            .route("/api/admin/rekap/trend", get(api::admin::get_trend))
            .route("/api/admin/kehadiran", get(api::admin::get_attendance_log))
            .route("/api/admin/rekap", get(api::admin::get_admin_recap))

            // Academic years
            .route(
                "/api/admin/tahun-ajaran",
                get(api::academic_years::list_years).post(api::academic_years::create_year),
            )
            .route(
                "/api/admin/tahun-ajaran/{id}",
                put(api::academic_years::update_year).delete(api::academic_years::delete_year),
            )
            .route(
                "/api/admin/tahun-ajaran/activate/{id}",
                put(api::academic_years::activate_year),
            )

            // Classes and homerooms
            .route(
                "/api/admin/kelas",
                get(api::classes::list_classes).post(api::classes::create_class),
            )
            .route(
                "/api/admin/kelas/{id}",
                put(api::classes::update_class).delete(api::classes::delete_class),
            )
            .route("/api/admin/kelas/{id}/siswa", get(api::classes::list_class_students))
            .route("/api/admin/kelas/assign-wali", post(api::homerooms::assign_homeroom))
            .route("/api/admin/wali-kelas", get(api::homerooms::list_homerooms))
            .route("/api/admin/wali-kelas/{id}", delete(api::homerooms::remove_homeroom))
            .route("/api/admin/wali-kelas-list", get(api::homerooms::list_candidates))
            .route(
                "/api/admin/wali-kelas/available-kelas",
                get(api::homerooms::available_classes),
            )
            .route(
                "/api/admin/wali-kelas/available-guru",
                get(api::homerooms::available_teachers),
            )

            // Students and teachers
            .route(
                "/api/admin/siswa",
                get(api::students::list_students).post(api::students::create_student),
            )
            .route(
                "/api/admin/siswa/{id}",
                put(api::students::update_student).delete(api::students::delete_student),
            )
            .route(
                "/api/admin/guru",
                get(api::teachers::list_teachers).post(api::teachers::create_teacher),
            )
            .route(
                "/api/admin/guru/{id}",
                put(api::teachers::update_teacher).delete(api::teachers::delete_teacher),
            )

            // QR codes
            .route("/api/admin/qr/list-siswa", get(api::qr::list_students_for_qr))
            .route("/api/admin/qr/generate/{siswa_id}", post(api::qr::generate_qr))

            // Settings
            .route("/api/admin/settings/password", put(api::settings::update_password))
            .route("/api/admin/settings/profile", put(api::settings::update_profile))
            .route(
                "/api/admin/settings/system",
                get(api::settings::get_system_settings).put(api::settings::update_system_settings),
            )

            // Teacher and student self-service
            .route("/api/guru/dashboard", get(api::guru::get_dashboard))
            .route("/api/siswa/my-qr", get(api::siswa::get_my_qr))
            .route("/api/siswa/riwayat", get(api::siswa::get_history))

            // Notifications
            .route(
                "/api/notifications",
                get(api::notifications::list_my_notifications)
                    .post(api::notifications::create_notification),
            )
            .route("/api/notifications/{id}/read", put(api::notifications::mark_read))
            .route("/api/notifications/broadcast", post(api::notifications::broadcast))

            // Add state for handlers
            .with_state(state)
            .layer(self.cors_layer());

        match self.static_dir.clone() {
            Some(dir) => app.fallback(move |uri: Uri| static_handler(dir.clone(), uri)),
            None => app,
        }
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}

async fn health_check() -> (StatusCode, Html<&'static str>) {
    (
        StatusCode::OK,
        Html("<h1>Absensi Server</h1><p>Server is running</p>"),
    )
}

/// Serves a built single-page frontend from `dir`, falling back to
/// `index.html` for client-side routes.
async fn static_handler(dir: PathBuf, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let relative = Path::new(path);

    // Only plain relative segments may reach the filesystem
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    if !path.is_empty() {
        let file_path = dir.join(relative);
        if let Ok(content) = tokio::fs::read(&file_path).await {
            let mime = mime_guess::from_path(&file_path).first_or_octet_stream();
            return (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                content,
            )
                .into_response();
        }
    }

    // For SPA routing: if file not found, serve index.html
    match tokio::fs::read(dir.join("index.html")).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html".to_string())],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
