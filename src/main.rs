use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use diesel::r2d2::{self, ConnectionManager};
use diesel::SqliteConnection;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    RedirectUrl, TokenUrl,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod schema;

mod models {
    pub mod bot_models;
    pub mod task_models;
    pub mod user_models;
}

mod repositories {
    pub mod bot_repository;
    pub mod notification_repository;
    pub mod task_repository;
    pub mod user_repository;
}

mod utils {
    pub mod llm_utils;
    pub mod mime_utils;
    pub mod time_utils;
}

mod automation {
    pub mod actions;
    pub mod dispatcher;
    pub mod providers;
}

mod handlers {
    pub mod auth_dtos;
    pub mod auth_middleware;
    pub mod bot_handlers;
    pub mod gmail;
    pub mod gmail_webhook;
    pub mod google_auth;
    pub mod google_calendar;
    pub mod notification_handlers;
    pub mod task_handlers;
}

mod jobs {
    pub mod scheduler;
}

#[cfg(test)]
mod test_support;

use repositories::bot_repository::BotRepository;
use repositories::notification_repository::NotificationRepository;
use repositories::task_repository::TaskRepository;
use repositories::user_repository::UserRepository;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

pub struct AppState {
    pub db_pool: DbPool,
    pub user_repository: Arc<UserRepository>,
    pub bot_repository: Arc<BotRepository>,
    pub task_repository: Arc<TaskRepository>,
    pub notification_repository: Arc<NotificationRepository>,
    pub oauth_client: GoogleOAuthClient,
    // CSRF state -> PKCE verifier for in-flight OAuth logins
    pub pending_oauth: Mutex<HashMap<String, String>>,
}

pub fn build_oauth_client(
    client_id: String,
    client_secret: String,
    redirect_url: String,
) -> GoogleOAuthClient {
    BasicClient::new(ClientId::new(client_id))
        .set_client_secret(ClientSecret::new(client_secret))
        .set_auth_uri(
            AuthUrl::new("https://accounts.google.com/o/oauth2/v2/auth".to_string())
                .expect("static auth url"),
        )
        .set_token_uri(
            TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
                .expect("static token url"),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_url).expect("invalid GOOGLE_REDIRECT_URL"))
}

fn validate_env() {
    let required = [
        "DATABASE_URL",
        "JWT_SECRET_KEY",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
        "GOOGLE_REDIRECT_URL",
        "OPENROUTER_API_KEY",
        "PUBSUB_TOPIC",
        "FRONTEND_URL",
    ];
    for var in required {
        if env::var(var).is_err() {
            panic!("Required environment variable {} is not set", var);
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    validate_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool: DbPool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create database pool");

    let oauth_client = build_oauth_client(
        env::var("GOOGLE_CLIENT_ID").expect("GOOGLE_CLIENT_ID must be set"),
        env::var("GOOGLE_CLIENT_SECRET").expect("GOOGLE_CLIENT_SECRET must be set"),
        env::var("GOOGLE_REDIRECT_URL").expect("GOOGLE_REDIRECT_URL must be set"),
    );

    let state = Arc::new(AppState {
        db_pool: pool.clone(),
        user_repository: Arc::new(UserRepository::new(pool.clone())),
        bot_repository: Arc::new(BotRepository::new(pool.clone())),
        task_repository: Arc::new(TaskRepository::new(pool.clone())),
        notification_repository: Arc::new(NotificationRepository::new(pool)),
        oauth_client,
        pending_oauth: Mutex::new(HashMap::new()),
    });

    match jobs::scheduler::start_scheduler(state.clone()).await {
        Ok(_) => tracing::info!("Background jobs scheduled"),
        Err(e) => tracing::error!("Failed to start scheduler: {}", e),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        // Gmail push ingestion
        .route("/api/webhooks/gmail", post(handlers::gmail_webhook::handle_gmail_notification))
        // Google OAuth
        .route("/api/auth/google/login", get(handlers::google_auth::google_login))
        .route("/api/auth/google/callback", get(handlers::google_auth::google_callback))
        .route("/api/auth/google/status", get(handlers::google_auth::connection_status))
        .route("/api/auth/google", delete(handlers::google_auth::google_disconnect))
        // Gmail reads
        .route("/api/gmail/previews", get(handlers::gmail::fetch_email_previews))
        .route("/api/gmail/messages/{id}", get(handlers::gmail::fetch_single_email))
        .route("/api/gmail/unread", get(handlers::gmail::gmail_unread_count))
        // Calendar
        .route("/api/calendar/events", get(handlers::google_calendar::fetch_upcoming_events))
        // Bots and summaries
        .route("/api/bots", post(handlers::bot_handlers::create_bot))
        .route("/api/bots", get(handlers::bot_handlers::list_bots))
        .route("/api/bots/{id}", get(handlers::bot_handlers::get_bot))
        .route("/api/bots/{id}/active", put(handlers::bot_handlers::set_bot_active))
        .route("/api/bots/{id}", delete(handlers::bot_handlers::delete_bot))
        .route("/api/summaries", get(handlers::bot_handlers::list_summaries))
        // Tasks
        .route("/api/tasks", post(handlers::task_handlers::create_task))
        .route("/api/tasks", get(handlers::task_handlers::list_tasks))
        .route("/api/tasks/{id}/completed", put(handlers::task_handlers::set_task_completed))
        .route("/api/tasks/{id}", delete(handlers::task_handlers::delete_task))
        // Calendar tasks
        .route("/api/calendar-tasks", post(handlers::task_handlers::create_calendar_task))
        .route("/api/calendar-tasks", get(handlers::task_handlers::list_calendar_tasks))
        .route(
            "/api/calendar-tasks/{id}/status",
            put(handlers::task_handlers::set_calendar_task_status),
        )
        // Notifications
        .route("/api/notifications", get(handlers::notification_handlers::list_notifications))
        .route(
            "/api/notifications/{id}/read",
            put(handlers::notification_handlers::mark_notification_read),
        )
        .route(
            "/api/notifications/{id}/action-done",
            put(handlers::notification_handlers::mark_notification_action_done),
        )
        .route(
            "/api/notifications/{id}",
            delete(handlers::notification_handlers::delete_notification),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app)
        .await
        .expect("Server error");
}
