use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use aksara_backend::{
    AppState,
    completion::GeminiClient,
    config::Config,
    database::{self, PgChatStore, PgUserStore},
    router::create_router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池并执行迁移
    let pool = database::connect(&config)
        .await
        .expect("Failed to connect to Postgres");
    database::migrate(&pool)
        .await
        .expect("Failed to run database migrations");

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set, chat requests will fail");
    }

    let completion = Arc::new(GeminiClient::from_config(&config));
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    // 设置应用状态
    let state = AppState::new(
        config,
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgChatStore::new(pool)),
        completion,
    );
    let app = create_router(state);

    // 启动服务器
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
