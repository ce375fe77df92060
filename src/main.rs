//! Mission Audio - 任务音频切片组装服务
//!
//! 启动顺序: 配置 -> 日志 -> 工作目录 -> 外部工具 -> 片段索引 -> HTTP 服务

use std::sync::Arc;

use mission_audio::application::{AudioPipelineBuilder, Deadlines, SliceDiscovery};
use mission_audio::config::{load_config, print_config};
use mission_audio::infrastructure::adapters::{
    discover_tools, HttpFetcherConfig, HttpSegmentFetcher, TokioProcessRunner, WavProbe,
};
use mission_audio::infrastructure::http::{AppState, HttpServer, ServerConfig};
use mission_audio::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteSegmentIndex,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = config.log.filter();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Mission Audio v{}", env!("CARGO_PKG_VERSION"));
    print_config(&config);

    // 确保工作目录存在
    let clip_dir = config.storage.clip_dir();
    let output_dir = config.storage.output_dir();
    tokio::fs::create_dir_all(&clip_dir).await?;
    tokio::fs::create_dir_all(&output_dir).await?;
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 外部工具缺失时拒绝启动
    let tools = discover_tools(config.tools.sox.as_deref(), config.tools.ffmpeg.as_deref())
        .map_err(|e| anyhow::anyhow!("External tool check failed: {}", e))?;

    // 初始化片段索引
    let db_config = DatabaseConfig::new(&config.database.path, config.database.max_connections);
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;
    let index = Arc::new(SqliteSegmentIndex::new(pool));

    // 创建适配器
    let fetcher = Arc::new(HttpSegmentFetcher::new(HttpFetcherConfig {
        timeout_secs: config.fetch.timeout_secs,
        validate: config.fetch.validate,
    })?);
    let runner = Arc::new(TokioProcessRunner::new());
    let probe = Arc::new(WavProbe::new());

    let discovery = Arc::new(SliceDiscovery::new(index, clip_dir));
    let pipeline = AudioPipelineBuilder::new(tools);
    let deadlines = Deadlines {
        fetch: Some(config.fetch.timeout()),
        process: Some(config.assembly.process_timeout()),
    };

    let state = AppState::new(
        discovery,
        fetcher,
        runner,
        probe,
        pipeline,
        output_dir,
        config.fetch.max_concurrent,
        deadlines,
    );

    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
