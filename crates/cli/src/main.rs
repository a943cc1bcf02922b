use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use github::GitHubClient;
use llm::{ChatClient, ChatGenerationBackend, DisabledBackend, GenerationBackend};
use orchestrator::{BuildConfig, BuildOrchestrator};
use server::config::{Settings, DEFAULT_CONFIG_FILE};
use server::rate_limit::RateLimitState;
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "appforge")]
#[command(about = "Builds, publishes and updates generated web applications", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML settings file; command line flags and environment win over it
    #[arg(short, long, env = "APPFORGE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Args, Default)]
struct Overrides {
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_ORG")]
    github_org: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    #[arg(long, env = "LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "DEBUG")]
    debug: bool,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Queue dispatcher requests and answer before the build finishes
    #[arg(long, env = "ASYNC_BUILDS")]
    async_builds: bool,

    #[arg(long, env = "RATE_LIMIT_PER_MINUTE")]
    rate_limit_per_minute: Option<u32>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.secret_key {
            settings.secret_key = v;
        }
        if let Some(v) = self.github_token {
            settings.github_token = v;
        }
        if let Some(v) = self.github_org {
            settings.github_org = Some(v);
        }
        if let Some(v) = self.openai_api_key {
            settings.openai_api_key = Some(v);
        }
        if let Some(v) = self.openai_base_url {
            settings.openai_base_url = v;
        }
        if let Some(v) = self.llm_model {
            settings.llm_model = v;
        }
        if let Some(v) = self.host {
            settings.host = v;
        }
        if let Some(v) = self.port {
            settings.port = v;
        }
        if let Some(v) = self.database_url {
            settings.database_url = v;
        }
        if let Some(v) = self.rate_limit_per_minute {
            settings.rate_limit_per_minute = v;
        }
        settings.debug |= self.debug;
        settings.async_builds |= self.async_builds;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::read(&cli.config)
        .await
        .context("Failed to load settings")?;
    cli.overrides.apply(&mut settings);

    init_tracing(settings.debug);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(settings).await,
        Commands::Migrate => migrate(&settings).await,
    }
}

async fn migrate(settings: &Settings) -> Result<()> {
    let pool = db::create_pool(&settings.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;
    tracing::info!(database = %settings.database_url, "Migrations applied");
    Ok(())
}

fn generation_backend(settings: &Settings) -> Arc<dyn GenerationBackend> {
    match settings.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            let client = ChatClient::new(key, settings.openai_base_url.as_str());
            Arc::new(ChatGenerationBackend::new(client, settings.llm_model.as_str()))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, every build will use the default file set");
            Arc::new(DisabledBackend)
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    settings.validate()?;
    tracing::debug!(?settings, "Settings loaded");

    let pool = db::create_pool(&settings.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;

    let hosting = GitHubClient::new(&settings.github_token, settings.github_org.clone())
        .context("Failed to create GitHub client")?;
    let orchestrator = BuildOrchestrator::new(
        generation_backend(&settings),
        Arc::new(hosting),
        BuildConfig::new(settings.secret_key.as_str()),
    );

    let mut state = AppState::new(pool, Arc::new(orchestrator))
        .with_rate_limit(RateLimitState::per_minute(settings.rate_limit_per_minute))
        .with_environment(settings.environment());
    if settings.async_builds {
        state = state.with_build_queue();
    }
    let queue = state.queue.clone();
    if let Some(queue) = &queue {
        queue.start().await;
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(settings.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_address()))?;

    tracing::info!(
        address = %listener.local_addr()?,
        environment = settings.environment(),
        async_builds = settings.async_builds,
        "Server listening"
    );
    tracing::info!("Swagger UI: http://{}/docs", settings.bind_address());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(queue) = queue {
        tracing::info!("Waiting for queued builds to finish");
        queue.stop().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown requested");
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "appforge=debug,server=debug,orchestrator=debug,github=debug,llm=debug,db=debug,tower_http=debug"
    } else {
        "appforge=info,server=info,orchestrator=info,github=info,llm=info,db=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
