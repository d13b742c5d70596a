use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use clap::Parser;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use shelfspine::app::model::{CancelResponse, ProgressResponse, ScrapeQuery};
use shelfspine::app::runner::ScrapeRunner;
use shelfspine::cli::ScrapeOptionArgs;
use shelfspine::fetch::HttpFetcher;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: SocketAddr,

    /// Consumer shell directory (served if `index.html` exists).
    #[arg(long, default_value = "web/dist")]
    web_dir: PathBuf,

    #[command(flatten)]
    scrape: ScrapeOptionArgs,
}

#[derive(Clone)]
struct AppState {
    runner: Arc<ScrapeRunner>,
    web_index: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    shelfspine::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting shelfspine-app");

    let mut options = args.scrape.to_options();
    if let Some(user_agent) = std::env::var("SHELFSPINE_USER_AGENT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        tracing::info!(%user_agent, "using user agent from environment");
        options.user_agent = user_agent;
    }

    let fetcher = HttpFetcher::new(options.user_agent.clone()).context("build http fetcher")?;
    let runner = Arc::new(ScrapeRunner::new(Arc::new(fetcher), options));

    let web_index = args.web_dir.join("index.html");
    let web_index = web_index.exists().then_some(web_index);
    let state = AppState {
        runner,
        web_index: web_index.clone(),
    };

    let mut app = Router::new()
        .route("/", get(landing))
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/get_books", get(get_books))
        .route("/progress", get(progress))
        .route("/cancel", post(cancel))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if web_index.is_some() {
        app = app.fallback_service(ServeDir::new(&args.web_dir));
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn landing(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    state.runner.reset_progress();

    let Some(index) = state.web_index else {
        return Ok(Html(BUILTIN_SHELL.to_string()));
    };
    let html = tokio::fs::read_to_string(&index).await.map_err(|err| {
        tracing::error!(path = %index.display(), ?err, "read web index");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Html(html))
}

async fn get_books(
    State(state): State<AppState>,
    Query(q): Query<ScrapeQuery>,
) -> impl IntoResponse {
    let (status, body) = state.runner.scrape(q.url.as_deref()).await;
    (status, Json(body))
}

async fn progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(state.runner.progress())
}

async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.runner.cancel_active(),
    })
}

const BUILTIN_SHELL: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>shelfspine</title></head>
  <body>
    <h1>shelfspine</h1>
    <form action="/get_books" method="get">
      <input type="text" name="url" required placeholder="https://www.goodreads.com/review/list/...">
      <button type="submit">Load shelf</button>
    </form>
    <p>Poll <code>/progress</code> while a shelf loads.</p>
  </body>
</html>
"#;
