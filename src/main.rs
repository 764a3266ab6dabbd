//! Registry Harvest CLI - batch record collection from the command line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use registry_harvest::{
    proxy::{parse_proxy_url, ProxyConfig, StaticProxyProvider},
    session_headers, ApiRequest, ClientConfig, HttpTransport, PoolConfig, QueryOutcome,
    RegistryClient, RequestError, SearchHandle, SearchIssuer, SearchQuery, SessionTokens,
    StaticSessionProvider, Transport, WorkerPoolBuilder,
};

/// Registry Harvest - session-authenticated registry API access
#[derive(Parser)]
#[command(name = "registry-harvest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more search queries through the worker pool
    Search(SearchArgs),

    /// Fetch the structured detail payload for a single record
    Detail(DetailArgs),
}

#[derive(Parser)]
struct SearchArgs {
    /// Search queries (one outcome per query, in the order given)
    #[arg(required = true)]
    queries: Vec<String>,

    /// Base URL of the registry API
    #[arg(short, long)]
    base_url: String,

    /// Records per page
    #[arg(long, default_value = "100")]
    page_size: u32,

    /// Maximum records to collect per query (0 = all)
    #[arg(short, long, default_value = "0")]
    limit: usize,

    /// Number of pool workers
    #[arg(short, long, default_value = "3")]
    concurrency: usize,

    /// Minimum spacing between requests per worker, in milliseconds
    #[arg(long, default_value = "500")]
    min_interval_ms: u64,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Proxy URLs, assigned to workers round-robin
    /// (e.g. http://127.0.0.1:8080 or socks5://127.0.0.1:1080)
    #[arg(short, long)]
    proxy: Vec<String>,

    #[command(flatten)]
    tokens: TokenArgs,
}

#[derive(Parser)]
struct DetailArgs {
    /// Record identifier
    record_id: String,

    /// Search identifier the record was found under, if any
    #[arg(short, long)]
    search_id: Option<String>,

    /// Base URL of the registry API
    #[arg(short, long)]
    base_url: String,

    /// Proxy URL
    #[arg(short, long)]
    proxy: Option<String>,

    #[command(flatten)]
    tokens: TokenArgs,
}

/// Session credentials extracted from an interactive login.
#[derive(Parser)]
struct TokenArgs {
    /// Anti-forgery token (falls back to REGISTRY_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,

    /// Session cookie value (falls back to REGISTRY_SESSION_ID)
    #[arg(long)]
    session_id: Option<String>,

    /// Bearer token (falls back to REGISTRY_BEARER_TOKEN)
    #[arg(long)]
    bearer_token: Option<String>,
}

impl TokenArgs {
    fn into_tokens(self) -> Result<SessionTokens> {
        Ok(SessionTokens::new(
            required(self.auth_token, "--auth-token", "REGISTRY_AUTH_TOKEN")?,
            required(self.session_id, "--session-id", "REGISTRY_SESSION_ID")?,
            required(self.bearer_token, "--bearer-token", "REGISTRY_BEARER_TOKEN")?,
        ))
    }
}

fn required(flag: Option<String>, flag_name: &str, var: &str) -> Result<String> {
    flag.or_else(|| std::env::var(var).ok())
        .ok_or_else(|| anyhow::anyhow!("missing credential: pass {} or set {}", flag_name, var))
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Compact one-record-per-line output
    Compact,
}

/// Issues quick searches over the registry's search endpoint.
struct HttpSearchIssuer {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickSearchAnswer {
    search_id: String,
    #[serde(default)]
    total_results: u64,
}

#[async_trait]
impl SearchIssuer for HttpSearchIssuer {
    async fn quick_search(
        &self,
        session: &SessionTokens,
        proxy: Option<&ProxyConfig>,
        query: &SearchQuery,
    ) -> registry_harvest::Result<SearchHandle> {
        let transport = HttpTransport::new(proxy, &self.user_agent, self.timeout)?;
        let url = format!("{}/api/search/quick", self.base_url);
        let mut request = ApiRequest::post(
            &url,
            serde_json::json!({
                "query": query.query,
                "pageSize": query.page_size,
            }),
        );
        for (name, value) in session_headers(session) {
            request = request.with_header(name, value);
        }

        let response = transport.execute(&request).await?;
        if !response.is_success() {
            return Err(RequestError::from_status(
                response.status,
                &url,
                response.retry_after_secs,
            ));
        }
        let answer: QuickSearchAnswer = response.json(&url)?;
        Ok(SearchHandle::new(
            answer.search_id,
            answer.total_results,
            &query.query,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    match cli.command {
        Commands::Search(args) => run_search(args).await,
        Commands::Detail(args) => run_detail(args).await,
    }
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let config = ClientConfig::new(&args.base_url)
        .with_min_interval(Duration::from_millis(args.min_interval_ms));
    let issuer = Arc::new(HttpSearchIssuer {
        base_url: args.base_url.clone(),
        user_agent: config.user_agent.clone(),
        timeout: config.request_timeout(),
    });
    let sessions = Arc::new(StaticSessionProvider::new(args.tokens.into_tokens()?));

    let mut builder = WorkerPoolBuilder::new(
        PoolConfig::new(args.concurrency),
        config,
        sessions,
        issuer,
    );
    if !args.proxy.is_empty() {
        let proxies = args
            .proxy
            .iter()
            .map(|raw| parse_proxy_url(raw))
            .collect::<registry_harvest::Result<Vec<_>>>()?;
        if matches!(args.format, OutputFormat::Text) {
            eprintln!("Using {} proxies", proxies.len());
        }
        builder = builder.with_proxy_provider(Arc::new(StaticProxyProvider::new(proxies)));
    }

    let pool = builder.build().await?;
    pool.init().await?;

    let queries: Vec<SearchQuery> = args
        .queries
        .iter()
        .map(|q| {
            SearchQuery::new(q)
                .with_page_size(args.page_size)
                .with_limit(args.limit)
        })
        .collect();
    let outcomes = pool.submit_all(queries).await;
    pool.close().await;

    let mut any_failed = false;
    match args.format {
        OutputFormat::Text => {
            for outcome in &outcomes {
                match outcome {
                    QueryOutcome::Complete(report) => {
                        println!(
                            "\n\"{}\": {} of {} records in {}ms",
                            report.metadata.query,
                            report.results.len(),
                            report.metadata.total_results,
                            report.performance.duration_ms
                        );
                        for (i, record) in report.results.iter().enumerate() {
                            println!("{}. {}", i + 1, describe(record));
                        }
                    }
                    QueryOutcome::Partial(report, error) => {
                        any_failed = true;
                        println!(
                            "\n\"{}\": PARTIAL, {} of {} records before failure: {}",
                            report.metadata.query,
                            report.results.len(),
                            report.metadata.total_results,
                            error
                        );
                        for (i, record) in report.results.iter().enumerate() {
                            println!("{}. {}", i + 1, describe(record));
                        }
                    }
                    QueryOutcome::Failed(error) => {
                        any_failed = true;
                        println!("\nFAILED: {}", error);
                    }
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|outcome| match outcome {
                    QueryOutcome::Complete(report) => serde_json::json!({
                        "status": "complete",
                        "report": report,
                    }),
                    QueryOutcome::Partial(report, error) => {
                        any_failed = true;
                        serde_json::json!({
                            "status": "partial",
                            "report": report,
                            "error": error.to_string(),
                        })
                    }
                    QueryOutcome::Failed(error) => {
                        any_failed = true;
                        serde_json::json!({
                            "status": "failed",
                            "error": error.to_string(),
                        })
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Compact => {
            for outcome in &outcomes {
                if outcome.error().is_some() {
                    any_failed = true;
                }
                if let Some(report) = outcome.report() {
                    for record in &report.results {
                        println!("{}\t{}", record.id, report.metadata.query);
                    }
                }
            }
        }
    }

    if any_failed {
        anyhow::bail!("one or more queries did not complete");
    }
    Ok(())
}

async fn run_detail(args: DetailArgs) -> Result<()> {
    let config = ClientConfig::new(&args.base_url);
    let issuer = Arc::new(HttpSearchIssuer {
        base_url: args.base_url.clone(),
        user_agent: config.user_agent.clone(),
        timeout: config.request_timeout(),
    });
    let sessions = Arc::new(StaticSessionProvider::new(args.tokens.into_tokens()?));

    let mut client = RegistryClient::new(config, sessions, issuer);
    if let Some(raw) = &args.proxy {
        client = client.with_proxy(parse_proxy_url(raw)?);
    }

    let detail = client
        .fetch_detail(&args.record_id, args.search_id.as_deref())
        .await?;
    client.close().await?;

    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn describe(record: &registry_harvest::Record) -> String {
    let name = record
        .fields
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("(unnamed)");
    if record.id.is_empty() {
        name.to_string()
    } else {
        format!("{} [{}]", name, record.id)
    }
}
