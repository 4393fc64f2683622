use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Management CLI for the resilient dispatch service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "DISPATCH_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service status, cache size and open circuits
    Status,
    /// Aggregate ledger statistics
    Stats,
    /// Most recent execution records
    Metrics {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Ledger history, optionally for one operation
    History {
        #[arg(short = 't', long = "type")]
        operation: Option<String>,
    },
    /// Empty the execution ledger
    ClearMetrics,
    /// Circuit breaker states
    Breakers,
    /// Reset one circuit breaker
    ResetBreaker { key: String },
    /// Drop cached responses
    ClearCache {
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Dispatch an action through an operation's fallback chain
    Dispatch {
        operation: String,
        #[arg(short, long)]
        action: String,
        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,
    },
    /// Health-check one candidate
    Health { operation: String, candidate: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/v1/status", base)),
        Commands::Stats => client.get(format!("{}/v1/monitoring/stats", base)),
        Commands::Metrics { limit } => client
            .get(format!("{}/v1/monitoring/metrics", base))
            .query(&[("limit", limit)]),
        Commands::History { operation } => {
            let request = client.get(format!("{}/v1/monitoring/history", base));
            match operation {
                Some(op) => request.query(&[("type", op)]),
                None => request,
            }
        }
        Commands::ClearMetrics => client.delete(format!("{}/v1/monitoring/metrics", base)),
        Commands::Breakers => client.get(format!("{}/v1/breakers", base)),
        Commands::ResetBreaker { key } => {
            client.post(format!("{}/v1/breakers/{}/reset", base, key))
        }
        Commands::ClearCache { prefix } => {
            let request = client.delete(format!("{}/v1/cache", base));
            match prefix {
                Some(prefix) => request.query(&[("prefix", prefix)]),
                None => request,
            }
        }
        Commands::Dispatch {
            operation,
            action,
            payload,
        } => {
            let payload: Value = serde_json::from_str(&payload)?;
            client
                .post(format!("{}/v1/dispatch/{}", base, operation))
                .json(&json!({ "action": action, "payload": payload }))
        }
        Commands::Health {
            operation,
            candidate,
        } => client.post(format!("{}/v1/health/{}/{}", base, operation, candidate)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if text.trim().is_empty() {
        println!("{}", status);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
    }
    Ok(())
}
