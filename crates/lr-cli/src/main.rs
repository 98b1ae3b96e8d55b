//! # lr-cli — The "Moat" of LOGNROLL
//!
//! Command-line client for a running hub.
//!
//! - `lr search <query>` — Page through matching logs.
//! - `lr count` / `lr volumes` — Totals and severity histograms.
//! - `lr delete --yes` — Remove matching logs.
//! - `lr maintenance <status|enable|disable>` / `lr vacuum` — Operator controls.
//!
//! The hub address comes from `LR_BASE_URL`, the bearer token from `LR_API_KEY`.

use chrono::{Duration, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tabled::{Table, Tabled};

/// 📜 LOGNROLL — OTLP log hub client.
#[derive(Parser)]
#[command(name = "lr", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search logs, newest first.
    Search {
        /// Full-text query (AND/OR/NOT, quoted phrases, field:value).
        query: Option<String>,
        #[command(flatten)]
        selection: Selection,
        /// Page size.
        #[arg(long)]
        size: Option<usize>,
        /// Cursor from a previous page.
        #[arg(long)]
        cursor: Option<String>,
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Count matching logs.
    Count {
        query: Option<String>,
        #[command(flatten)]
        selection: Selection,
    },

    /// Severity histogram of matching logs.
    Volumes {
        query: Option<String>,
        #[command(flatten)]
        selection: Selection,
        /// Bucket width, e.g. PT10M, PT1H or 15m.
        #[arg(long)]
        interval: Option<String>,
    },

    /// Delete matching logs.
    Delete {
        query: Option<String>,
        #[command(flatten)]
        selection: Selection,
        /// Required: confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Inspect or toggle maintenance mode.
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceCmd,
    },

    /// Start a background vacuum.
    Vacuum,
}

#[derive(Subcommand)]
enum MaintenanceCmd {
    Status,
    Enable,
    Disable,
}

/// Filters shared by every log command.
#[derive(Args, Default)]
struct Selection {
    /// Structured filter, e.g. "severity_text == 'ERROR'".
    #[arg(long)]
    filter: Option<String>,
    /// Lower bound on observed time (RFC 3339).
    #[arg(long)]
    from: Option<String>,
    /// Upper bound on observed time (RFC 3339).
    #[arg(long)]
    to: Option<String>,
    /// Shorthand for --from: only logs from the last N minutes.
    #[arg(long, conflicts_with = "from")]
    since_minutes: Option<i64>,
}

impl Selection {
    fn params(&self, query: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("query", q.to_string()));
        }
        if let Some(f) = &self.filter {
            params.push(("filter", f.clone()));
        }
        let from = self.from.clone().or_else(|| {
            self.since_minutes.map(|m| {
                (Utc::now() - Duration::minutes(m)).to_rfc3339_opts(SecondsFormat::Millis, true)
            })
        });
        if let Some(from) = from {
            params.push(("from", from));
        }
        if let Some(to) = &self.to {
            params.push(("to", to.clone()));
        }
        params
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsPage {
    logs: Vec<serde_json::Value>,
    next_cursor: Option<String>,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Body")]
    body: String,
}

const BODY_WIDTH: usize = 80;

impl LogRow {
    fn from_json(log: &serde_json::Value) -> Self {
        let text = |key: &str| log.get(key).and_then(|v| v.as_str()).unwrap_or("-").to_string();
        let mut body = text("body").replace('\n', " ");
        if body.chars().count() > BODY_WIDTH {
            body = body.chars().take(BODY_WIDTH - 1).collect::<String>() + "…";
        }
        Self {
            observed: text("observedTimestamp"),
            severity: text("severityText"),
            service: text("serviceName"),
            body,
        }
    }
}

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "Bucket")]
    date: String,
    #[tabled(rename = "ERROR")]
    error: u64,
    #[tabled(rename = "WARN")]
    warn: u64,
    #[tabled(rename = "INFO")]
    info: u64,
    #[tabled(rename = "DEBUG")]
    debug: u64,
    #[tabled(rename = "TRACE")]
    trace: u64,
    #[tabled(rename = "OTHER")]
    other: u64,
}

impl VolumeRow {
    fn from_json(volume: &serde_json::Value) -> Self {
        let n = |key: &str| volume.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
        Self {
            date: volume.get("date").and_then(|v| v.as_str()).unwrap_or("-").to_string(),
            error: n("error"),
            warn: n("warn"),
            info: n("info"),
            debug: n("debug"),
            trace: n("trace"),
            other: n("other"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(async_main(cli.command)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

async fn async_main(cmd: Commands) -> CliResult {
    let client = Client::from_env();

    match cmd {
        Commands::Search {
            query,
            selection,
            size,
            cursor,
            json,
        } => {
            let mut params = selection.params(query.as_deref());
            if let Some(size) = size {
                params.push(("size", size.to_string()));
            }
            if let Some(cursor) = cursor {
                params.push(("cursor", cursor));
            }
            let body = client.send(client.http.get(client.url("/api/logs")).query(&params)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }
            let page: LogsPage = serde_json::from_value(body)?;
            if page.logs.is_empty() {
                println!("No logs found.");
            } else {
                let rows: Vec<LogRow> = page.logs.iter().map(LogRow::from_json).collect();
                println!("{}", Table::new(rows));
            }
            if let Some(next) = page.next_cursor {
                println!("Next page: --cursor '{}'", next);
            }
        }

        Commands::Count { query, selection } => {
            let params = selection.params(query.as_deref());
            let body = client
                .send(client.http.get(client.url("/api/logs/count")).query(&params))
                .await?;
            println!("{}", body.get("totalCount").cloned().unwrap_or_default());
        }

        Commands::Volumes {
            query,
            selection,
            interval,
        } => {
            let mut params = selection.params(query.as_deref());
            if let Some(interval) = interval {
                params.push(("interval", interval));
            }
            let body = client
                .send(client.http.get(client.url("/api/logs/volumes")).query(&params))
                .await?;
            let rows: Vec<VolumeRow> = body
                .get("volumes")
                .and_then(|v| v.as_array())
                .map(|vs| vs.iter().map(VolumeRow::from_json).collect())
                .unwrap_or_default();
            println!("{}", Table::new(rows));
        }

        Commands::Delete {
            query,
            selection,
            yes,
        } => {
            if !yes {
                return Err("refusing to delete without --yes".into());
            }
            let params = selection.params(query.as_deref());
            let body = client
                .send(client.http.delete(client.url("/api/logs")).query(&params))
                .await?;
            println!(
                "Deleted {} logs",
                body.get("deletedCount").cloned().unwrap_or_default()
            );
        }

        Commands::Maintenance { action } => match action {
            MaintenanceCmd::Status => {
                let body = client.send(client.http.get(client.url("/api/maintenance"))).await?;
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            MaintenanceCmd::Enable => {
                client
                    .send(client.http.post(client.url("/api/maintenance/enable")))
                    .await?;
                println!("Maintenance enabled");
            }
            MaintenanceCmd::Disable => {
                client
                    .send(client.http.post(client.url("/api/maintenance/disable")))
                    .await?;
                println!("Maintenance disabled");
            }
        },

        Commands::Vacuum => {
            client.send(client.http.post(client.url("/api/logs/vacuum"))).await?;
            println!("Vacuum started");
        }
    }
    Ok(())
}

struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Client {
    fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: std::env::var("LR_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:4318".to_string()),
            api_key: std::env::var("LR_API_KEY").ok(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Attach credentials, send, and turn problem documents into errors.
    async fn send(&self, mut req: reqwest::RequestBuilder) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        if let Some(k) = self.api_key.as_deref() {
            req = req.header("Authorization", format!("Bearer {}", k));
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        if status.is_success() {
            Ok(body)
        } else {
            Err(problem_message(status.as_u16(), &body).into())
        }
    }
}

fn problem_message(status: u16, body: &serde_json::Value) -> String {
    let detail = body
        .get("detail")
        .and_then(|d| d.as_str())
        .or_else(|| body.as_str())
        .unwrap_or("no detail");
    format!("HTTP {}: {}", status, detail)
}
