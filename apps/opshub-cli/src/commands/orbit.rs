use anyhow::Result;
use clap::{Args, Subcommand};
use opshub_client::OrbitClient;
use opshub_protocol::{LogRecord, OrbitQuery, ResourceFilter};
use serde_json::Value as JsonValue;

use super::util::{ellipsize_str, format_item};
use super::AppContext;

const ITEM_WIDTH: usize = 120;

#[derive(Subcommand)]
pub enum OrbitCmd {
    /// Clusters available to query
    Clusters,
    /// Namespaces in a cluster
    Namespaces { cluster: String },
    /// Applications in a cluster
    Applications { cluster: String },
    /// Current resource metrics
    Metrics(FilterArgs),
    /// Recent logs
    Logs(LogsArgs),
    /// Correlated alerts
    Alerts(FilterArgs),
    /// Live alert feed
    LiveAlerts,
    /// Ask the multi-agent query service
    Query(QueryArgs),
    /// Liveness probe
    Ping,
    /// Service health
    Health,
}

#[derive(Args, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub cluster: Option<String>,
    #[arg(long)]
    pub namespace: Option<String>,
    #[arg(long)]
    pub application: Option<String>,
}

impl FilterArgs {
    fn filter(&self, severity: Option<String>) -> ResourceFilter {
        ResourceFilter {
            cluster: self.cluster.clone(),
            namespace: self.namespace.clone(),
            application: self.application.clone(),
            severity,
        }
    }
}

#[derive(Args)]
pub struct LogsArgs {
    #[command(flatten)]
    pub scope: FilterArgs,
    /// ERROR, WARN, INFO, ...
    #[arg(long)]
    pub severity: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Question for the service
    #[arg(long)]
    pub query: String,
    #[arg(long, default_value = "")]
    pub application: String,
    #[arg(long, default_value = "1h")]
    pub time_range: String,
    #[arg(long, default_value = "general")]
    pub query_type: String,
}

pub async fn execute(ctx: &AppContext, cmd: OrbitCmd) -> Result<()> {
    let orbit = ctx.clients()?.orbit;
    match cmd {
        OrbitCmd::Clusters => print_list(ctx, orbit.clusters().await?),
        OrbitCmd::Namespaces { cluster } => print_list(ctx, orbit.namespaces(&cluster).await?),
        OrbitCmd::Applications { cluster } => {
            print_list(ctx, orbit.applications(&cluster).await?)
        }
        OrbitCmd::Metrics(scope) => metrics(ctx, &orbit, &scope).await,
        OrbitCmd::Logs(args) => {
            let logs = orbit.logs(&args.scope.filter(args.severity.clone())).await?;
            print_logs(ctx, &logs)
        }
        OrbitCmd::Alerts(scope) => {
            print_list(ctx, orbit.correlated_alerts(&scope.filter(None)).await?)
        }
        OrbitCmd::LiveAlerts => print_list(ctx, orbit.streaming_alerts().await?),
        OrbitCmd::Query(args) => {
            let body = OrbitQuery {
                query: args.query,
                application: args.application,
                time_range: args.time_range,
                query_type: args.query_type,
            };
            print_value(ctx, &orbit.query(&body).await?)
        }
        OrbitCmd::Ping => print_value(ctx, &orbit.ping().await?),
        OrbitCmd::Health => print_value(ctx, &orbit.health().await?),
    }
}

fn print_list(ctx: &AppContext, items: Vec<JsonValue>) -> Result<()> {
    if ctx.json {
        return ctx.emit_json(&items);
    }
    if items.is_empty() {
        println!("(none)");
    }
    for item in &items {
        println!("{}", format_item(item, ITEM_WIDTH));
    }
    Ok(())
}

fn print_value(ctx: &AppContext, value: &JsonValue) -> Result<()> {
    if ctx.json {
        return ctx.emit_json(value);
    }
    super::util::print_json(value, true)
}

async fn metrics(ctx: &AppContext, orbit: &OrbitClient, scope: &FilterArgs) -> Result<()> {
    let snap = orbit.metrics(&scope.filter(None)).await?;
    if ctx.json {
        return ctx.emit_json(&snap);
    }
    println!("cpu            {:>8.1}%", snap.cpu);
    println!("memory         {:>8.1}%", snap.memory);
    println!("disk           {:>8.1}%", snap.disk);
    println!("network        {:>8.2}", snap.network);
    println!("response time  {:>8.1}ms", snap.response_time);
    println!("error rate     {:>8.2}%", snap.error_rate);
    Ok(())
}

fn print_logs(ctx: &AppContext, logs: &[LogRecord]) -> Result<()> {
    if ctx.json {
        return ctx.emit_json(&logs);
    }
    if logs.is_empty() {
        println!("(no logs)");
    }
    for log in logs {
        println!(
            "{:<24} {:<5} {:<20} {}",
            ellipsize_str(&log.timestamp, 24),
            ellipsize_str(&log.severity, 5),
            ellipsize_str(&log.source, 20),
            ellipsize_str(&log.message.replace('\n', " "), ITEM_WIDTH)
        );
    }
    Ok(())
}
