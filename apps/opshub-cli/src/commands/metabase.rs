use anyhow::Result;
use clap::{Args, Subcommand};
use opshub_protocol::DashboardRequest;

use super::AppContext;

#[derive(Subcommand)]
pub enum MetabaseCmd {
    /// Generator health
    Health,
    /// Turn a question into a Metabase card and dashboard
    Generate(GenerateArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub query: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Add the card to this existing dashboard
    #[arg(long)]
    pub dashboard_id: Option<i64>,
}

pub async fn execute(ctx: &AppContext, cmd: MetabaseCmd) -> Result<()> {
    let metabase = ctx.clients()?.metabase;
    match cmd {
        MetabaseCmd::Health => {
            let health = metabase.health().await?;
            if ctx.json {
                return ctx.emit_json(&health);
            }
            match health.version.as_deref() {
                Some(version) => println!("{} (version {})", health.status, version),
                None => println!("{}", health.status),
            }
            Ok(())
        }
        MetabaseCmd::Generate(args) => {
            let request = DashboardRequest {
                query: args.query,
                name: args.name,
                description: args.description,
                dashboard_id: args.dashboard_id,
            };
            let reply = metabase.generate_dashboard(&request).await?;
            if ctx.json {
                return ctx.emit_json(&reply);
            }
            if !reply.message.is_empty() {
                println!("{}", reply.message);
            }
            println!("dashboard {}: {}", reply.dashboard_id, reply.dashboard_url);
            println!("card {}", reply.card_id);
            Ok(())
        }
    }
}
