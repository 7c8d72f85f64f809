use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Subcommand};
use opshub_client::NlqClient;
use opshub_events::{Bus, Envelope};
use opshub_protocol::Row;
use opshub_stream::{
    columns, copy_tsv, export_csv, paginate, search, SessionConfig, SessionController,
    SessionOutcome, SessionReport, SessionSnapshot,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use super::util::{ellipsize_str, format_seconds, history_line, render_table, stats_lines};
use super::AppContext;

const STATS_WINDOW: usize = 10;

#[derive(Subcommand)]
pub enum NlqCmd {
    /// Stream one question and print the result table
    Ask(AskArgs),
    /// Interactive session: one question per line, `:help` for commands
    Shell(ShellArgs),
    /// Service health (database connection, model)
    Health,
    /// Example questions grouped by category
    Examples,
    /// Point the service at another ClickHouse pod
    SetDatabase {
        /// Pod id, e.g. p43_eng_sjc01
        pod: String,
    },
    /// Configured models and their api bases
    Models,
    /// Configured database pods and their hosts
    Databases,
}

#[derive(Args, Clone, Default)]
pub struct SelectionArgs {
    /// Model id (defaults to nlq.default_model)
    #[arg(long)]
    pub model: Option<String>,
    /// OpenAI-compatible api base; required for models missing from the config
    #[arg(long)]
    pub api_base: Option<String>,
    /// Database pod id (defaults to nlq.default_database)
    #[arg(long)]
    pub database: Option<String>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question in plain language
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Only show rows with a cell containing this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
    /// Page to show, 1-indexed
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Rows per page
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,
    /// Write the (filtered) rows to a CSV file
    #[arg(long)]
    pub csv: Option<PathBuf>,
    /// Print the (filtered) rows as tab-separated text instead of a table
    #[arg(long)]
    pub tsv: bool,
}

#[derive(Args)]
pub struct ShellArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Rows per page
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,
}

pub async fn execute(ctx: &AppContext, cmd: NlqCmd) -> Result<()> {
    match cmd {
        NlqCmd::Ask(args) => ask(ctx, &args).await,
        NlqCmd::Shell(args) => shell(ctx, &args).await,
        NlqCmd::Health => health(ctx).await,
        NlqCmd::Examples => examples(ctx).await,
        NlqCmd::SetDatabase { pod } => set_database(ctx, &pod).await,
        NlqCmd::Models => {
            list_table(ctx, "model", "api base", ctx.config.nlq.models.iter());
            Ok(())
        }
        NlqCmd::Databases => {
            list_table(ctx, "database", "host", ctx.config.nlq.databases.iter());
            Ok(())
        }
    }
}

fn client(ctx: &AppContext) -> Result<NlqClient> {
    Ok(NlqClient::new(ctx.config.nlq.clone(), ctx.config.http_timeout())?)
}

fn build_controller(
    ctx: &AppContext,
    selection: &SelectionArgs,
) -> Result<SessionController<NlqClient>> {
    let session = SessionConfig::resolve(
        &ctx.config.nlq,
        selection.model.as_deref(),
        selection.api_base.as_deref(),
        selection.database.as_deref(),
    )?;
    tracing::debug!(model = %session.model, database = %session.database, "nlq selection");
    Ok(SessionController::new(client(ctx)?, session, Bus::default()))
}

/// Echo status and sql updates to stderr while a session streams.
fn spawn_progress(mut rx: broadcast::Receiver<Envelope>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let env = match rx.recv().await {
                Ok(env) => env,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if !env.is_under("nlq.session") {
                continue;
            }
            let payload = &env.payload;
            match env.kind.as_str() {
                opshub_topics::TOPIC_SESSION_STATUS => {
                    if let Some(msg) = env.text("message") {
                        eprintln!("... {}", msg);
                    }
                }
                opshub_topics::TOPIC_SESSION_SQL => {
                    if let Some(sql) = env.text("sql") {
                        eprintln!("sql: {}", ellipsize_str(&sql.replace('\n', " "), 160));
                    }
                }
                opshub_topics::TOPIC_SESSION_RESULT => {
                    let returned = payload.get("returned_rows").cloned().unwrap_or_default();
                    let total = payload.get("total_rows").cloned().unwrap_or_default();
                    eprintln!("rows: {}/{}", returned, total);
                }
                opshub_topics::TOPIC_SESSION_COMPLETED
                | opshub_topics::TOPIC_SESSION_FAILED
                | opshub_topics::TOPIC_SESSION_ABANDONED => break,
                _ => {}
            }
        }
    })
}

async fn finish_progress(handle: Option<tokio::task::JoinHandle<()>>) {
    if let Some(handle) = handle {
        if tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .is_err()
        {
            tracing::debug!("progress printer still running; detaching");
        }
    }
}

/// Search and page settings applied to the accumulated rows.
#[derive(Debug, Clone, PartialEq)]
struct View {
    search: String,
    page: usize,
    page_size: usize,
}

async fn ask(ctx: &AppContext, args: &AskArgs) -> Result<()> {
    ensure!(args.page_size > 0, "--page-size must be at least 1");
    let question = args.question.join(" ");
    let controller = build_controller(ctx, &args.selection)?;
    let progress = (!ctx.json).then(|| spawn_progress(controller.bus().subscribe()));
    let report = controller.submit(&question).await?;
    finish_progress(progress).await;

    let snapshot = controller.snapshot();
    let view = View {
        search: args.search.clone().unwrap_or_default(),
        page: args.page,
        page_size: args.page_size,
    };
    let filtered = search(&snapshot.rows, &view.search);
    if let Some(path) = args.csv.as_deref() {
        write_csv(path, &filtered)?;
        if !ctx.json {
            eprintln!("wrote {} rows to {}", filtered.len(), path.display());
        }
    }
    if ctx.json {
        let page = paginate(&filtered, view.page_size, view.page);
        ctx.emit_json(&json!({
            "outcome": outcome_json(&report.outcome),
            "question": question,
            "sql": snapshot.sql,
            "rows": page.items,
            "page": page.page,
            "total_pages": page.total_pages,
            "matched_rows": filtered.len(),
            "returned_rows": snapshot.returned_rows,
            "total_rows": snapshot.total_rows,
            "opaque": snapshot.opaque,
            "execution_time": snapshot.execution_time,
            "history": report.entry,
        }))?;
    } else if args.tsv {
        println!("{}", copy_tsv(&filtered));
    } else {
        print_session(&snapshot, &filtered, &view);
        print_report(&report);
    }
    match report.outcome {
        SessionOutcome::Completed { .. } => Ok(()),
        SessionOutcome::Failed { message } => bail!("query failed: {}", message),
        SessionOutcome::Abandoned => bail!("query abandoned"),
    }
}

fn outcome_json(outcome: &SessionOutcome) -> serde_json::Value {
    match outcome {
        SessionOutcome::Completed { execution_time } => {
            json!({"status": "completed", "execution_time": execution_time})
        }
        SessionOutcome::Failed { message } => json!({"status": "failed", "message": message}),
        SessionOutcome::Abandoned => json!({"status": "abandoned"}),
    }
}

fn write_csv(path: &Path, rows: &[&Row]) -> Result<()> {
    let csv = export_csv(rows)?;
    std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))
}

fn print_session(snapshot: &SessionSnapshot, filtered: &[&Row], view: &View) {
    if let Some(sql) = snapshot.sql.as_deref() {
        println!("SQL:");
        for line in sql.lines() {
            println!("  {}", line);
        }
        println!();
    }
    if filtered.is_empty() {
        match snapshot.opaque.as_deref() {
            Some(text) if snapshot.rows.is_empty() => println!("{}", text),
            _ if !view.search.is_empty() && !snapshot.rows.is_empty() => {
                println!("(no rows match \"{}\")", view.search)
            }
            _ => println!("(no rows)"),
        }
        return;
    }
    let page = paginate(filtered, view.page_size, view.page);
    print!("{}", render_table(&columns(filtered), page.items));
    println!(
        "page {}/{}  showing {} of {} rows (returned {}, total {})",
        page.page,
        page.total_pages,
        page.items.len(),
        page.total_items,
        snapshot.returned_rows,
        snapshot.total_rows
    );
}

fn print_report(report: &SessionReport) {
    if let Some(entry) = report.entry.as_ref() {
        println!("{}", history_line(entry));
    }
}

async fn health(ctx: &AppContext) -> Result<()> {
    let health = client(ctx)?.health().await?;
    if ctx.json {
        return ctx.emit_json(&health);
    }
    println!("status: {}", health.status);
    println!(
        "database: {} ({})",
        health.databases.clickhouse, health.databases.current_host
    );
    println!("model: {} (llm: {})", health.llm_model, health.llm);
    println!("real time: {}", health.real_time);
    if !health.message.is_empty() {
        println!("{}", health.message);
    }
    Ok(())
}

async fn examples(ctx: &AppContext) -> Result<()> {
    let examples = client(ctx)?.examples().await?;
    if ctx.json {
        return ctx.emit_json(&examples);
    }
    for group in examples {
        println!("{}", group.category);
        for q in group.queries {
            println!("  - {}", q);
        }
    }
    Ok(())
}

async fn set_database(ctx: &AppContext, pod: &str) -> Result<()> {
    let applied = client(ctx)?.set_database(pod).await?;
    if ctx.json {
        return ctx.emit_json(&applied);
    }
    println!("database set to {} ({})", applied.database, applied.host);
    Ok(())
}

fn list_table<'a>(
    ctx: &AppContext,
    key: &str,
    value: &str,
    entries: impl Iterator<Item = (&'a String, &'a String)>,
) {
    let entries: Vec<(&String, &String)> = entries.collect();
    if ctx.json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        if let Err(err) = ctx.emit_json(&map) {
            eprintln!("{}", err);
        }
        return;
    }
    let width = entries
        .iter()
        .map(|(k, _)| k.len())
        .chain(std::iter::once(key.len()))
        .max()
        .unwrap_or(0);
    println!("{:<width$}  {}", key, value, width = width);
    for (k, v) in entries {
        println!("{:<width$}  {}", k, v, width = width);
    }
}

/// A line typed into the interactive shell.
#[derive(Debug, Clone, PartialEq)]
enum ShellInput {
    Question(String),
    History,
    Stats,
    Clear,
    Search(String),
    Page(usize),
    Export(PathBuf),
    Help,
    Quit,
    Invalid(String),
}

fn parse_shell_line(line: &str) -> ShellInput {
    let line = line.trim();
    let Some(command) = line.strip_prefix(':') else {
        return ShellInput::Question(line.to_string());
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "q" | "quit" | "exit" => ShellInput::Quit,
        "history" => ShellInput::History,
        "stats" => ShellInput::Stats,
        "clear" => ShellInput::Clear,
        "help" | "?" => ShellInput::Help,
        "search" => ShellInput::Search(rest.to_string()),
        "page" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => ShellInput::Page(n),
            _ => ShellInput::Invalid(format!("expected a page number, got `{}`", rest)),
        },
        "export" if !rest.is_empty() => ShellInput::Export(PathBuf::from(rest)),
        "export" => ShellInput::Invalid("usage: :export <path.csv>".to_string()),
        other => ShellInput::Invalid(format!("unknown command `:{}`", other)),
    }
}

const SHELL_HELP: &str = "\
type a question to run it, or:
  :history        recent questions
  :stats          success rate and response times
  :clear          clear history
  :search TERM    filter rows (empty TERM resets)
  :page N         show page N
  :export PATH    write filtered rows as CSV
  :quit           leave";

fn prompt(interactive: bool) {
    if interactive {
        use std::io::Write;
        eprint!("nlq> ");
        let _ = std::io::stderr().flush();
    }
}

fn render_view<S: opshub_stream::EventSource>(controller: &SessionController<S>, view: &View) {
    let snapshot = controller.snapshot();
    let filtered = search(&snapshot.rows, &view.search);
    print_session(&snapshot, &filtered, view);
}

async fn shell(ctx: &AppContext, args: &ShellArgs) -> Result<()> {
    ensure!(args.page_size > 0, "--page-size must be at least 1");
    let controller = build_controller(ctx, &args.selection)?;
    let interactive = std::io::stdin().is_terminal();
    let mut view = View {
        search: String::new(),
        page: 1,
        page_size: args.page_size,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if interactive {
        eprintln!("{}", SHELL_HELP);
    }
    prompt(interactive);
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            prompt(interactive);
            continue;
        }
        match parse_shell_line(&line) {
            ShellInput::Quit => break,
            ShellInput::Help => println!("{}", SHELL_HELP),
            ShellInput::History => {
                let history = controller.history();
                if history.is_empty() {
                    println!("(no history)");
                }
                for entry in history {
                    println!("{}", history_line(&entry));
                }
            }
            ShellInput::Stats => match controller.history_stats(STATS_WINDOW) {
                Some(stats) => {
                    for line in stats_lines(&stats) {
                        println!("{}", line);
                    }
                }
                None => println!("(no history)"),
            },
            ShellInput::Clear => {
                controller.clear_history();
                println!("history cleared");
            }
            ShellInput::Search(term) => {
                view.search = term;
                view.page = 1;
                render_view(&controller, &view);
            }
            ShellInput::Page(n) => {
                view.page = n;
                render_view(&controller, &view);
            }
            ShellInput::Export(path) => {
                let csv = controller.with_rows(|rows| export_csv(&search(rows, &view.search)))?;
                match std::fs::write(&path, csv) {
                    Ok(()) => println!("exported to {}", path.display()),
                    Err(err) => eprintln!("export failed: {}", err),
                }
            }
            ShellInput::Invalid(message) => eprintln!("{}", message),
            ShellInput::Question(question) => {
                view.search.clear();
                view.page = 1;
                let progress = spawn_progress(controller.bus().subscribe());
                match controller.submit(&question).await {
                    Ok(report) => {
                        finish_progress(Some(progress)).await;
                        render_view(&controller, &view);
                        match &report.outcome {
                            SessionOutcome::Failed { message } => eprintln!("failed: {}", message),
                            SessionOutcome::Completed { execution_time } => {
                                eprintln!("done in {}", format_seconds(*execution_time))
                            }
                            SessionOutcome::Abandoned => {}
                        }
                    }
                    Err(err) => {
                        progress.abort();
                        eprintln!("{}", err);
                    }
                }
            }
        }
        prompt(interactive);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_lines_parse_into_commands() {
        assert_eq!(
            parse_shell_line("  top users by logins "),
            ShellInput::Question("top users by logins".into())
        );
        assert_eq!(parse_shell_line(":q"), ShellInput::Quit);
        assert_eq!(parse_shell_line(":history"), ShellInput::History);
        assert_eq!(parse_shell_line(":search  alice "), ShellInput::Search("alice".into()));
        assert_eq!(parse_shell_line(":search"), ShellInput::Search(String::new()));
        assert_eq!(parse_shell_line(":page 3"), ShellInput::Page(3));
        assert_eq!(
            parse_shell_line(":export out.csv"),
            ShellInput::Export(PathBuf::from("out.csv"))
        );
    }

    #[test]
    fn shell_rejects_bad_arguments() {
        assert!(matches!(parse_shell_line(":page zero"), ShellInput::Invalid(_)));
        assert!(matches!(parse_shell_line(":page 0"), ShellInput::Invalid(_)));
        assert!(matches!(parse_shell_line(":export"), ShellInput::Invalid(_)));
        assert!(matches!(parse_shell_line(":bogus"), ShellInput::Invalid(_)));
    }

    #[test]
    fn outcome_json_names_status() {
        assert_eq!(
            outcome_json(&SessionOutcome::Failed {
                message: "boom".into()
            }),
            json!({"status": "failed", "message": "boom"})
        );
    }
}
