use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use issueflow::forge::flow::audit::{AuditSink, JsonLinesAuditLog};
use issueflow::forge::flow::expression;
use issueflow::forge::flow::graph::{Collaborators, FlowDefinition, FlowExecutor, NodeKind};
use issueflow::forge::flow::loader::FlowLoader;
use issueflow::forge::flow::registry::FlowRegistry;
use issueflow::forge::flow::session::FlowService;
use issueflow::forge::flow::state::{
    ExecutionKey, ExecutionStatus, ExecutionStore, JsonFileStore,
};
use issueflow::forge::server::{self, AppState};
use issueflow::forge::tools::JiraClient;
use issueflow::kit::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum node hops per pass (overrides ISSUEFLOW_MAX_HOPS)
    #[arg(long, global = true)]
    max_hops: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a date expression
    Eval {
        /// The expression, e.g. "startofweek() - 1d"
        expression: String,

        /// Reference day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        now: Option<NaiveDate>,
    },
    /// Validate a flow file or a directory of flow files
    Validate {
        /// Path to a .yaml/.yml/.json file or directory
        path: PathBuf,
    },
    /// Advance a flow against a Jira issue
    Run {
        /// Path to the flow file
        #[arg(short, long)]
        flow: PathBuf,

        /// Issue key, e.g. OPS-123
        #[arg(short, long)]
        record: String,

        /// Answer to the pending question (JSON, or a plain string)
        #[arg(short, long)]
        answer: Option<String>,

        /// Directory holding execution state
        #[arg(long, default_value = ".issueflow/state")]
        state_dir: PathBuf,

        /// Audit log file (JSON lines)
        #[arg(long, default_value = ".issueflow/audit.jsonl")]
        audit_log: PathBuf,
    },
    /// Reset an execution to not started
    Reset {
        /// Flow id
        #[arg(short, long)]
        flow: String,

        /// Issue key
        #[arg(short, long)]
        record: String,

        #[arg(long, default_value = ".issueflow/state")]
        state_dir: PathBuf,
    },
    /// Start the HTTP server
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Directory of flow definitions to register
        #[arg(long, default_value = "flows")]
        flows: PathBuf,

        #[arg(long, default_value = ".issueflow/state")]
        state_dir: PathBuf,

        #[arg(long, default_value = ".issueflow/audit.jsonl")]
        audit_log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = EngineConfig::from_env();
    if let Some(max_hops) = args.max_hops {
        config = config.with_max_hops(max_hops);
    }

    match args.command {
        Commands::Eval { expression, now } => {
            let today = now.unwrap_or_else(|| Local::now().date_naive());
            let date = expression::resolve(&expression, today)?;
            println!("{}", date);
        }
        Commands::Validate { path } => {
            let flows = load_flows(&path)?;
            let mut invalid = 0;
            for flow in &flows {
                let issues = flow.validate();
                if issues.is_empty() {
                    println!("{}: ok", flow.id);
                } else {
                    invalid += 1;
                    println!("{}: {} issue(s)", flow.id, issues.len());
                    for issue in issues {
                        println!("  - {}", issue);
                    }
                }
            }
            if invalid > 0 {
                bail!("{} of {} flow(s) invalid", invalid, flows.len());
            }
        }
        Commands::Run {
            flow,
            record,
            answer,
            state_dir,
            audit_log,
        } => {
            let definition = FlowLoader::new()
                .load_file(&flow)
                .with_context(|| format!("loading {}", flow.display()))?;
            let flow_id = definition.id.clone();

            let registry = FlowRegistry::new();
            registry.register(definition.clone()).await?;

            let service = build_service(registry, config, &state_dir, &audit_log)?;
            let answer = answer.map(|raw| parse_answer(&raw));
            let now: DateTime<FixedOffset> = Local::now().fixed_offset();

            let key = ExecutionKey::new(record, flow_id);
            let outcome = service.advance(&key, answer.as_ref(), now).await?;

            for action in &outcome.actions {
                let status = if action.applied { "applied" } else { "FAILED" };
                println!("{} {}", status, action.descriptor);
            }
            print_status(&definition, &outcome.state.status);
        }
        Commands::Reset {
            flow,
            record,
            state_dir,
        } => {
            let store = JsonFileStore::new(state_dir);
            let key = ExecutionKey::new(record, flow);
            let _lease = store.lease(&key).await?;
            let state = store.load(&key).await?;
            let saved = store.save(&state.reset()).await?;
            println!("{} reset (version {})", key, saved.version);
        }
        Commands::Serve {
            port,
            flows,
            state_dir,
            audit_log,
        } => {
            let registry = FlowRegistry::new();
            for definition in load_flows(&flows)? {
                let id = definition.id.clone();
                if let Err(e) = registry.register(definition).await {
                    log::warn!("Skipping invalid flow '{}': {}", id, e);
                }
            }

            let service = build_service(registry, config, &state_dir, &audit_log)?;
            server::serve(port, AppState { service })
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    Ok(())
}

fn load_flows(path: &Path) -> anyhow::Result<Vec<FlowDefinition>> {
    let loader = FlowLoader::new();
    let flows = if path.is_dir() {
        loader.load_dir(path)?
    } else {
        vec![loader.load_file(path)?]
    };
    Ok(flows)
}

fn build_service(
    registry: FlowRegistry,
    config: EngineConfig,
    state_dir: &Path,
    audit_log: &Path,
) -> anyhow::Result<FlowService> {
    let jira = JiraClient::from_env().context("configuring Jira client")?;
    let executor = FlowExecutor::new(Collaborators::from_client(Arc::new(jira)), config);
    let store: Arc<dyn ExecutionStore> = Arc::new(JsonFileStore::new(state_dir));
    let audit: Arc<dyn AuditSink> = Arc::new(JsonLinesAuditLog::new(audit_log));
    Ok(FlowService::new(registry, executor, store, audit))
}

/// Accept JSON (`["a","b"]`, `3`) or fall back to the raw string
fn parse_answer(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_status(flow: &FlowDefinition, status: &ExecutionStatus) {
    match status {
        ExecutionStatus::AwaitingAnswer { node } => {
            println!("Waiting for an answer to '{}'", node);
            if let Some(NodeKind::Question(question)) = flow.node(node).map(|n| &n.kind) {
                println!("  {} ({})", question.prompt, question.answer_type);
                for option in &question.options {
                    println!("  - {} [{}]", option.display(), option.value);
                }
            }
        }
        other => println!("Status: {}", other),
    }
}
