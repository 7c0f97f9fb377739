use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use goalplan::api::{AppState, run_http_server};
use goalplan::core::{HouseholdInput, HouseholdPlanner, PlannerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "goalplan", about = "Goal adjustment and budget allocation planner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// JSON planner configuration; built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Plan a household from a JSON file and print the result.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<PlannerConfig, String> {
    match path {
        Some(path) => PlannerConfig::from_json_file(path).map_err(|e| e.to_string()),
        None => Ok(PlannerConfig::default()),
    }
}

async fn run_plan(input: &Path, config: PlannerConfig) -> Result<String, String> {
    let raw = fs::read_to_string(input)
        .map_err(|e| format!("cannot read {}: {e}", input.display()))?;
    let household: HouseholdInput =
        serde_json::from_str(&raw).map_err(|e| format!("invalid household JSON: {e}"))?;

    let state = AppState::new(config);
    let plan = HouseholdPlanner::new(state.planner())
        .plan(household.goals, household.profile)
        .await;
    serde_json::to_string_pretty(&plan).map_err(|e| format!("cannot encode plan: {e}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { port, config } => match load_config(config.as_deref()) {
            Ok(config) => run_http_server(port, config)
                .await
                .map_err(|e| format!("Server error: {e}")),
            Err(e) => Err(e),
        },
        Command::Plan { input, config } => match load_config(config.as_deref()) {
            Ok(config) => run_plan(&input, config).await.map(|json| println!("{json}")),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
