use clap::{Parser, Subcommand};
use conclave_agent::{detect_task_type, ChainStep, ProviderRouter, TemperatureController};
use conclave_core::AgentRole;
use conclave_orchestrator::{
    execution_waves, plan_or_default, ConclaveConfig, Plan, DEFAULT_CONFIG_FILE,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclave", about = "Conclave: multi-agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Emit JSON instead of text (output and logs)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a plan document and show its execution waves
    Plan {
        /// File holding the planner output
        file: PathBuf,
        /// Objective used if the document has to be replaced by the fallback plan
        #[arg(long)]
        objective: Option<String>,
    },
    /// Print the effective configuration
    Config,
    /// Show each role's fallback chain, starting and learned temperature
    Roles {
        /// Prompt to compute temperatures for
        #[arg(long)]
        prompt: Option<String>,
    },
}

#[derive(Serialize)]
struct PlanReport {
    fallback: bool,
    plan: Plan,
    waves: Vec<Vec<u32>>,
}

#[derive(Serialize)]
struct RoleReport {
    role: AgentRole,
    temperature: f32,
    preferred_temperature: f32,
    chain: Vec<ChainStep>,
}

fn load_config(path: &Path) -> anyhow::Result<ConclaveConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(ConclaveConfig::load(path)?)
    } else if path == Path::new(DEFAULT_CONFIG_FILE) {
        info!("No {DEFAULT_CONFIG_FILE} found, using defaults");
        Ok(ConclaveConfig::default())
    } else {
        anyhow::bail!("Config file '{}' does not exist", path.display())
    }
}

fn plan_report(raw: &str, objective: &str) -> PlanReport {
    let (plan, fallback) = plan_or_default(raw, objective);
    let waves = execution_waves(&plan);
    PlanReport {
        fallback,
        plan,
        waves,
    }
}

fn role_reports(config: &ConclaveConfig, prompt: &str) -> Vec<RoleReport> {
    let router = ProviderRouter::new(config.routing.clone(), config.breaker.clone());
    let temperature = TemperatureController::new(config.temperature.clone());
    let task_type = detect_task_type(prompt);
    AgentRole::ALL
        .iter()
        .map(|&role| RoleReport {
            role,
            temperature: temperature.get_temperature_for_agent(role, prompt, Some(task_type)),
            preferred_temperature: temperature.profile(role).preferred_temperature,
            chain: router.resolve_chain(role),
        })
        .collect()
}

fn print_plan(report: &PlanReport) {
    let plan = &report.plan;
    println!("Objective: {}", plan.objective);
    println!("Complexity: {:?}", plan.complexity);
    if report.fallback {
        println!("(planner output unusable, single-task fallback plan)");
    }
    println!("\nTasks:");
    for task in &plan.tasks {
        let deps = if task.dependencies.is_empty() {
            String::new()
        } else {
            let ids: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
            format!(" (after {})", ids.join(", "))
        };
        println!("  {:>3}  {:<12} {}{deps}", task.id, task.agent, task.description);
    }
    println!("\nWaves:");
    for (i, wave) in report.waves.iter().enumerate() {
        println!("  {}: {wave:?}", i + 1);
    }
}

fn print_roles(reports: &[RoleReport]) {
    for report in reports {
        println!(
            "{} (temperature {:.2}, preferred {:.2})",
            report.role, report.temperature, report.preferred_temperature
        );
        for (i, step) in report.chain.iter().enumerate() {
            let persona = if step.role == report.role {
                String::new()
            } else {
                format!(" as {}", step.role)
            };
            println!("  {i}. {} {}{persona}", step.provider, step.model);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Plan { file, objective } => {
            let raw = tokio::fs::read_to_string(&file).await.map_err(|e| {
                anyhow::anyhow!("Failed to read plan file '{}': {}", file.display(), e)
            })?;
            let objective = objective.unwrap_or_else(|| file.display().to_string());
            let report = plan_report(&raw, &objective);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_plan(&report);
            }
        }
        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml_string()?);
            }
        }
        Commands::Roles { prompt } => {
            let prompt = prompt.unwrap_or_default();
            let reports = role_reports(&config, &prompt);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_roles(&reports);
            }
        }
    }

    Ok(())
}
