use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackform")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative provisioning of network and compute stacks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack document (TOML or JSON)
    #[arg(
        short,
        long = "file",
        env = "STACKFORM_FILE",
        default_value = "stack.toml",
        global = true
    )]
    pub file: PathBuf,

    /// Directory holding provider state and run records
    #[arg(long, env = "STACKFORM_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Provision the stack
    Apply(ApplyArgs),

    /// Delete every resource of the stack, dependents first
    Destroy(DestroyArgs),

    /// Show stack outputs from the provisioned state
    Output(OutputArgs),

    /// Check the stack document without contacting the provider
    Validate,

    /// Show resources in plan order with their dependencies
    Graph,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Plan / Apply / Destroy
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Limit to a kind or a single resource (e.g. `instance`, `subnet.public-1`)
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Limit to a kind or a single resource, plus everything it requires
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of provider calls in flight
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Read observed state only and report what would happen
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Limit to a kind or a single resource
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of provider calls in flight
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Output
// ============================================================================

#[derive(Parser)]
pub struct OutputArgs {
    /// Print outputs as a JSON object
    #[arg(long)]
    pub json: bool,
}
