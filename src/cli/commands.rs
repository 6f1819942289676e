use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ot", about = concat!("ordertree v", env!("CARGO_PKG_VERSION"), " - ordered subtask trees per filter"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different directory (where ordertree.toml lives)
    #[arg(short = 'C', long = "dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate serialized tree text
    Check(TreeTextArgs),
    /// Print the ids of serialized tree text in display order
    Flatten(TreeTextArgs),
    /// Initialize a filter's tree
    Init(InitArgs),
    /// Show a filter's tree as text and as an outline
    Show(FilterArgs),
    /// Show a filter's position table
    Positions(FilterArgs),
    /// Show where a task sits and what is below it
    Find(TaskArgs),
    /// Move a task (and its subtasks) before another task
    Mv(MvArgs),
    /// Indent a task under its previous sibling, or outdent it
    Indent(IndentArgs),
    /// Record a newly created task (shown first)
    Add(TaskArgs),
    /// Forget a deleted task, keeping its subtasks in place
    Rm(TaskArgs),
    /// Align a filter's tree with its current set of tasks
    Reconcile(ReconcileArgs),
    /// Print a filter's tree in stable ids
    Export(FilterArgs),
}

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TreeTextArgs {
    /// Tree text, e.g. "[-1, [1, 2], 3]" (use - to read stdin)
    pub text: String,
}

#[derive(Args)]
pub struct InitArgs {
    /// Filter key
    pub filter: String,
    /// Initial tree text (default: empty tree)
    #[arg(long)]
    pub tree: Option<String>,
    /// The tree is written in stable ids; map them through the id table
    #[arg(long)]
    pub stable: bool,
    /// Replace an existing tree
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct FilterArgs {
    /// Filter key
    pub filter: String,
}

#[derive(Args)]
pub struct TaskArgs {
    /// Filter key
    pub filter: String,
    /// Task id
    pub id: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Filter key
    pub filter: String,
    /// Task to move
    pub target: String,
    /// Place the task right before this one (default: end of the top level)
    #[arg(long)]
    pub before: Option<String>,
}

#[derive(Args)]
pub struct IndentArgs {
    /// Filter key
    pub filter: String,
    /// Task to indent
    pub id: String,
    /// Outdent instead
    #[arg(long)]
    pub out: bool,
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Filter key
    pub filter: String,
    /// Ids of the filter's tasks, oldest first
    pub ids: Vec<String>,
}
