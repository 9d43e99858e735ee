use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;


#[derive(Parser, Debug)]
#[command(
    name = "nukigata",
    version,
    about = "Die (抜型) lookup: find drawing files and record where dies were seen"
)]
pub struct Cli {
    /// YAML config file (default: read the environment)
    #[arg(long, global = true, env = "NUKIGATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the drawing file for a die
    Locate(LocateArgs),
    /// Print an access token for the service account
    Token,
    /// Download a drawing file
    Fetch(FetchArgs),
    /// Show the die sheet row for a key
    SheetRow(KeyArgs),
    /// List order records for a key
    Orders(OrdersArgs),
    /// Record where dies were seen
    Seen(SeenArgs),
}

/// (book, workcode) pair.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Book name (case-sensitive)
    #[arg(long)]
    pub book: String,

    /// Workcode; "6521.0" is treated as "6521"
    #[arg(long = "wc")]
    pub workcode: String,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Search under this folder instead of GDRIVE_DIE_MASTER_ID
    #[arg(long)]
    pub root: Option<String>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// File id (from `locate`)
    #[arg(long)]
    pub id: String,

    /// Output path
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct OrdersArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Maximum records to return
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct SeenArgs {
    /// Book name
    #[arg(
        long,
        requires = "workcode",
        requires = "loc",
        required_unless_present = "items"
    )]
    pub book: Option<String>,

    /// Workcode
    #[arg(long = "wc", conflicts_with = "items")]
    pub workcode: Option<String>,

    /// Location label
    #[arg(long, conflicts_with = "items")]
    pub loc: Option<String>,

    /// Die name to write to the sheet
    #[arg(long = "wn", conflicts_with = "items")]
    pub work_name: Option<String>,

    /// When the die was seen (RFC 3339, default: now)
    #[arg(long, conflicts_with = "items")]
    pub at: Option<String>,

    /// JSON file with `[{"book","wc","loc","wn","captured_at"}]` items ("-" for stdin)
    #[arg(long, conflicts_with = "book")]
    pub items: Option<PathBuf>,

    /// Stores to update
    #[arg(long, value_enum, default_value_t = SeenTarget::Both)]
    pub target: SeenTarget,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenTarget {
    Sheet,
    Orders,
    Both,
}

impl SeenTarget {
    pub fn sheet(self) -> bool {
        matches!(self, Self::Sheet | Self::Both)
    }

    pub fn orders(self) -> bool {
        matches!(self, Self::Orders | Self::Both)
    }
}
