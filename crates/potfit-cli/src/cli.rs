use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use potfit_core::CalcSettings;

#[derive(Parser, Debug)]
#[command(version,
          about = "potfit - persistent queue of quantum-chemistry energy calculations for potential fitting")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a file in addition to stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue the standard calculation set for every structure in a JSON file.
    Add(AddArgs),
    /// Run pending calculations for a client and commit the energies.
    Fill(FillArgs),
    /// Return every running calculation to pending (after a crashed run).
    Clean,
    /// Show calculation counts per status.
    Status(StatusArgs),
    /// Write fitting input files from completed energies.
    #[command(name = "training-set", subcommand)]
    TrainingSet(TrainingSetCommand),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// JSON array of structures.
    #[arg(long, value_name = "PATH")]
    pub structures: PathBuf,

    #[arg(long)]
    pub method: String,

    #[arg(long)]
    pub basis: String,

    /// Also queue counterpoise-corrected fragment energies.
    #[arg(long)]
    pub counterpoise: bool,

    #[arg(long, default_value = "")]
    pub tag: String,

    /// Client identity that will run these calculations.
    #[arg(long)]
    pub client: String,
}

#[derive(Args, Debug)]
pub struct FillArgs {
    /// Client identity; only this client's rows are processed.
    #[arg(long)]
    pub client: String,

    /// Maximum number of calculations to run (default: all pending).
    #[arg(long, value_name = "N")]
    pub count: Option<usize>,

    /// Program invoked once per calculation (JSON request on stdin).
    #[arg(long, env = "POTFIT_CALCULATOR", value_name = "PROGRAM")]
    pub calculator: PathBuf,

    /// Extra argument passed to the calculator program (repeatable).
    #[arg(long = "calculator-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub calculator_args: Vec<String>,

    /// Setting forwarded to the calculator, as key=value (repeatable).
    #[arg(long = "setting", value_name = "KEY=VALUE", value_parser = parse_setting)]
    pub settings: Vec<(String, String)>,

    /// Seconds a single calculation may run before it is killed and marked failed.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Results buffered before each commit.
    #[arg(long, value_name = "N", default_value_t = potfit_core::constants::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

impl FillArgs {
    pub fn calc_settings(&self) -> CalcSettings {
        self.settings
            .iter()
            .fold(CalcSettings::new(), |s, (k, v)| s.with(k.clone(), v.clone()))
    }
}

fn parse_setting(raw: &str) -> Result<(String, String), String> {
    CalcSettings::parse_pair(raw).ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Restrict the counts to one client.
    #[arg(long)]
    pub client: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EnergyQueryArgs {
    #[arg(long)]
    pub method: Option<String>,

    #[arg(long)]
    pub basis: Option<String>,

    /// Use counterpoise-corrected energies (`true`/`false`); default: any.
    #[arg(long)]
    pub counterpoise: Option<bool>,

    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum TrainingSetCommand {
    /// One-body set: configuration energies relative to the optimized geometry.
    #[command(name = "1b")]
    OneBody {
        #[arg(long)]
        molecule: String,

        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        #[command(flatten)]
        query: EnergyQueryArgs,
    },
    /// Two-body set: binding, interaction and deformation energies of a dimer.
    #[command(name = "2b")]
    TwoBody {
        #[arg(long, num_args = 2, value_names = ["MONOMER_1", "MONOMER_2"])]
        monomers: Vec<String>,

        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        #[command(flatten)]
        query: EnergyQueryArgs,
    },
}
