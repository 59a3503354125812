use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// dotshade - rename and re-sign conflicting .NET package dependencies
#[derive(Debug, Parser)]
#[command(name = "dotshade", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Raise the logging level (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Inputs of a shading run, shared by `plan` and `shade`.
#[derive(Debug, Args)]
pub struct ShadeArgs {
    /// The project's lock file (project.assets.json).
    #[arg(long, value_name = "FILE")]
    pub assets: PathBuf,

    /// Request document listing package references, central versions and resolved references.
    #[arg(long, value_name = "FILE")]
    pub request: PathBuf,

    /// Root of the extracted packages (e.g. ~/.nuget/packages).
    #[arg(long, value_name = "DIR")]
    pub packages: PathBuf,

    /// Target framework of the consuming project (e.g. net6.0).
    #[arg(long, value_name = "TFM")]
    pub framework: String,

    /// Target framework moniker, used when the lock file is keyed by moniker.
    #[arg(long, value_name = "MONIKER")]
    pub moniker: Option<String>,

    /// Framework folder to try when no folder matches the target framework. Repeatable.
    #[arg(long, value_name = "TFM")]
    pub fallback: Vec<String>,

    /// Intermediate output directory; shaded binaries go to its ShadedAssemblies folder.
    #[arg(long, value_name = "DIR", default_value = "obj")]
    pub out: PathBuf,

    /// Key file (.snk or PKCS#8) used to sign shaded binaries. A key is generated when absent.
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Password of an encrypted PKCS#8 key file.
    #[arg(long, requires = "key")]
    pub password: Option<String>,

    /// Write binaries one after another instead of in parallel.
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the transitive dependency closure recorded in a lock file.
    Graph {
        /// Path to project.assets.json.
        #[arg(value_name = "FILE")]
        assets: PathBuf,

        /// Show only the target of this framework (short name or moniker).
        #[arg(long, value_name = "TFM")]
        framework: Option<String>,

        /// Show only this package, given as id/version.
        #[arg(long, value_name = "ID/VERSION")]
        package: Option<String>,
    },

    /// Plan which binaries would be shaded and print the host outputs.
    Plan {
        #[command(flatten)]
        args: ShadeArgs,
    },

    /// Plan and write the shaded binaries. Exits with status 1 if any binary failed.
    Shade {
        #[command(flatten)]
        args: ShadeArgs,
    },

    /// Generate a strong-name key pair and write it as a .snk file.
    Keygen {
        /// Output path of the key pair.
        #[arg(value_name = "OUT")]
        out: PathBuf,
    },
}
