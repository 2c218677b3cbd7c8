use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::BackendKind;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct OutputArgs {
    /// Also build the two-level neighbor graph
    #[clap(long, default_value = "false")]
    pub graph: bool,

    /// Print raw json instead of a table
    #[clap(long, default_value = "false")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate cli docs in markdown format
    #[cfg(feature = "markdown-docs")]
    #[clap(hide = true)]
    MarkdownDocs {},

    /// Start semex as a service.
    Daemon {
        /// Address to listen on, overrides daemon.listen
        #[clap(long)]
        listen: Option<String>,
    },

    /// Find words similar to a word
    Search {
        /// The word
        word: String,

        #[clap(flatten)]
        output: OutputArgs,
    },

    /// Find words similar to a combination of words,
    /// e.g. "rei - homem + mulher"
    Compute {
        /// Words joined by + and -
        #[clap(required = true, num_args = 1.., allow_hyphen_values = true)]
        expression: Vec<String>,

        #[clap(flatten)]
        output: OutputArgs,
    },

    /// Print the category table
    Categories {
        /// Print raw json
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Compare the accelerated and sequential similarity paths
    /// on random vectors
    Bench {
        /// Vector length
        #[clap(long, default_value = "384")]
        dimensions: usize,

        /// Candidate vectors per iteration
        #[clap(long, default_value = "100")]
        count: usize,

        /// Timed iterations per strategy
        #[clap(long, default_value = "5")]
        iterations: usize,

        /// Accelerated backend to measure, overrides compute.backend
        #[clap(long, value_enum)]
        backend: Option<BackendKind>,
    },
}
