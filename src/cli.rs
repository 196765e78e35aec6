use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Recipe generation from the ingredients you have", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve {
        /// Overrides HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate one recipe and print the JSON result
    Generate {
        /// Free-text description of ingredients, amounts and goals
        #[arg(short, long)]
        input: String,
    },
    /// Create the recipe collection and load it from a CSV export
    Populate {
        /// CSV with title, directions, NER and ingredients columns
        #[arg(short, long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        /// Ollama endpoint as reachable from the store
        #[arg(long, default_value = "http://host.docker.internal:11434")]
        ollama_endpoint: String,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
