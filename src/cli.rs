use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vidharvest::pipeline::Stage;

#[derive(Parser, Debug)]
#[command(name = "vidharvest")]
#[command(about = "Incremental video platform metadata harvester", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to $VIDHARVEST_CONFIG or config/vidharvest.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the selected stages once, in pipeline order
    Run(RunArgs),
    /// Arm the recurring scheduler until interrupted
    Serve,
    /// Show pending, archived and dead-lettered descriptor counts
    Queues,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Stages to run
    #[arg(value_enum, required = true, num_args = 1..)]
    pub stages: Vec<Stage>,

    /// Override the staleness threshold of stage-channel-check, in minutes
    #[arg(long)]
    pub threshold_minutes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_threshold() {
        let cli = Cli::parse_from([
            "vidharvest",
            "--config",
            "custom.toml",
            "run",
            "stage-channel-check",
            "run-channel-check",
            "--threshold-minutes",
            "90",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(
                    args.stages,
                    vec![Stage::StageChannelCheck, Stage::RunChannelCheck]
                );
                assert_eq!(args.threshold_minutes, Some(90));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_a_stage() {
        assert!(Cli::try_parse_from(["vidharvest", "run"]).is_err());
        assert!(Cli::try_parse_from(["vidharvest", "run", "bogus"]).is_err());
    }
}
