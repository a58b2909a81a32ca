//! Command line arguments.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use workload_planner_telemetry::tracing::TelemetryOptions;

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "workload-planner",
    version,
    about = "Resolves workload inventories into deployment plans"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Resolve the inventory and print the deployment plan.
    Plan(PlanArguments),

    /// Resolve the inventory and print a summary, or every problem found.
    Check(InventoryArguments),

    /// Resolve the inventory and print what changed compared to a previous plan.
    Diff(DiffArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct InventoryArguments {
    /// Inventory FILE (YAML or JSON). Repeat to layer several inventories, later files take precedence.
    #[arg(
        short,
        long = "inventory",
        env = "INVENTORY",
        value_name = "FILE",
        value_delimiter = ',',
        required = true
    )]
    pub inventories: Vec<PathBuf>,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct OutputArguments {
    /// Format of the written document.
    #[arg(long, env, value_name = "FORMAT", default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Write to FILE instead of stdout.
    #[arg(short, long, env, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct PlanArguments {
    #[command(flatten)]
    pub inventory: InventoryArguments,

    #[command(flatten)]
    pub output: OutputArguments,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct DiffArguments {
    #[command(flatten)]
    pub inventory: InventoryArguments,

    /// A plan previously written by `plan` (YAML or JSON).
    #[arg(long, env, value_name = "PLAN")]
    pub previous: PathBuf,

    #[command(flatten)]
    pub output: OutputArguments,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use rstest::rstest;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn plan_with_layered_inventories() {
        let cli = Cli::parse_from([
            "workload-planner",
            "plan",
            "-i",
            "group.yaml",
            "-i",
            "site.yaml",
            "--output-format",
            "json",
        ]);
        assert_eq!(
            cli.command,
            Command::Plan(PlanArguments {
                inventory: InventoryArguments {
                    inventories: vec![PathBuf::from("group.yaml"), PathBuf::from("site.yaml")],
                },
                output: OutputArguments {
                    output_format: OutputFormat::Json,
                    output: None,
                },
            })
        );
        assert_eq!(cli.telemetry, TelemetryOptions::default());
    }

    #[rstest]
    #[case(&["workload-planner", "check"])]
    #[case(&["workload-planner", "diff", "-i", "inventory.yaml"])]
    #[case(&["workload-planner", "plan", "-i", "inventory.yaml", "--output-format", "toml"])]
    fn rejected_arguments(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
