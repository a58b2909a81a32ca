use clap::Parser;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};
use workload_planner::{
    DeploymentPlan, Violations,
    diff::{self, Changeset},
    resolve,
};
use workload_planner_telemetry::Tracing;

use crate::cli::{Cli, Command, DiffArguments, InventoryArguments, OutputArguments, PlanArguments};

mod cli;
mod loader;
mod output;

const SERVICE_NAME: &str = "workload-planner";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitTracing {
        source: workload_planner_telemetry::tracing::Error,
    },

    #[snafu(display("failed to load inventory"))]
    LoadInventory { source: loader::Error },

    #[snafu(display("failed to load previous plan"))]
    LoadPreviousPlan { source: loader::Error },

    #[snafu(display("the inventory cannot be resolved into a deployment plan"))]
    ResolvePlan { source: Violations },

    #[snafu(display("failed to write output"))]
    WriteOutput { source: output::Error },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let Cli { command, telemetry } = Cli::parse();
    let _tracing_guard = Tracing::pre_configured(SERVICE_NAME, telemetry)
        .init()
        .context(InitTracingSnafu)?;

    match command {
        Command::Plan(PlanArguments { inventory, output }) => {
            let plan = resolve_inventory(&inventory)?;
            write_output(&output, &plan)
        }
        Command::Check(inventory) => {
            let plan = resolve_inventory(&inventory)?;
            println!("{}", plan.summary());
            Ok(())
        }
        Command::Diff(DiffArguments {
            inventory,
            previous,
            output,
        }) => {
            let previous: DeploymentPlan =
                loader::read_document(&previous).context(LoadPreviousPlanSnafu)?;
            let next = resolve_inventory(&inventory)?;
            let changeset: Changeset = diff::changeset(&previous, &next);
            info!(hosts = changeset.hosts.len(), "computed plan changeset");
            write_output(&output, &changeset)
        }
    }
}

fn resolve_inventory(arguments: &InventoryArguments) -> Result<DeploymentPlan, Error> {
    let inventory = loader::load_inventory(&arguments.inventories).context(LoadInventorySnafu)?;
    resolve(&inventory).context(ResolvePlanSnafu)
}

fn write_output(arguments: &OutputArguments, value: &impl serde::Serialize) -> Result<(), Error> {
    debug!(
        format = %arguments.output_format,
        output = ?arguments.output,
        "writing output"
    );
    let writer = output::open(arguments.output.as_deref()).context(WriteOutputSnafu)?;
    output::write(writer, arguments.output_format, value).context(WriteOutputSnafu)
}
