//! Terminal rendering of node outputs and host updates.

use colored::Colorize;
use machina_bridge::{OutputUpdate, SolveOutcome, Trigger};
use machina_types::{ACTION_EXECUTED_NODE, NodeOutputs, ParamAccess, Plane};

pub fn print_outputs(outputs: &NodeOutputs) {
    for (param, value) in ACTION_EXECUTED_NODE.outputs.iter().zip(slot_values(outputs)) {
        println!("    {:<7} : {}", param.nickname, value);
    }
}

/// Node name, description and parameters, as the `/node` command shows them.
pub fn print_descriptor() {
    let node = ACTION_EXECUTED_NODE;
    println!(
        "{} {}",
        node.name.bold().underline(),
        format!("({}/{})", node.category, node.subcategory).dimmed()
    );
    println!("  {}", node.description);
    println!("  {}", "Input".bold());
    println!("    {:<7} {:<22} {}", node.input.nickname.cyan(), node.input.name, node.input.description);
    println!("  {}", "Outputs".bold());
    for param in &node.outputs {
        let access = match param.access {
            ParamAccess::Item => "item",
            ParamAccess::List => "list",
        };
        println!(
            "    {:<7} {:<22} {} {}",
            param.nickname.cyan(),
            param.name,
            format!("[{access}]").dimmed(),
            param.description
        );
    }
}

/// Display text for each output slot, in slot order.
pub(crate) fn slot_values(outputs: &NodeOutputs) -> [String; 6] {
    let last = if outputs.last_instruction.is_empty() {
        "<none>".dimmed().to_string()
    } else {
        outputs.last_instruction.bold().to_string()
    };
    [
        last,
        format_pose(outputs.tcp_pose.as_ref()),
        format_list(&outputs.axes),
        format_list(&outputs.external_axes),
        outputs.pending_total.to_string(),
        outputs.pending_on_device.to_string(),
    ]
}

pub fn print_update(update: &OutputUpdate) {
    let when = update.timestamp.format("%H:%M:%S%.3f").to_string();
    let trigger = match update.trigger {
        Trigger::Input => "input",
        Trigger::Refresh => "refresh",
    };
    match &update.result {
        Ok(outcome) => {
            println!("  [{}] {:<7} {}", when.dimmed(), trigger, describe(*outcome));
            // Only the emit-only pass carries freshly published values.
            if *outcome == SolveOutcome::Primed
                && let Some(outputs) = &update.outputs
            {
                print_outputs(outputs);
            }
        }
        Err(e) => {
            println!("  [{}] {:<7} {} {}", when.dimmed(), trigger, "error:".red().bold(), e);
        }
    }
}

pub fn describe(outcome: SolveOutcome) -> String {
    match outcome {
        SolveOutcome::NoInput => "no input".dimmed().to_string(),
        SolveOutcome::Primed => "outputs published".green().to_string(),
        SolveOutcome::Unchanged => "duplicate event".dimmed().to_string(),
        SolveOutcome::Ignored => "other event channel".dimmed().to_string(),
        SolveOutcome::NewEvent { id } => format!("{} #{}", "new event".cyan().bold(), id),
    }
}

pub(crate) fn format_pose(pose: Option<&Plane>) -> String {
    match pose {
        None => "<unset>".to_string(),
        Some(p) => format!(
            "O({:.3}, {:.3}, {:.3}) X({:.3}, {:.3}, {:.3}) Y({:.3}, {:.3}, {:.3})",
            p.origin.x, p.origin.y, p.origin.z,
            p.x_axis.x, p.x_axis.y, p.x_axis.z,
            p.y_axis.x, p.y_axis.y, p.y_axis.z,
        ),
    }
}

pub(crate) fn format_list(values: &[Option<f64>]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| match v {
            Some(x) => format!("{x}"),
            None => "null".to_string(),
        })
        .collect();
    format!("[{}]", items.join(", "))
}
