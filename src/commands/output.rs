use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{CollectedOutputs, OutputSpec, build_plan, collect};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::OutputArgs;
use crate::engine::{self, Stack};
use crate::state::RunRecord;
use crate::ui;

pub fn run(ctx: &Context, args: OutputArgs) -> Result<()> {
    let stack = Stack::load(ctx)?;
    let plan = build_plan(&stack.topology).context("Could not order resources")?;
    let provider = stack.provider()?;
    let observed = engine::observe(&plan, &provider, 4)?;
    let outputs = collect(stack.topology.outputs(), &observed);

    if args.json {
        let values = json_outputs(stack.topology.outputs(), &outputs);
        let json = serde_json::to_string_pretty(&values).context("Failed to serialize outputs")?;
        println!("{json}");
        return Ok(());
    }

    if stack.topology.outputs().is_empty() {
        ui::info("The stack declares no outputs");
        return Ok(());
    }
    print_outputs(stack.topology.outputs(), &outputs);
    if outputs.values.is_empty() {
        ui::dim("Nothing resolved yet - run `stackform apply` first");
    }
    if let Some(record) = RunRecord::load(&stack.record_path())? {
        println!();
        ui::dim(&format!(
            "Last run: {:?} at {} ({}, {} ms)",
            record.kind,
            record.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            if record.success { "succeeded" } else { "failed" },
            record.duration_ms()
        ));
    }
    Ok(())
}

/// Print resolved outputs, then the names of unresolved ones
pub fn print_outputs(specs: &[OutputSpec], outputs: &CollectedOutputs) {
    if specs.is_empty() {
        return;
    }
    ui::section("Outputs");
    for spec in specs {
        match outputs.get(&spec.name) {
            Some(value) => {
                println!("  {} = {}", spec.name.bold(), value);
                if let Some(description) = &spec.description {
                    println!("    {}", description.dimmed());
                }
                if let Some(export) = &spec.export_name {
                    println!("    {}", format!("exported as {export}").dimmed());
                }
            }
            None => println!(
                "  {} = {}",
                spec.name.bold(),
                format!("<unresolved: {}.{}>", spec.resource, spec.attribute).dimmed()
            ),
        }
    }
}

/// A resolved output as printed by `output --json`
#[derive(Debug, Serialize, PartialEq, Eq)]
struct OutputValue<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export_name: Option<&'a str>,
}

fn json_outputs<'a>(
    specs: &'a [OutputSpec],
    outputs: &'a CollectedOutputs,
) -> BTreeMap<&'a str, OutputValue<'a>> {
    specs
        .iter()
        .filter_map(|spec| {
            let value = outputs.get(&spec.name)?;
            let entry = OutputValue {
                value,
                description: spec.description.as_deref(),
                export_name: spec.export_name.as_deref(),
            };
            Some((spec.name.as_str(), entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_outputs_carry_export_names() {
        let specs = vec![
            OutputSpec {
                description: Some("The public IP of the web server".into()),
                export_name: Some("ec2PublicIp".into()),
                ..OutputSpec::new("ec2PublicIp", "web", "public_ip")
            },
            OutputSpec::new("instanceId", "web", "id"),
            OutputSpec::new("lbDns", "alb", "dns_name"),
        ];
        let outputs = CollectedOutputs {
            values: BTreeMap::from([
                ("ec2PublicIp".to_string(), "3.80.1.2".to_string()),
                ("instanceId".to_string(), "i-0abc".to_string()),
            ]),
            unresolved: vec!["lbDns".to_string()],
            exports: BTreeMap::new(),
        };

        let json = serde_json::to_value(json_outputs(&specs, &outputs)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ec2PublicIp": {
                    "value": "3.80.1.2",
                    "description": "The public IP of the web server",
                    "export_name": "ec2PublicIp"
                },
                "instanceId": { "value": "i-0abc" }
            })
        );
    }
}
