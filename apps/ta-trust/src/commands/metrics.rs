// metrics.rs — Metrics subcommands: set, show.
//
// `set` stands in for a metrics collector: it writes raw field values into a
// category's record, creating the record on first use.

use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;
use ta_graduation::{MetricsStore, MetricsUpdate};

use super::TrustContext;

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Set one or more metric fields (e.g., `windowed_total=28 send_rate=0.9`).
    Set {
        /// Category identifier (e.g., "email_replies").
        category: String,
        /// Assignments in `field=value` form. Values are parsed as JSON,
        /// falling back to a plain string (timestamps, level names).
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    /// Print a category's full metrics record as JSON.
    Show {
        /// Category identifier.
        category: String,
    },
}

pub fn execute(cmd: &MetricsCommands, ctx: &TrustContext) -> anyhow::Result<()> {
    let store = ctx.store()?;

    match cmd {
        MetricsCommands::Set {
            category,
            assignments,
        } => {
            let mut update = MetricsUpdate::new();
            for assignment in assignments {
                let (field, value) = parse_assignment(assignment)?;
                update = update.set(field, value);
            }
            store
                .upsert(category, &update)
                .with_context(|| format!("updating metrics for '{}'", category))?;
            println!(
                "Updated '{}': {}",
                category,
                update.field_names().collect::<Vec<_>>().join(", ")
            );
        }

        MetricsCommands::Show { category } => match store.get(category)? {
            Some(m) => println!("{}", serde_json::to_string_pretty(&m)?),
            None => println!("No metrics recorded for '{}'.", category),
        },
    }

    Ok(())
}

fn parse_assignment(assignment: &str) -> anyhow::Result<(String, Value)> {
    let (field, raw) = assignment
        .split_once('=')
        .with_context(|| format!("expected field=value, got '{}'", assignment))?;
    let field = field.trim();
    if field.is_empty() {
        anyhow::bail!("missing field name in '{}'", assignment);
    }
    let value =
        serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.trim().to_string()));
    Ok((field.to_string(), value))
}
