// evaluate.rs — Run one graduation pass across every category.
//
// Each applied transition is written to the JSONL event log. Categories that
// failed to evaluate, and transitions whose event could not be logged, are
// reported after the pass and make the command exit non-zero so a scheduler
// can alert on them; the other categories are still applied.

use ta_graduation::{EventDispatcher, LogSink, MetricsStore, TransitionEvent};

use super::TrustContext;

pub fn execute(ctx: &TrustContext, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        return preview(ctx);
    }

    let engine = ctx.engine()?;
    let report = engine.evaluate_all()?;

    let mut dispatcher = EventDispatcher::new();
    dispatcher.add_sink(Box::new(LogSink::new(&ctx.paths.events_log)));

    if report.changes.is_empty() {
        println!("No autonomy changes.");
    }
    let mut unlogged = Vec::new();
    for transition in report.changes.values() {
        if dispatcher.dispatch(&TransitionEvent::from(transition)) == 0 {
            unlogged.push(transition.category.as_str());
        }
        println!(
            "{:<24} {:<10} {} → {}",
            transition.category, transition.trigger, transition.previous, transition.new
        );
    }
    tracing::info!(
        "logged {} of {} transition events to {}",
        report.changes.len() - unlogged.len(),
        report.changes.len(),
        ctx.paths.events_log.display()
    );

    for (category, error) in &report.failures {
        eprintln!("{:<24} FAILED     {}", category, error);
    }
    for category in &unlogged {
        eprintln!(
            "{:<24} UNLOGGED   transition applied but not written to {}",
            category,
            ctx.paths.events_log.display()
        );
    }

    if !report.is_clean() || !unlogged.is_empty() {
        anyhow::bail!(
            "{} failed, {} unlogged",
            plural(report.failures.len()),
            plural(unlogged.len())
        );
    }

    Ok(())
}

fn plural(n: usize) -> String {
    format!("{} categor{}", n, if n == 1 { "y" } else { "ies" })
}

fn preview(ctx: &TrustContext) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let mut any = false;
    let mut failed = 0;

    for category in engine.store().list_categories()? {
        let trace = match engine.evaluate_with_trace(&category) {
            Ok(Some(trace)) => trace,
            Ok(None) => continue,
            Err(e) => {
                failed += 1;
                eprintln!("{:<24} FAILED     {}", category, e);
                continue;
            }
        };
        if let Some((trigger, target)) = trace.decision {
            any = true;
            println!(
                "{:<24} {:<10} {} → {} (dry run)",
                trace.category, trigger, trace.current, target
            );
        }
    }

    if !any {
        println!("No autonomy changes.");
    }
    if failed > 0 {
        anyhow::bail!("{} failed", plural(failed));
    }
    Ok(())
}
