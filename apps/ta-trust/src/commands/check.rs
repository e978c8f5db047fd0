// check.rs — Explain the next pass for one category without changing it.

use super::TrustContext;

pub fn execute(ctx: &TrustContext, category: &str) -> anyhow::Result<()> {
    let engine = ctx.engine()?;

    let Some(trace) = engine.evaluate_with_trace(category)? else {
        println!("No metrics recorded for '{}'.", category);
        return Ok(());
    };

    println!("Category: {}", trace.category);
    println!("Level:    {}", trace.current);
    println!();
    for step in &trace.steps {
        println!(
            "  [{}] {:<18} {}",
            if step.satisfied { "x" } else { " " },
            step.check,
            step.outcome
        );
    }
    println!();
    match trace.decision {
        Some((trigger, target)) => println!("Next pass: {} → {}", trigger, target),
        None => println!("Next pass: no change"),
    }

    Ok(())
}
