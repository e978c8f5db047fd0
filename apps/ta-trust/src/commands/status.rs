// status.rs — Table of every category's current autonomy level.

use ta_graduation::MetricsStore;

use super::TrustContext;

pub fn execute(ctx: &TrustContext) -> anyhow::Result<()> {
    let records = ctx.store()?.list_all()?;

    if records.is_empty() {
        println!(
            "No categories recorded in {}",
            ctx.paths.metrics_dir.display()
        );
        return Ok(());
    }

    println!(
        "{:<24} {:<18} {:>8} {:>9} {:>6} {:>6}  GRADUATED",
        "CATEGORY", "LEVEL", "ACTIONS", "WINDOWED", "SEND", "EDIT"
    );
    println!("{}", "-".repeat(90));

    for m in &records {
        println!(
            "{:<24} {:<18} {:>8} {:>9} {:>6.2} {:>6.2}  {}",
            m.category,
            m.current_autonomy,
            m.total_actions,
            m.windowed_total,
            m.windowed_send_rate,
            m.windowed_avg_edit,
            m.graduated_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
