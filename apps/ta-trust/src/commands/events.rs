// events.rs — Events subcommands: tail.

use clap::Subcommand;
use ta_graduation::LogSink;

use super::TrustContext;

#[derive(Subcommand)]
pub enum EventsCommands {
    /// Show recent autonomy transitions.
    Tail {
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &EventsCommands, ctx: &TrustContext) -> anyhow::Result<()> {
    match cmd {
        EventsCommands::Tail { n } => {
            let events = LogSink::read_all(&ctx.paths.events_log)?;
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];

            if recent.is_empty() {
                println!("No transition events.");
                return Ok(());
            }

            println!(
                "{:<20} {:<24} {:<10} TRANSITION",
                "TIMESTAMP", "CATEGORY", "TRIGGER"
            );
            println!("{}", "-".repeat(80));

            for event in recent {
                println!(
                    "{:<20} {:<24} {:<10} {} → {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.category,
                    event.trigger,
                    event.previous_level,
                    event.new_level,
                );
            }
        }
    }

    Ok(())
}
