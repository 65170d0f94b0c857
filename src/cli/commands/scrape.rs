//! Scrape command implementation.

use console::style;

use unipass_scraper::config::Settings;
use unipass_scraper::scrapers::{RunReport, RunState, ScrapeController};
use unipass_scraper::storage::{OutputLayout, ResultStore};

/// Scrape every case reachable from the configured start date.
pub async fn cmd_scrape(settings: &Settings) -> anyhow::Result<()> {
    let layout = OutputLayout::new(&settings.output_dir);
    layout.prepare()?;

    println!(
        "{} Scraping cases since {}-{:02} into {}",
        style("→").cyan(),
        settings.start_year,
        settings.start_month,
        layout.root().display()
    );

    let report = run_with_browser(settings, layout).await?;
    print_summary(&report);

    if report.state == RunState::Aborted {
        anyhow::bail!(
            "scrape aborted: {}",
            report.abort_reason.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[cfg(feature = "browser")]
async fn run_with_browser(settings: &Settings, layout: OutputLayout) -> anyhow::Result<RunReport> {
    use unipass_scraper::browser::ChromiumSession;

    let mut session = ChromiumSession::launch(settings.browser.clone()).await?;
    let mut controller = ScrapeController::new(settings.scrape_options(), ResultStore::new(layout));
    let report = controller.run(&mut session).await;
    session.shutdown().await;
    Ok(report)
}

#[cfg(not(feature = "browser"))]
async fn run_with_browser(_settings: &Settings, _layout: OutputLayout) -> anyhow::Result<RunReport> {
    anyhow::bail!("browser support not compiled in; rebuild with --features browser")
}

fn print_summary(report: &RunReport) {
    let (glyph, label) = match report.state {
        RunState::Aborted => (style("✗").red(), "Aborted"),
        _ => (style("✓").green(), "Done"),
    };
    println!(
        "{} {}: {} records from {} of {} pages",
        glyph, label, report.records, report.last_page, report.total_pages
    );
    if report.skipped_cases > 0 {
        println!(
            "  {} {} cases skipped",
            style("!").yellow(),
            report.skipped_cases
        );
    }
    if !report.skipped_pages.is_empty() {
        let pages: Vec<String> = report.skipped_pages.iter().map(|p| p.to_string()).collect();
        println!(
            "  {} pages skipped: {}",
            style("!").yellow(),
            pages.join(", ")
        );
    }
    println!(
        "  {} {} group transitions, {} checkpoints",
        style("→").dim(),
        report.group_transitions,
        report.checkpoints
    );
    if let Some(err) = &report.flush_error {
        println!("  {} final save failed: {}", style("✗").red(), err);
    }
}
