use anyhow::Result;
use autologin_browser::probe_runtime;
use colored::Colorize;

/// Report whether node, the playwright package and a chromium build are present.
pub async fn run(json: bool) -> Result<i32> {
    let probe = probe_runtime().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
    } else {
        let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };
        println!(
            "{} node {}",
            mark(probe.node_available),
            probe.node_version.as_deref().unwrap_or("(missing)")
        );
        println!("{} playwright package", mark(probe.playwright_package_available));
        println!("{} chromium cache", mark(probe.chromium_cache_detected));
        for note in &probe.notes {
            println!("  {} {}", "note:".yellow(), note);
        }
    }

    Ok(if probe.ready { 0 } else { 1 })
}
