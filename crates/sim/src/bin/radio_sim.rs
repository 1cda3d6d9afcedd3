//! simple wireless radio simulation

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use simple_wireless_sim::{run_scenario, scenarios, Scenario, ScenarioReport, SimulationPresets};

#[derive(Parser, Debug)]
#[command(
    name = "radio_sim",
    about = "Runs simple wireless channel scenarios and reports per-node results",
    long_about = "Without scenario files the reference suite runs, followed by a sweep over the channel presets."
)]
struct Cli {
    /// Print the reports as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// JSON scenario files to run
    scenarios: Vec<PathBuf>,
}

fn print_report(report: &ScenarioReport) {
    println!("{}", format!("\n>>> {}", report.name).bright_green().bold());
    println!(
        "Simulated {:.3}s in {} events",
        report.end_time_secs, report.events
    );
    let ch = &report.channel;
    println!(
        "Channel: {} transmissions, {} deliveries, skipped {} out of range / {} in error / {} link down / {} directional",
        ch.transmissions,
        ch.deliveries_scheduled,
        ch.skipped_out_of_range,
        ch.skipped_in_error,
        ch.skipped_link_down,
        ch.skipped_directional
    );
    println!(
        "{:>4}  {:<17} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "node", "address", "offered", "sent", "recv", "rx drop", "q drop", "q lat us"
    );
    for node in &report.nodes {
        println!(
            "{:>4}  {:<17} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10.1}",
            node.node,
            node.address,
            node.offered,
            node.transmitted,
            node.received,
            node.rx_dropped,
            node.queue_dropped,
            node.mean_queue_latency_us
        );
    }
    for file in &report.pcap_files {
        println!("Capture written to {}", file.bright_cyan());
    }
}

fn load(path: &Path) -> Result<Scenario> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn preset_sweep() -> Vec<Scenario> {
    let presets = [
        ("good conditions", SimulationPresets::good_conditions()),
        ("average conditions", SimulationPresets::average_conditions()),
        ("poor conditions", SimulationPresets::poor_conditions()),
        ("extreme conditions", SimulationPresets::extreme_conditions()),
    ];
    presets
        .into_iter()
        .map(|(name, channel)| Scenario {
            name: name.to_string(),
            channel,
            ..scenarios::constant_error(0.0)
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();
    let json = cli.json;

    let suite: Vec<Scenario> = if cli.scenarios.is_empty() {
        let mut suite = scenarios::reference_suite();
        suite.extend(preset_sweep());
        suite
    } else {
        cli.scenarios.iter().map(|p| load(p)).collect::<Result<_>>()?
    };

    if !json {
        println!("{}", "Simple Wireless Radio Simulation".bright_blue().bold());
        println!("{}", "================================".bright_blue());
    }

    let progress = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(suite.len() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("[{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut reports = Vec::with_capacity(suite.len());
    for scenario in &suite {
        progress.set_message(scenario.name.clone());
        let report = run_scenario(scenario)
            .with_context(|| format!("scenario {:?}", scenario.name))?;
        reports.push(report);
        progress.inc(1);
    }
    progress.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        print_report(report);
    }
    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
