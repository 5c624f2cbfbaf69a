//! CLI command implementations

use anyhow::{Context, Result};
use loupe_core::abr::InitialPick;
use loupe_core::sim::{self, ReplayReport, SimFragmentLoader, Trace};
use loupe_core::{
    classify, parse_manifest, ControllerConfig, HlsManifestLoader, HostEnvironment, Manifest, ManifestLoader,
    NetworkClass, Rendition, RenditionSelector,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;
use url::Url;

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize)]
struct Analysis {
    source: String,
    is_live: bool,
    network: NetworkClass,
    constrained: bool,
    initial_index: Option<usize>,
    auto_enabled: bool,
    restore_after_ms: Option<u64>,
    renditions: Vec<Rendition>,
}

/// Load a manifest, list its renditions and report the initial pick
pub async fn analyze(
    manifest: &str,
    effective_type: Option<&str>,
    host: HostEnvironment,
    format: &str,
) -> Result<()> {
    let config = ControllerConfig::default();
    let manifest = load_manifest(manifest).await?;
    info!(renditions = manifest.renditions.len(), "Manifest loaded");

    let network = classify(effective_type, host.viewport_width, config.mobile_max_width);
    let pick = initial_pick(&manifest, network, &config, &host);

    let analysis = Analysis {
        source: manifest.source.to_string(),
        is_live: manifest.is_live,
        network,
        constrained: host.is_constrained(config.mobile_max_width),
        initial_index: pick.index,
        auto_enabled: pick.auto_enabled,
        restore_after_ms: pick.restore_after.map(|d| d.as_millis() as u64),
        renditions: manifest.renditions.to_vec(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&analysis)?),
        OutputFormat::Table => {
            println!("{}", output::rendition_table(&analysis.renditions));
            print_pick(&analysis);
        }
        OutputFormat::Text => {
            println!("Manifest: {}", analysis.source);
            println!("Type: {}", if analysis.is_live { "live" } else { "VOD" });
            println!("Renditions: {}", analysis.renditions.len());
            for r in &analysis.renditions {
                println!(
                    "  [{}] {} {}{}",
                    r.index,
                    r.label(),
                    r.bitrate.map(output::format_bitrate).unwrap_or_else(|| "-".into()),
                    r.codecs.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
                );
            }
            print_pick(&analysis);
        }
    }

    Ok(())
}

fn print_pick(analysis: &Analysis) {
    println!(
        "Network: {}{}",
        analysis.network,
        if analysis.constrained { " (constrained platform)" } else { "" }
    );
    match analysis.initial_index.and_then(|i| analysis.renditions.get(i)) {
        Some(r) => {
            let mode = match (analysis.auto_enabled, analysis.restore_after_ms) {
                (true, _) => "auto".to_string(),
                (false, Some(ms)) => format!("pinned, auto after {}", output::format_ms(ms)),
                (false, None) => "pinned".to_string(),
            };
            println!("Initial pick: [{}] {} ({mode})", r.index, r.label());
        }
        None => println!("Initial pick: none (no renditions)"),
    }
}

/// Run the initial pick against a throwaway loader
fn initial_pick(
    manifest: &Manifest,
    network: NetworkClass,
    config: &ControllerConfig,
    host: &HostEnvironment,
) -> InitialPick {
    let mut loader = SimFragmentLoader::new(manifest.renditions.to_vec());
    let mut selector = RenditionSelector::new(manifest.renditions.clone(), config, host);
    selector.initial_pick(network, config, &mut loader)
}

async fn load_manifest(location: &str) -> Result<Manifest> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location).context("Invalid manifest URL")?;
        let loader = HlsManifestLoader::new()?;
        return Ok(loader.load(&url).await?);
    }

    let path = Path::new(location)
        .canonicalize()
        .with_context(|| format!("Manifest not found: {location}"))?;
    let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let base = Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("Cannot build a file URL for {}", path.display()))?;
    Ok(parse_manifest(&content, &base)?)
}

/// Replay a recorded trace and print what the session did
pub fn simulate(trace_path: &Path, config_path: Option<&Path>, format: &str) -> Result<()> {
    let content = std::fs::read_to_string(trace_path)
        .with_context(|| format!("Failed to read trace {}", trace_path.display()))?;
    let trace: Trace = serde_json::from_str(&content).context("Invalid trace file")?;

    let config = match config_path {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };

    info!(steps = trace.steps.len(), source = %trace.source, "Replaying trace");
    let report = sim::replay(&trace, config)?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)?),
        OutputFormat::Table => {
            print_timeline(&report);
            println!();
            println!("{}", output::event_table(&report.events));
            print_summary(&report);
        }
        OutputFormat::Text => {
            print_timeline(&report);
            println!();
            println!("Events:");
            for record in &report.events {
                println!(
                    "  {:>9}  {}",
                    output::format_ms(record.at.as_millis() as u64),
                    output::describe_event(&record.event)
                );
            }
            print_summary(&report);
        }
    }

    Ok(())
}

fn print_timeline(report: &ReplayReport) {
    println!("Session {}{}", report.session_id, if report.native { " (native)" } else { "" });
    println!("Status timeline:");
    for change in &report.timeline {
        println!("  {:>9}  {}", output::format_ms(change.at_ms), change.status);
    }
}

fn print_summary(report: &ReplayReport) {
    println!();
    println!("Stalls: {}", report.stall_count);
    println!(
        "Rendition: {} ({})",
        report.current_rendition_index,
        if report.auto_selection_enabled { "auto" } else { "pinned" }
    );
    println!(
        "Buffer: forward {:.1}s, max {:.1}s, back {:.1}s",
        report.buffer_targets.forward_secs, report.buffer_targets.max_forward_secs, report.buffer_targets.back_secs
    );
    println!("Timers cancelled on destroy: {}", report.timers_cancelled);
}
