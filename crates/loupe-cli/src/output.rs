//! Output formatting for CLI

use loupe_core::events::{EventRecord, SessionEvent};
use loupe_core::Rendition;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON for any serializable report
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

#[derive(Tabled)]
struct RenditionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
    #[tabled(rename = "Bitrate")]
    bitrate: String,
    #[tabled(rename = "Codecs")]
    codecs: String,
}

/// Rendition ladder as a table
pub fn rendition_table(renditions: &[Rendition]) -> String {
    let rows = renditions.iter().map(|r| RenditionRow {
        index: r.index,
        quality: r.label(),
        resolution: r.resolution.map(|res| res.to_string()).unwrap_or_else(|| "-".into()),
        bitrate: r.bitrate.map(format_bitrate).unwrap_or_else(|| "-".into()),
        codecs: r.codecs.clone().unwrap_or_else(|| "-".into()),
    });
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Event")]
    event: String,
}

/// Session events as a table
pub fn event_table(events: &[EventRecord]) -> String {
    let rows = events.iter().map(|r| EventRow {
        at: format_ms(r.at.as_millis() as u64),
        event: describe_event(&r.event),
    });
    Table::new(rows).to_string()
}

/// One-line description of a session event
pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged { from, to } => format!("state {from} -> {to}"),
        SessionEvent::ManifestLoaded {
            renditions,
            network,
            initial_index,
            auto_enabled,
            ..
        } => format!(
            "manifest: {renditions} renditions, network {network}, start {}{}",
            initial_index.map(|i| format!("#{i}")).unwrap_or_else(|| "-".into()),
            if *auto_enabled { " (auto)" } else { " (pinned)" }
        ),
        SessionEvent::Stall(stall) => format!(
            "stall #{} ({:?}): {:?}",
            stall.stall_count, stall.source, stall.actions
        ),
        SessionEvent::Seek(seek) => format!(
            "seek {:.2}s -> {:.2}s ({:+.2}s){}",
            seek.from_time,
            seek.to_time,
            seek.delta,
            if seek.large_backward { " large backward" } else { "" }
        ),
        SessionEvent::RenditionPinned { index, reason } => format!("pinned #{index} ({reason:?})"),
        SessionEvent::AutoSelectionRestored => "automatic selection restored".into(),
        SessionEvent::AutoLevelSwitched { index, estimate_bps } => format!(
            "auto switch to #{index} (estimate {})",
            estimate_bps.map(format_bitrate).unwrap_or_else(|| "-".into())
        ),
        SessionEvent::BufferTargetsChanged(t) => format!(
            "buffer forward {:.1}s, max {:.1}s, back {:.1}s",
            t.forward_secs, t.max_forward_secs, t.back_secs
        ),
        SessionEvent::ErrorRecovery { code, attempt } => format!("recovering {code} (attempt {attempt})"),
        SessionEvent::Fatal { code, message } => format!("fatal {code}: {message}"),
        SessionEvent::Destroyed { timers_cancelled } => format!("destroyed ({timers_cancelled} timers cancelled)"),
    }
}

pub fn format_bitrate(bps: u64) -> String {
    if bps >= 1_000_000 {
        format!("{:.2} Mbps", bps as f64 / 1_000_000.0)
    } else {
        format!("{} kbps", bps / 1_000)
    }
}

pub fn format_ms(ms: u64) -> String {
    format!("{}.{:03}s", ms / 1_000, ms % 1_000)
}
