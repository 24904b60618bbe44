pub mod completions;
pub mod doctor;
pub mod plan;
pub mod recover;
pub mod release;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use vessel_runtime::{check_release_prereqs, MissingPrereq, Tools};
use vessel_schema::BuildPlan;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_INSTALL_ERROR: u8 = 3;
pub const EXIT_FIXUP_ERROR: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_stage(stage: &str) -> String {
    use console::Style;
    match stage {
        "installed" => Style::new().green().apply_to(stage).to_string(),
        "staged" => Style::new().cyan().apply_to(stage).to_string(),
        "built" | "fetched" => Style::new().yellow().apply_to(stage).to_string(),
        "resolved" => Style::new().dim().apply_to(stage).to_string(),
        other => other.to_owned(),
    }
}

/// Tools the plan's build methods and fetch strategies need that are not
/// installed.
pub fn missing_for_plan(plan: &BuildPlan, tools: &Tools, sudo: bool) -> Vec<MissingPrereq> {
    let methods: Vec<_> = plan.iter().map(|s| s.build_method).collect();
    let fetches: Vec<_> = plan.iter().filter_map(|s| s.fetch).collect();
    check_release_prereqs(tools, &methods, &fetches, sudo)
}
