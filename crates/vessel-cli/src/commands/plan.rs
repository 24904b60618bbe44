use super::{json_pretty, EXIT_SUCCESS};
use serde::Serialize;
use std::path::Path;
use vessel_core::{load_plan, DependencyGraph};
use vessel_schema::{BuildMethod, BuildPlan};

#[derive(Debug, Serialize)]
struct PlanRow<'a> {
    name: &'a str,
    version: &'a str,
    method: String,
    fetch: Option<String>,
    wave: usize,
    maintainer: &'a str,
    depends: Vec<&'a str>,
}

fn rows(plan: &BuildPlan) -> Result<Vec<PlanRow<'_>>, String> {
    let graph = DependencyGraph::from_plan(plan).map_err(|e| e.to_string())?;
    let specs: Vec<_> = plan.iter().collect();
    let mut rows = Vec::with_capacity(plan.len());
    for (wave, members) in graph.waves().into_iter().enumerate() {
        for i in members {
            let spec = specs[i];
            rows.push(PlanRow {
                name: spec.name.as_str(),
                version: spec.version.as_str(),
                method: spec.build_method.to_string(),
                fetch: spec.fetch.map(|f| f.to_string()),
                wave,
                maintainer: &spec.maintainer,
                depends: spec.depends.iter().map(|d| d.as_str()).collect(),
            });
        }
    }
    Ok(rows)
}

/// Package count per build method, methods the plan does not use omitted.
fn method_counts(plan: &BuildPlan) -> Vec<(BuildMethod, usize)> {
    [
        BuildMethod::Cmake,
        BuildMethod::Pip,
        BuildMethod::Sh,
        BuildMethod::Rsync,
        BuildMethod::Noop,
    ]
    .into_iter()
    .map(|m| (m, plan.with_method(m).count()))
    .filter(|&(_, n)| n > 0)
    .collect()
}

pub fn run(pkgs: &Path, repo: &Path, json: bool) -> Result<u8, String> {
    let (_, plan) = load_plan(pkgs, repo).map_err(|e| e.to_string())?;
    let rows = rows(&plan)?;

    if json {
        println!("{}", json_pretty(&rows)?);
        return Ok(EXIT_SUCCESS);
    }
    if rows.is_empty() {
        println!("no packages in release.");
        return Ok(EXIT_SUCCESS);
    }
    println!(
        "{:<5} {:<24} {:<14} {:<7} {:<6} MAINTAINER",
        "WAVE", "NAME", "VERSION", "METHOD", "FETCH"
    );
    for row in &rows {
        println!(
            "{:<5} {:<24} {:<14} {:<7} {:<6} {}",
            row.wave,
            row.name,
            row.version,
            row.method,
            row.fetch.as_deref().unwrap_or("-"),
            row.maintainer
        );
    }
    let counts: Vec<String> = method_counts(&plan)
        .into_iter()
        .map(|(m, n)| format!("{m} {n}"))
        .collect();
    println!("\n{} packages: {}", rows.len(), counts.join(", "));
    Ok(EXIT_SUCCESS)
}
