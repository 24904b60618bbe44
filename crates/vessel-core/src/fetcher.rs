use crate::CoreError;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use vessel_runtime::{select_method, FetchContext, ProcessRunner, Tools};
use vessel_schema::{package_key, BuildPlan, PackageSpec};
use vessel_store::DownloadCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Fetched,
    Cached,
    Skipped,
}

/// Package keys (`name-version`) by what the fetch phase did with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub fetched: Vec<String>,
    pub cached: Vec<String>,
    /// Packages without a source, built from local inputs only.
    pub skipped: Vec<String>,
}

/// The cache entry a package's build reads from, if it has a fetch strategy.
pub fn artifact_path(cache: &DownloadCache, spec: &PackageSpec) -> Option<PathBuf> {
    spec.fetch.map(|_| cache.entry(&spec.name, &spec.version))
}

pub(crate) fn thread_pool(jobs: usize) -> Result<rayon::ThreadPool, CoreError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("vessel-worker-{i}"))
        .build()
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))
}

fn fetch_one(
    spec: &PackageSpec,
    cache: &DownloadCache,
    tools: &Tools,
    runner: &dyn ProcessRunner,
) -> Result<FetchOutcome, CoreError> {
    if spec.fetch.is_none() {
        return Ok(FetchOutcome::Skipped);
    }
    if cache.contains(&spec.name, &spec.version) {
        debug!("{} already cached", package_key(&spec.name, &spec.version));
        return Ok(FetchOutcome::Cached);
    }

    let backend = select_method(spec.build_method);
    cache
        .populate(&spec.name, &spec.version, |dest| {
            backend.fetch(&FetchContext { spec, dest, tools }, runner)
        })
        .map_err(|source| CoreError::Fetch {
            package: spec.name.to_string(),
            version: spec.version.to_string(),
            source,
        })?;
    Ok(FetchOutcome::Fetched)
}

/// Make sure every package with a source has a complete cache entry.
///
/// Fetches run on a pool of `jobs` threads. The first failure is returned;
/// entries fetched successfully stay in the cache.
pub fn fetch_all(
    plan: &BuildPlan,
    cache: &DownloadCache,
    tools: &Tools,
    runner: &dyn ProcessRunner,
    jobs: usize,
) -> Result<FetchSummary, CoreError> {
    info!("fetching {} packages into {}", plan.len(), cache.root().display());
    let specs: Vec<&PackageSpec> = plan.iter().collect();
    let pool = thread_pool(jobs)?;
    let outcomes = pool.install(|| {
        specs
            .par_iter()
            .map(|spec| fetch_one(spec, cache, tools, runner).map(|o| (*spec, o)))
            .collect::<Result<Vec<_>, CoreError>>()
    })?;

    let mut summary = FetchSummary::default();
    for (spec, outcome) in outcomes {
        let key = package_key(&spec.name, &spec.version);
        match outcome {
            FetchOutcome::Fetched => summary.fetched.push(key),
            FetchOutcome::Cached => summary.cached.push(key),
            FetchOutcome::Skipped => summary.skipped.push(key),
        }
    }
    Ok(summary)
}
