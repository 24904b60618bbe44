mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::doctor::DoctorArgs;
use commands::release::ReleaseArgs;
use commands::{EXIT_FAILURE, EXIT_INSTALL_ERROR, EXIT_MANIFEST_ERROR};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use vessel_core::{install_signal_handler, Settings};

#[derive(Debug, Parser)]
#[command(
    name = "vessel",
    version,
    about = "Build and atomically install pinned software releases into a shared prefix"
)]
struct Cli {
    /// Settings file [default: ~/.config/vessel/config.toml].
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, build, and install a release.
    Release(ReleaseArgs),
    /// Show the resolved packages and their build order.
    Plan {
        /// Release manifest.
        pkgs: PathBuf,
        /// Package catalogue.
        repo: PathBuf,
    },
    /// Finish or undo an interrupted install.
    Recover {
        #[arg(short, long)]
        prefix: PathBuf,
        #[arg(short, long)]
        release: String,
        #[arg(long, default_value_t = false)]
        sudo: bool,
    },
    /// Run diagnostic checks on the toolchain and an installed release.
    Doctor {
        /// Release manifest whose build tools to check.
        pkgs: Option<PathBuf>,
        /// Package catalogue.
        repo: Option<PathBuf>,
        #[arg(short, long)]
        prefix: Option<PathBuf>,
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VESSEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let config_path = cli.config.as_deref().map(expand_tilde);
    let settings = match Settings::load_or_default(config_path.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    debug!(
        "settings: jobs={} pyver={} fixup_policy={}",
        settings.jobs, settings.pyver, settings.fixup_policy
    );
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Release(args) => commands::release::run(args, settings, json_output),
        Commands::Plan { pkgs, repo } => commands::plan::run(&pkgs, &repo, json_output),
        Commands::Recover {
            prefix,
            release,
            sudo,
        } => commands::recover::run(&prefix, &release, sudo || settings.sudo, json_output),
        Commands::Doctor {
            pkgs,
            repo,
            prefix,
            release,
        } => commands::doctor::run(
            &DoctorArgs {
                pkgs: pkgs.as_deref(),
                repo: repo.as_deref(),
                prefix: prefix.as_deref(),
                release: release.as_deref(),
                config: config_path.as_deref(),
            },
            &settings,
            json_output,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(classify(&msg))
        }
    }
}

/// Exit code for an error message, keyed on the prefix each error layer
/// puts in front of it.
fn classify(msg: &str) -> u8 {
    if msg.starts_with("manifest error:")
        || msg.starts_with("resolution error:")
        || msg.starts_with("dependency cycle")
    {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("install error:") || msg.starts_with("store error:") {
        EXIT_INSTALL_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefixes_map_to_exit_codes() {
        assert_eq!(classify("manifest error: bad yaml"), EXIT_MANIFEST_ERROR);
        assert_eq!(classify("resolution error: package 'x'"), EXIT_MANIFEST_ERROR);
        assert_eq!(classify("dependency cycle between: a, b"), EXIT_MANIFEST_ERROR);
        assert_eq!(classify("install error: staged release"), EXIT_INSTALL_ERROR);
        assert_eq!(classify("build of x 1 failed: boom"), EXIT_FAILURE);
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_tilde("~/a/b"), PathBuf::from(home).join("a/b"));
        }
        assert_eq!(expand_tilde("/etc/x"), PathBuf::from("/etc/x"));
    }

    #[test]
    fn cli_parses_release_flags() {
        let cli = Cli::try_parse_from([
            "vessel", "release", "pkgs.yml", "repo.yml", "-p", "/prog", "-r", "r1", "-n", "-j",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Release(args) => {
                assert!(args.dry_run);
                assert_eq!(args.jobs, Some(4));
                assert_eq!(args.release, "r1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
