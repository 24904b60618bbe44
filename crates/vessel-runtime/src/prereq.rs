use crate::tools::Tools;
use std::fmt;
use std::process::Command;
use vessel_schema::{BuildMethod, FetchKind};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    if name.contains('/') {
        return std::path::Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the tools needed to fetch and build the given methods and fetch
/// kinds. An empty list means everything is present.
pub fn check_release_prereqs(
    tools: &Tools,
    methods: &[BuildMethod],
    fetches: &[FetchKind],
    sudo: bool,
) -> Vec<MissingPrereq> {
    let mut wanted: Vec<(&str, &'static str, &'static str)> = Vec::new();

    if fetches.contains(&FetchKind::Git) {
        wanted.push((tools.git.as_str(), "fetching sources", "zypper install git | apt install git | dnf install git"));
    }
    if fetches.contains(&FetchKind::Pip) || methods.contains(&BuildMethod::Pip) {
        wanted.push((tools.pip.as_str(), "python package downloads and installs", "python -m ensurepip, or the distribution's python3-pip"));
    }
    if methods.contains(&BuildMethod::Cmake) {
        wanted.push((tools.cmake.as_str(), "configuring cmake packages", "zypper install cmake | apt install cmake | dnf install cmake"));
        wanted.push((tools.make.as_str(), "building cmake packages", "zypper install make | apt install make | dnf install make"));
    }
    if methods.contains(&BuildMethod::Sh) {
        wanted.push((tools.bash.as_str(), "running package build scripts", "usually pre-installed"));
    }
    if methods.contains(&BuildMethod::Rsync) {
        wanted.push((tools.rsync.as_str(), "copying prebuilt trees", "zypper install rsync | apt install rsync | dnf install rsync"));
    }
    if sudo {
        wanted.push(("sudo", "installing into a privileged prefix", "zypper install sudo | apt install sudo | dnf install sudo"));
    }

    let mut missing = Vec::new();
    for (name, purpose, install_hint) in wanted {
        if missing.iter().any(|m: &MissingPrereq| m.name == name) {
            continue;
        }
        if !command_exists(name) {
            missing.push(MissingPrereq {
                name: name.to_owned(),
                purpose,
                install_hint,
            });
        }
    }
    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nVessel needs these tools to fetch and build the release.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "cmake".to_owned(),
            purpose: "configuring",
            install_hint: "apt install cmake",
        };
        let s = m.to_string();
        assert!(s.contains("cmake"));
        assert!(s.contains("configuring"));
        assert!(s.contains("apt install cmake"));
    }

    #[test]
    fn nothing_needed_for_noop_release() {
        let missing = check_release_prereqs(&Tools::default(), &[BuildMethod::Noop], &[], false);
        assert!(missing.is_empty());
    }

    #[test]
    fn reports_configured_tool_paths() {
        let tools = Tools {
            cmake: "/nonexistent/bin/cmake".to_owned(),
            make: "/nonexistent/bin/make".to_owned(),
            ..Tools::default()
        };
        let missing = check_release_prereqs(&tools, &[BuildMethod::Cmake], &[], false);
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["/nonexistent/bin/cmake", "/nonexistent/bin/make"]);
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![MissingPrereq {
            name: "rsync".to_owned(),
            purpose: "copying",
            install_hint: "apt install rsync",
        }];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("rsync"));
    }
}
