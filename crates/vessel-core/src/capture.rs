use crate::CoreError;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vessel_schema::{BuildPlan, ReleaseDoc};
use vessel_store::WorkspaceLayout;

/// Activation scripts rendered from `<workspace>/<name>.in`.
pub const ENABLE_SCRIPTS: [&str; 2] = ["enable", "enable.csh"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    pub scripts: Vec<PathBuf>,
    pub missing_templates: Vec<PathBuf>,
    pub release_doc: PathBuf,
}

/// Substitute `@prefix@`, `@pyver@` and `@release@`. `root` is the
/// installed root, `prefix/<release>/root`.
pub fn render_template(template: &str, root: &Path, pyver: &str, release: &str) -> String {
    template
        .replace("@prefix@", &root.to_string_lossy())
        .replace("@pyver@", pyver)
        .replace("@release@", release)
}

fn write_script(path: &Path, content: &str) -> Result<(), CoreError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

/// Render the activation scripts into the staged release and write the
/// release descriptor next to them.
pub fn capture_environment(
    workspace: &WorkspaceLayout,
    plan: &BuildPlan,
    pyver: &str,
) -> Result<CaptureReport, CoreError> {
    let staged = workspace.staged();
    fs::create_dir_all(&staged)?;
    let target = workspace.target();
    let mut report = CaptureReport::default();

    for name in ENABLE_SCRIPTS {
        let template = workspace.enable_template(name);
        let content = match fs::read_to_string(&template) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("could not find template {}, skipping", template.display());
                report.missing_templates.push(template);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let rendered = render_template(&content, &target.live_root(), pyver, target.release());
        let script = staged.join(name);
        write_script(&script, &rendered)?;
        debug!("rendered {}", script.display());
        report.scripts.push(script);
    }

    let release_doc = workspace.release_doc();
    ReleaseDoc::from_plan(plan).write_to_file(&release_doc)?;
    report.release_doc = release_doc;
    Ok(report)
}
