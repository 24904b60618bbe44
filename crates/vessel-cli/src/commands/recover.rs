use super::{json_pretty, EXIT_SUCCESS};
use std::path::Path;
use std::sync::Arc;
use vessel_core::recover_release;
use vessel_runtime::SystemRunner;

pub fn run(prefix: &Path, release: &str, sudo: bool, json: bool) -> Result<u8, String> {
    let action = recover_release(prefix, release, sudo, Arc::new(SystemRunner))
        .map_err(|e| e.to_string())?;
    if json {
        let out = serde_json::json!({
            "release": release,
            "prefix": prefix,
            "action": action.to_string(),
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{release}: {action}");
    }
    Ok(EXIT_SUCCESS)
}
