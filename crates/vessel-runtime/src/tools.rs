use serde::{Deserialize, Serialize};

/// External programs the pipeline invokes, by name or path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
    pub git: String,
    pub pip: String,
    pub cmake: String,
    pub make: String,
    pub rsync: String,
    pub bash: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            git: "git".to_owned(),
            pip: "pip".to_owned(),
            cmake: "cmake".to_owned(),
            make: "make".to_owned(),
            rsync: "rsync".to_owned(),
            bash: "bash".to_owned(),
        }
    }
}
