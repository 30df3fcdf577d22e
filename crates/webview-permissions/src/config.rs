use std::path::Path;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::config_error;
use crate::error::type_error;
use crate::AnyError;
use crate::BlockType;
use crate::BlockedPathPolicy;
use crate::PathService;
use crate::SystemPathService;

static DEFAULT_APPLICATION_NAME: Lazy<String> = Lazy::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default()
});

fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.clone()
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ExtraBlockedPath {
    pub path: PathBuf,
    pub block: BlockType,
}

/// Profile level settings of the permission broker.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Folders below an app-folder anchor whose name contains this are
    /// exempt from blocking.
    pub application_name: String,
    pub user_data_dir: Option<PathBuf>,
    pub extra_blocked_paths: Vec<ExtraBlockedPath>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            user_data_dir: None,
            extra_blocked_paths: Vec::new(),
        }
    }
}

impl PermissionsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AnyError> {
        serde_json::from_str(json)
            .map_err(|e| config_error(format!("Invalid permissions config: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AnyError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!(
                "Unable to read permissions config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn path_service(&self) -> SystemPathService {
        SystemPathService::new(self.application_name.clone(), self.user_data_dir.clone())
    }

    /// The built-in blocked path table with the extra entries appended.
    pub fn blocked_path_policy(&self, paths: &dyn PathService) -> Result<BlockedPathPolicy, AnyError> {
        let mut policy = BlockedPathPolicy::new(paths, self.application_name.clone());
        for extra in &self.extra_blocked_paths {
            if extra.path.as_os_str().is_empty() {
                return Err(type_error("Empty path is not allowed"));
            }
            policy.add_blocked_path(&extra.path, extra.block)?;
        }
        Ok(policy)
    }
}
