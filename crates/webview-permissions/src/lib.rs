use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use once_cell::sync::Lazy;

mod blocked_paths;
mod config;
mod context;
mod engine;
mod error;
mod grant;
mod origin;
mod prompter;
mod request_controller;
mod request_manager;
mod sequence;
pub mod terminal;
#[cfg(test)]
mod test_util;

pub use blocked_paths::*;
pub use config::ExtraBlockedPath;
pub use config::PermissionsConfig;
pub use context::FileSystemAccessPermissionContext;
pub use context::PathInfo;
pub use context::WriteItem;
pub use engine::*;
pub use error::get_custom_error_class;
pub use error::OriginError;
pub use grant::FileSystemAccessPermissionGrant;
pub use grant::ObserverId;
pub use origin::Origin;
pub use prompter::*;
pub use request_controller::*;
pub use request_manager::FileSystemAccessPermissionRequestManager;
pub use request_manager::RequestData;
pub use sequence::Sequence;

pub type AnyError = anyhow::Error;

pub use url::Url;

static DEBUG_LOG_ENABLED: Lazy<bool> = Lazy::new(|| log::log_enabled!(log::Level::Debug));

/// Resolution state of a permission grant.
#[derive(Eq, PartialEq, Default, Debug, Clone, Copy, Hash)]
pub enum PermissionStatus {
    #[default]
    Ask,
    Granted,
    Denied,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionStatus::Ask => f.pad("ask"),
            PermissionStatus::Granted => f.pad("granted"),
            PermissionStatus::Denied => f.pad("denied"),
        }
    }
}

/// Whether a file system entry is a file or a directory.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum HandleType {
    File,
    Directory,
}

/// The two independent grant families kept per origin.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum GrantType {
    Read,
    Write,
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantType::Read => f.pad("read"),
            GrantType::Write => f.pad("write"),
        }
    }
}

/// Capability asked for in a single file system access prompt.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

impl From<GrantType> for AccessKind {
    fn from(value: GrantType) -> Self {
        match value {
            GrantType::Read => AccessKind::Read,
            GrantType::Write => AccessKind::Write,
        }
    }
}

/// The gesture that produced a handle; it decides which grants are handed
/// out without asking.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UserAction {
    Open,
    Save,
    DragAndDrop,
    LoadFromStorage,
    /// Never a valid input for grant lookups.
    None,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UserActivationState {
    Required,
    NotRequired,
}

/// What the user (or the queue on their behalf) did with a prompt.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PermissionAction {
    Granted,
    Denied,
    Dismissed,
    Ignored,
    Revoked,
    GrantedOnce,
}

/// Result reported to the engine for [`FileSystemAccessPermissionGrant::request_permission`].
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PermissionRequestOutcome {
    RequestAborted,
    InvalidFrame,
    NoUserActivation,
    ThirdPartyContext,
    UserGranted,
    UserDenied,
    UserDismissed,
}

/// Whether a path points into the local file system or at an entry provided
/// by the application (for example a virtual file).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum PathType {
    #[default]
    Local,
    External,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SensitiveEntryResult {
    Allowed,
    Abort,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AfterWriteCheckResult {
    Allow,
    Block,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum WellKnownDirectory {
    Default,
    Desktop,
    Documents,
    Downloads,
    Music,
    Pictures,
    Videos,
}

#[inline]
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut components = path.as_ref().components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                ret.pop();
            }
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

/// `true` when `child` lies strictly below `parent`.
#[inline]
pub(crate) fn is_parent(parent: &Path, child: &Path) -> bool {
    child != parent && child.starts_with(parent)
}
