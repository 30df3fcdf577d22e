use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::relative_path_error;
use crate::is_parent;
use crate::normalize_path;
use crate::AnyError;
use crate::HandleType;

/// How a blocked path treats what lies below it.
///
/// The block type of the nearest blocked ancestor of a checked path decides
/// the outcome, so a deeper entry overrides the policy of a shallower one.
/// For example, if `/home` blocks all children but `/home/downloads` does
/// not, then `/home/downloads/file.ext` is *not* blocked.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    /// The path and everything below it is blocked.
    BlockAllChildren,
    /// Individual files directly below are fine, nested directories are not.
    BlockNestedDirectories,
    /// Only the path itself (and its parents) are blocked.
    DontBlockChildren,
    /// Everything below is blocked except a first-level folder whose name
    /// contains the application name.
    DontBlockAppFolder,
}

/// Well known locations a blocked path can be anchored at.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BasePathKey {
    Home,
    UserDesktop,
    UserDocuments,
    DefaultDownloads,
    /// Where downloads land when the default directory is not usable.
    DefaultDownloadsSafe,
    UserMusic,
    UserPictures,
    UserVideos,
    Exe,
    Module,
    Assets,
    UserData,
    AppData,
    RoamingAppData,
    LocalAppData,
    CommonAppData,
    ProgramFiles,
    ProgramFilesX86,
    ProgramFiles6432,
    Windows,
    InternetCache,
}

/// Resolves [`BasePathKey`]s to directories on this machine.
pub trait PathService: Send + Sync {
    fn get(&self, key: BasePathKey) -> Option<PathBuf>;
}

/// [`PathService`] backed by the platform's conventions.
#[derive(Clone, Debug, Default)]
pub struct SystemPathService {
    application_name: String,
    user_data_dir: Option<PathBuf>,
}

impl SystemPathService {
    pub fn new(application_name: impl Into<String>, user_data_dir: Option<PathBuf>) -> Self {
        Self {
            application_name: application_name.into(),
            user_data_dir,
        }
    }

    fn exe_dir() -> Option<PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
    }

    fn env_dir(name: &str) -> Option<PathBuf> {
        std::env::var_os(name)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

impl PathService for SystemPathService {
    fn get(&self, key: BasePathKey) -> Option<PathBuf> {
        match key {
            BasePathKey::Home => dirs::home_dir(),
            BasePathKey::UserDesktop => dirs::desktop_dir(),
            BasePathKey::UserDocuments => dirs::document_dir(),
            BasePathKey::DefaultDownloads => dirs::download_dir(),
            BasePathKey::DefaultDownloadsSafe => {
                dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            }
            BasePathKey::UserMusic => dirs::audio_dir(),
            BasePathKey::UserPictures => dirs::picture_dir(),
            BasePathKey::UserVideos => dirs::video_dir(),
            BasePathKey::Exe | BasePathKey::Module | BasePathKey::Assets => Self::exe_dir(),
            BasePathKey::UserData => match &self.user_data_dir {
                Some(dir) => Some(dir.clone()),
                None if self.application_name.is_empty() => None,
                None => dirs::data_local_dir().map(|d| d.join(&self.application_name)),
            },
            BasePathKey::AppData | BasePathKey::RoamingAppData => dirs::data_dir(),
            BasePathKey::LocalAppData => dirs::data_local_dir(),
            BasePathKey::CommonAppData => Self::env_dir("ProgramData"),
            BasePathKey::ProgramFiles => Self::env_dir("ProgramFiles"),
            BasePathKey::ProgramFilesX86 => Self::env_dir("ProgramFiles(x86)"),
            BasePathKey::ProgramFiles6432 => Self::env_dir("ProgramW6432"),
            BasePathKey::Windows => Self::env_dir("SystemRoot"),
            BasePathKey::InternetCache => dirs::data_local_dir()
                .map(|d| d.join("Microsoft").join("Windows").join("INetCache")),
        }
    }
}

/// One row of the blocked path table. With both `base` and `path` set, `path`
/// is relative to the resolved `base`.
#[derive(Clone, Copy, Debug)]
pub struct BlockedPathRule {
    pub base: Option<BasePathKey>,
    pub path: Option<&'static str>,
    pub block: BlockType,
}

const fn rule(
    base: Option<BasePathKey>,
    path: Option<&'static str>,
    block: BlockType,
) -> BlockedPathRule {
    BlockedPathRule { base, path, block }
}

use BasePathKey::*;
use BlockType::*;

const COMMON_BLOCKED_PATHS: &[BlockedPathRule] = &[
    // Sharing the whole home, desktop, documents or downloads folder is not
    // allowed, sharing anything inside them is.
    rule(Some(Home), None, DontBlockChildren),
    rule(Some(UserDesktop), None, DontBlockChildren),
    rule(Some(UserDocuments), None, DontBlockChildren),
    rule(Some(DefaultDownloads), None, DontBlockChildren),
    rule(Some(DefaultDownloadsSafe), None, DontBlockChildren),
    // The application installation and its profile data.
    rule(Some(Exe), None, BlockAllChildren),
    rule(Some(Module), None, BlockAllChildren),
    rule(Some(Assets), None, BlockAllChildren),
    rule(Some(UserData), None, BlockAllChildren),
    rule(Some(Home), Some(".ssh"), BlockAllChildren),
    rule(Some(Home), Some(".gnupg"), BlockAllChildren),
];

#[cfg(target_os = "linux")]
const PLATFORM_BLOCKED_PATHS: &[BlockedPathRule] = &[
    // Devices and kernel state.
    rule(None, Some("/dev"), BlockAllChildren),
    rule(None, Some("/sys"), BlockAllChildren),
    rule(None, Some("/proc"), BlockAllChildren),
    rule(Some(Home), Some(".config"), BlockAllChildren),
    rule(Some(Home), Some(".dbus"), BlockAllChildren),
];

#[cfg(target_os = "macos")]
const PLATFORM_BLOCKED_PATHS: &[BlockedPathRule] = &[
    rule(Some(AppData), None, BlockAllChildren),
    rule(Some(Home), Some("Library"), BlockAllChildren),
    // iCloud Drive.
    rule(Some(Home), Some("Library/Mobile Documents"), DontBlockChildren),
];

#[cfg(windows)]
const PLATFORM_BLOCKED_PATHS: &[BlockedPathRule] = &[
    rule(Some(ProgramFiles), None, BlockAllChildren),
    rule(Some(ProgramFilesX86), None, BlockAllChildren),
    rule(Some(ProgramFiles6432), None, BlockAllChildren),
    rule(Some(Windows), None, BlockAllChildren),
    rule(Some(RoamingAppData), None, BlockAllChildren),
    rule(Some(LocalAppData), None, BlockAllChildren),
    // Default location of temporary files created by the application itself.
    rule(Some(LocalAppData), Some("Temp"), DontBlockAppFolder),
    rule(Some(CommonAppData), None, BlockAllChildren),
    // Files opened from MTP devices are staged here.
    rule(Some(InternetCache), None, BlockNestedDirectories),
];

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const PLATFORM_BLOCKED_PATHS: &[BlockedPathRule] = &[];

/// The built-in table, common rows first.
pub fn default_blocked_path_rules() -> impl Iterator<Item = &'static BlockedPathRule> {
    COMMON_BLOCKED_PATHS.iter().chain(PLATFORM_BLOCKED_PATHS.iter())
}

#[derive(Clone, Debug)]
struct BlockedPath {
    path: PathBuf,
    base: Option<BasePathKey>,
    block: BlockType,
}

/// The blocked path table with every anchor resolved. Resolution happens once
/// at construction, so checks do no I/O and can run on any thread.
#[derive(Clone, Debug, Default)]
pub struct BlockedPathPolicy {
    entries: Vec<BlockedPath>,
    application_name: String,
}

impl BlockedPathPolicy {
    pub fn new(paths: &dyn PathService, application_name: impl Into<String>) -> Self {
        Self::from_rules(paths, default_blocked_path_rules(), application_name)
    }

    pub fn from_rules<'a>(
        paths: &dyn PathService,
        rules: impl IntoIterator<Item = &'a BlockedPathRule>,
        application_name: impl Into<String>,
    ) -> Self {
        let entries = rules
            .into_iter()
            .filter_map(|rule| {
                let path = match (rule.base, rule.path) {
                    (Some(base), path) => {
                        let resolved = paths.get(base)?;
                        match path {
                            Some(path) => resolved.join(path),
                            None => resolved,
                        }
                    }
                    (None, Some(path)) => PathBuf::from(path),
                    (None, None) => return None,
                };
                Some(BlockedPath {
                    path: normalize_path(path),
                    base: rule.base,
                    block: rule.block,
                })
            })
            .collect();
        Self {
            entries,
            application_name: application_name.into(),
        }
    }

    /// Appends an absolute path to the table.
    pub fn add_blocked_path(&mut self, path: &Path, block: BlockType) -> Result<(), AnyError> {
        if !path.is_absolute() {
            return Err(relative_path_error(path));
        }
        self.entries.push(BlockedPath {
            path: normalize_path(path),
            base: None,
            block,
        });
        Ok(())
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn should_block_access_to_path(&self, check_path: &Path, handle_type: HandleType) -> bool {
        debug_assert!(!check_path.as_os_str().is_empty());
        debug_assert!(check_path.is_absolute());
        let check_path = normalize_path(check_path);

        let mut nearest_ancestor: Option<&BlockedPath> = None;
        for entry in &self.entries {
            if check_path == entry.path || is_parent(&check_path, &entry.path) {
                log::debug!(
                    "Blocking access to {} because it is a parent of {} ({:?})",
                    check_path.display(),
                    entry.path.display(),
                    entry.base
                );
                return true;
            }

            if is_parent(&entry.path, &check_path)
                && nearest_ancestor.map_or(true, |nearest| is_parent(&nearest.path, &entry.path))
            {
                nearest_ancestor = Some(entry);
            }
        }

        let Some(nearest_ancestor) = nearest_ancestor else {
            return false;
        };
        match nearest_ancestor.block {
            DontBlockChildren => return false,
            BlockNestedDirectories if handle_type == HandleType::File => return false,
            DontBlockAppFolder if self.is_app_folder(&nearest_ancestor.path, &check_path) => {
                return false
            }
            _ => {}
        }

        log::debug!(
            "Blocking access to {} because it is inside {} ({:?})",
            check_path.display(),
            nearest_ancestor.path.display(),
            nearest_ancestor.base
        );
        true
    }

    /// An empty application name matches every folder.
    fn is_app_folder(&self, ancestor: &Path, check_path: &Path) -> bool {
        check_path
            .strip_prefix(ancestor)
            .ok()
            .and_then(|relative| relative.components().next())
            .map_or(false, |first| {
                first
                    .as_os_str()
                    .to_string_lossy()
                    .contains(self.application_name.as_str())
            })
    }
}
