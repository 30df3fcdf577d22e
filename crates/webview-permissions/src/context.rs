use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use url::Url;

use crate::normalize_path;
use crate::AfterWriteCheckResult;
use crate::AnyError;
use crate::BasePathKey;
use crate::BlockedPathPolicy;
use crate::BrowserEngine;
use crate::FileSystemAccessPermissionGrant;
use crate::FrameId;
use crate::GrantType;
use crate::HandleType;
use crate::Origin;
use crate::PathService;
use crate::PathType;
use crate::PermissionStatus;
use crate::PermissionsConfig;
use crate::SensitiveEntryResult;
use crate::Sequence;
use crate::UserAction;
use crate::WellKnownDirectory;

type Grant = FileSystemAccessPermissionGrant;

/// A directory remembered by a file picker.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathInfo {
    pub path: PathBuf,
    pub path_type: PathType,
}

/// A finished write that is about to replace its target file.
#[derive(Clone, Debug)]
pub struct WriteItem {
    pub target_file_path: PathBuf,
    pub full_path: PathBuf,
    pub size: u64,
    pub frame_url: Option<Url>,
    pub has_user_gesture: bool,
}

// Weak entries: grants are owned by the handles using them and unregister
// themselves through `permission_grant_destroyed`.
#[derive(Default)]
struct OriginState {
    read_grants: BTreeMap<PathBuf, Weak<Grant>>,
    write_grants: BTreeMap<PathBuf, Weak<Grant>>,
}

impl OriginState {
    fn grants(&self, grant_type: GrantType) -> &BTreeMap<PathBuf, Weak<Grant>> {
        match grant_type {
            GrantType::Read => &self.read_grants,
            GrantType::Write => &self.write_grants,
        }
    }

    fn grants_mut(&mut self, grant_type: GrantType) -> &mut BTreeMap<PathBuf, Weak<Grant>> {
        match grant_type {
            GrantType::Read => &mut self.read_grants,
            GrantType::Write => &mut self.write_grants,
        }
    }
}

/// File system access permission state of one browsing profile.
///
/// Strong grant references upgraded while `origins` is locked are parked in a
/// local declared before the guard, so a grant can never run its destructor
/// (which locks `origins`) while the lock is held.
pub struct FileSystemAccessPermissionContext {
    engine: Arc<dyn BrowserEngine>,
    paths: Arc<dyn PathService>,
    policy: Arc<BlockedPathPolicy>,
    sequence: Sequence,
    origins: Mutex<BTreeMap<Origin, OriginState>>,
    last_picked_directories: Mutex<HashMap<String, PathInfo>>,
}

impl FileSystemAccessPermissionContext {
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        paths: Arc<dyn PathService>,
        policy: BlockedPathPolicy,
        sequence: Sequence,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            paths,
            policy: Arc::new(policy),
            sequence,
            origins: Mutex::default(),
            last_picked_directories: Mutex::default(),
        })
    }

    pub fn from_config(
        engine: Arc<dyn BrowserEngine>,
        config: &PermissionsConfig,
        sequence: Sequence,
    ) -> Result<Arc<Self>, AnyError> {
        let paths = Arc::new(config.path_service());
        let policy = config.blocked_path_policy(paths.as_ref())?;
        Ok(Self::new(engine, paths, policy, sequence))
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn blocked_path_policy(&self) -> &BlockedPathPolicy {
        &self.policy
    }

    pub(crate) fn engine(&self) -> &dyn BrowserEngine {
        self.engine.as_ref()
    }

    pub fn get_read_permission_grant(
        self: &Arc<Self>,
        origin: &Origin,
        path: &Path,
        handle_type: HandleType,
        user_action: UserAction,
    ) -> Arc<Grant> {
        let (grant, is_new) =
            self.get_or_create_grant(origin, path, handle_type, GrantType::Read);

        // A readable parent directory makes the new grant readable too.
        if is_new && self.ancestor_has_active_permission(origin, grant.path(), GrantType::Read) {
            grant.set_status(PermissionStatus::Granted);
            return grant;
        }

        match user_action {
            // Open and save dialogs only hand out read access to single files.
            UserAction::Open | UserAction::Save if handle_type == HandleType::Directory => {}
            UserAction::Open | UserAction::Save | UserAction::DragAndDrop => {
                grant.set_status(PermissionStatus::Granted);
            }
            UserAction::LoadFromStorage => {}
            UserAction::None => unreachable!("grant requested without a user action"),
        }
        grant
    }

    pub fn get_write_permission_grant(
        self: &Arc<Self>,
        origin: &Origin,
        path: &Path,
        handle_type: HandleType,
        user_action: UserAction,
    ) -> Arc<Grant> {
        let (grant, is_new) =
            self.get_or_create_grant(origin, path, handle_type, GrantType::Write);

        if is_new && self.ancestor_has_active_permission(origin, grant.path(), GrantType::Write) {
            grant.set_status(PermissionStatus::Granted);
            return grant;
        }

        match user_action {
            // Only save dialogs grant write access up front.
            UserAction::Save => grant.set_status(PermissionStatus::Granted),
            UserAction::Open | UserAction::DragAndDrop | UserAction::LoadFromStorage => {}
            UserAction::None => unreachable!("grant requested without a user action"),
        }
        grant
    }

    fn get_or_create_grant(
        self: &Arc<Self>,
        origin: &Origin,
        path: &Path,
        handle_type: HandleType,
        grant_type: GrantType,
    ) -> (Arc<Grant>, bool) {
        let path = normalize_path(path);
        let mut replaced = None;
        let (grant, is_new) = {
            let mut origins = self.origins.lock();
            let grants = origins
                .entry(origin.clone())
                .or_default()
                .grants_mut(grant_type);
            let mut existing = grants.get(&path).and_then(Weak::upgrade);
            if existing
                .as_ref()
                .is_some_and(|grant| grant.handle_type() != handle_type)
            {
                // The path turned from a file into a directory or back; the
                // old grant must not carry over.
                replaced = existing.take();
            }
            match existing {
                Some(grant) => (grant, false),
                None => {
                    let grant = Arc::new(Grant::new(
                        Arc::downgrade(self),
                        origin.clone(),
                        path.clone(),
                        handle_type,
                        grant_type,
                    ));
                    grants.insert(path, Arc::downgrade(&grant));
                    (grant, true)
                }
            }
        };
        if let Some(replaced) = replaced {
            replaced.set_status(PermissionStatus::Denied);
        }
        (grant, is_new)
    }

    /// `true` when some ancestor directory of `path` holds a granted grant of
    /// `grant_type` for `origin`. The file system root is not considered.
    pub fn ancestor_has_active_permission(
        &self,
        origin: &Origin,
        path: &Path,
        grant_type: GrantType,
    ) -> bool {
        let mut keep_alive = Vec::new();
        let origins = self.origins.lock();
        let Some(state) = origins.get(origin) else {
            return false;
        };
        let grants = state.grants(grant_type);
        if grants.is_empty() {
            return false;
        }
        for parent in path.ancestors().skip(1) {
            if parent.parent().is_none() {
                break;
            }
            if let Some(grant) = grants.get(parent).and_then(Weak::upgrade) {
                let granted = grant.status() == PermissionStatus::Granted;
                keep_alive.push(grant);
                if granted {
                    return true;
                }
            }
        }
        false
    }

    /// Checks `path` against the blocked path table off the UI sequence and
    /// answers on it. Entries provided by the application are always allowed.
    #[allow(clippy::too_many_arguments)]
    pub fn confirm_sensitive_entry_access(
        self: &Arc<Self>,
        origin: &Origin,
        path_type: PathType,
        path: &Path,
        handle_type: HandleType,
        _user_action: UserAction,
        _frame_id: FrameId,
        callback: impl FnOnce(SensitiveEntryResult) + Send + 'static,
    ) {
        if path_type == PathType::External {
            callback(SensitiveEntryResult::Allowed);
            return;
        }
        if !path.is_absolute() {
            log::debug!("Refusing relative path {} from {origin}", path.display());
            callback(SensitiveEntryResult::Abort);
            return;
        }

        let policy = self.policy.clone();
        let path = path.to_path_buf();
        let context = Arc::downgrade(self);
        self.sequence.post_blocking_task_and_reply(
            move || policy.should_block_access_to_path(&path, handle_type),
            move |should_block| {
                // The profile may have gone away while the check ran. A failed
                // check blocks.
                if should_block == Some(false) && context.upgrade().is_some() {
                    callback(SensitiveEntryResult::Allowed);
                } else {
                    callback(SensitiveEntryResult::Abort);
                }
            },
        );
    }

    pub fn perform_after_write_checks(
        &self,
        _item: WriteItem,
        _frame_id: FrameId,
        callback: impl FnOnce(AfterWriteCheckResult),
    ) {
        callback(AfterWriteCheckResult::Allow);
    }

    pub fn can_obtain_read_permission(&self, _origin: &Origin) -> bool {
        true
    }

    pub fn can_obtain_write_permission(&self, _origin: &Origin) -> bool {
        true
    }

    /// Remembers `path` under `id` unless `id` already has an entry. The
    /// origin is not part of the key: two origins using the same id share
    /// the entry.
    pub fn set_last_picked_directory(
        &self,
        _origin: &Origin,
        id: &str,
        path: &Path,
        path_type: PathType,
    ) {
        self.last_picked_directories
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| PathInfo {
                path: path.to_path_buf(),
                path_type,
            });
    }

    pub fn get_last_picked_directory(&self, _origin: &Origin, id: &str) -> PathInfo {
        self.last_picked_directories
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_well_known_directory_path(&self, directory: WellKnownDirectory) -> Option<PathBuf> {
        let key = match directory {
            WellKnownDirectory::Default | WellKnownDirectory::Documents => {
                BasePathKey::UserDocuments
            }
            WellKnownDirectory::Desktop => BasePathKey::UserDesktop,
            WellKnownDirectory::Downloads => BasePathKey::DefaultDownloads,
            WellKnownDirectory::Music => BasePathKey::UserMusic,
            WellKnownDirectory::Pictures => BasePathKey::UserPictures,
            WellKnownDirectory::Videos => BasePathKey::UserVideos,
        };
        self.paths.get(key)
    }

    pub fn get_picker_title(&self) -> String {
        String::new()
    }

    pub fn notify_entry_moved(&self, _origin: &Origin, _old_path: &Path, _new_path: &Path) {}

    /// Resets every grant of `origin` to `Ask` unless a live page still shows
    /// that origin.
    pub fn navigated_away_from_origin(&self, origin: &Origin) {
        if !self.origins.lock().contains_key(origin) {
            return;
        }
        if self
            .engine
            .live_page_origins()
            .iter()
            .any(|live| live == origin)
        {
            log::debug!("Keeping grants of {origin}, it is still open elsewhere");
            return;
        }

        let grants = {
            let origins = self.origins.lock();
            let grants: Vec<Arc<Grant>> = match origins.get(origin) {
                Some(state) => state
                    .read_grants
                    .values()
                    .chain(state.write_grants.values())
                    .filter_map(Weak::upgrade)
                    .collect(),
                None => Vec::new(),
            };
            grants
        };
        log::debug!("Revoking {} grant(s) of {origin}", grants.len());
        for grant in &grants {
            grant.set_status(PermissionStatus::Ask);
        }
    }

    /// Forgets the entry of `grant`, unless it has already been replaced by a
    /// newer grant for the same path.
    pub(crate) fn permission_grant_destroyed(&self, grant: &Grant) {
        let mut origins = self.origins.lock();
        let Some(state) = origins.get_mut(grant.origin()) else {
            return;
        };
        let grants = state.grants_mut(grant.grant_type());
        if grants
            .get(grant.path())
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), grant))
        {
            grants.remove(grant.path());
        }
    }

    #[cfg(test)]
    fn cached_grant_count(&self, origin: &Origin, grant_type: GrantType) -> usize {
        self.origins
            .lock()
            .get(origin)
            .map_or(0, |state| state.grants(grant_type).len())
    }
}
