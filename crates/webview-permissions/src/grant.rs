use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::FileSystemAccessPermissionContext;
use crate::FrameId;
use crate::GrantType;
use crate::HandleType;
use crate::Origin;
use crate::PermissionAction;
use crate::PermissionRequestOutcome;
use crate::PermissionStatus;
use crate::RequestData;
use crate::UserActivationState;
use crate::DEBUG_LOG_ENABLED;
use crate::PERMISSION_EMOJI;

type StatusObserver = Arc<dyn Fn(PermissionStatus) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
    next_id: u64,
    list: Vec<(ObserverId, StatusObserver)>,
}

/// A live read or write grant for one (origin, path).
///
/// Grants are shared by every handle referencing them. The owning context
/// only keeps a weak entry, and the grant removes that entry when the last
/// reference goes away.
pub struct FileSystemAccessPermissionGrant {
    context: Weak<FileSystemAccessPermissionContext>,
    origin: Origin,
    path: PathBuf,
    handle_type: HandleType,
    grant_type: GrantType,
    status: Mutex<PermissionStatus>,
    observers: Mutex<Observers>,
}

impl FileSystemAccessPermissionGrant {
    pub(crate) fn new(
        context: Weak<FileSystemAccessPermissionContext>,
        origin: Origin,
        path: PathBuf,
        handle_type: HandleType,
        grant_type: GrantType,
    ) -> Self {
        Self {
            context,
            origin,
            path,
            handle_type,
            grant_type,
            status: Mutex::new(PermissionStatus::Ask),
            observers: Mutex::default(),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle_type(&self) -> HandleType {
        self.handle_type
    }

    pub fn grant_type(&self) -> GrantType {
        self.grant_type
    }

    pub fn status(&self) -> PermissionStatus {
        *self.status.lock()
    }

    /// Registers `observer` to be called after every status change.
    pub fn add_observer(
        &self,
        observer: impl Fn(PermissionStatus) + Send + Sync + 'static,
    ) -> ObserverId {
        let mut observers = self.observers.lock();
        let id = ObserverId(observers.next_id);
        observers.next_id += 1;
        observers.list.push((id, Arc::new(observer)));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.list.len();
        observers.list.retain(|(observer_id, _)| *observer_id != id);
        observers.list.len() != before
    }

    /// Sets the status and notifies observers, but only when it changed.
    pub fn set_status(&self, status: PermissionStatus) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous == status {
            return;
        }
        if *DEBUG_LOG_ENABLED {
            log::debug!(
                "{} {} grant for {} on \"{}\": {} -> {}",
                PERMISSION_EMOJI,
                self.grant_type,
                self.origin,
                self.path.display(),
                previous,
                status
            );
        }
        let observers: Vec<StatusObserver> = self
            .observers
            .lock()
            .list
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(status);
        }
    }

    /// Asks the user for this grant on behalf of the frame `frame_id`.
    ///
    /// Answers `RequestAborted` right away when the grant is not in the `Ask`
    /// state, including when it is already granted: nothing new was shown.
    pub fn request_permission(
        self: &Arc<Self>,
        frame_id: FrameId,
        user_activation_state: UserActivationState,
        callback: impl FnOnce(PermissionRequestOutcome) + Send + 'static,
    ) {
        // Checked first so an existing grant is never reset.
        let status = self.status();
        let Some(context) = self
            .context
            .upgrade()
            .filter(|_| status == PermissionStatus::Ask)
        else {
            if status == PermissionStatus::Granted {
                self.set_status(PermissionStatus::Granted);
            }
            callback(PermissionRequestOutcome::RequestAborted);
            return;
        };

        let Some(frame) = context.engine().frame(frame_id) else {
            callback(PermissionRequestOutcome::InvalidFrame);
            return;
        };

        // A cached or prerendered document must not see the prompt; it could
        // not tell a user denial from an automatic one once it is shown again.
        if frame.is_inactive_and_disallow_activation() {
            callback(PermissionRequestOutcome::InvalidFrame);
            return;
        }

        if user_activation_state == UserActivationState::Required
            && !frame.has_transient_user_activation()
        {
            callback(PermissionRequestOutcome::NoUserActivation);
            return;
        }

        // Workers and torn down tabs have no page.
        let Some(page) = frame.page() else {
            callback(PermissionRequestOutcome::InvalidFrame);
            return;
        };

        if page.last_committed_origin().as_ref() != Some(&self.origin) {
            // Third party iframes may not ask for more.
            callback(PermissionRequestOutcome::ThirdPartyContext);
            return;
        }

        let Some(request_manager) = page.request_manager() else {
            callback(PermissionRequestOutcome::RequestAborted);
            return;
        };

        let fullscreen_block = page.drop_fullscreen();

        // Read and write arrive as two separate requests; the request manager
        // folds them into a single read-write prompt.
        let grant = self.clone();
        request_manager.add_request(
            RequestData {
                origin: self.origin.clone(),
                path: self.path.clone(),
                handle_type: self.handle_type,
                access: self.grant_type.into(),
            },
            move |action| grant.on_permission_request_result(callback, action),
            fullscreen_block,
        );
    }

    fn on_permission_request_result(
        &self,
        callback: impl FnOnce(PermissionRequestOutcome),
        action: PermissionAction,
    ) {
        match action {
            PermissionAction::Granted => {
                self.set_status(PermissionStatus::Granted);
                callback(PermissionRequestOutcome::UserGranted);
            }
            PermissionAction::Denied => {
                self.set_status(PermissionStatus::Denied);
                callback(PermissionRequestOutcome::UserDenied);
            }
            PermissionAction::Dismissed | PermissionAction::Ignored => {
                callback(PermissionRequestOutcome::UserDismissed);
            }
            PermissionAction::Revoked | PermissionAction::GrantedOnce => {
                unreachable!("prompt answered with {action:?}")
            }
        }
    }
}

impl Drop for FileSystemAccessPermissionGrant {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            context.permission_grant_destroyed(self);
        }
    }
}

impl fmt::Debug for FileSystemAccessPermissionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemAccessPermissionGrant")
            .field("origin", &self.origin)
            .field("path", &self.path)
            .field("handle_type", &self.handle_type)
            .field("grant_type", &self.grant_type)
            .field("status", &self.status())
            .finish()
    }
}
