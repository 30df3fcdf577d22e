use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::AccessKind;
use crate::FileSystemAccessPermissionContext;
use crate::FullscreenBlock;
use crate::HandleType;
use crate::NavigationInfo;
use crate::Origin;
use crate::PermissionAction;
use crate::PermissionPresenter;
use crate::PermissionRequest;
use crate::RequestController;
use crate::Sequence;
use crate::DEBUG_LOG_ENABLED;
use crate::PERMISSION_EMOJI;

type PermissionCallback = Box<dyn FnOnce(PermissionAction) + Send + 'static>;

/// What a queued prompt asks for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestData {
    pub origin: Origin,
    pub path: PathBuf,
    pub handle_type: HandleType,
    pub access: AccessKind,
}

impl RequestData {
    /// Same entry, possibly asking for a different access kind.
    pub fn is_for_same_path(&self, other: &RequestData) -> bool {
        self.origin == other.origin
            && self.path == other.path
            && self.handle_type == other.handle_type
    }
}

struct Request {
    prompt_id: u64,
    data: RequestData,
    callbacks: Vec<PermissionCallback>,
    fullscreen_blocks: Vec<FullscreenBlock>,
}

impl Request {
    fn new(data: RequestData, callback: PermissionCallback, fullscreen_block: FullscreenBlock) -> Self {
        Self {
            prompt_id: 0,
            data,
            callbacks: vec![callback],
            fullscreen_blocks: vec![fullscreen_block],
        }
    }

    fn merge(&mut self, callback: PermissionCallback, fullscreen_block: FullscreenBlock) {
        self.callbacks.push(callback);
        self.fullscreen_blocks.push(fullscreen_block);
    }

    fn resolve(self, action: PermissionAction) {
        let Request {
            callbacks,
            fullscreen_blocks,
            ..
        } = self;
        for callback in callbacks {
            callback(action);
        }
        drop(fullscreen_blocks);
    }
}

#[derive(Default)]
struct ManagerState {
    current: Option<Request>,
    queued: VecDeque<Request>,
    document_loaded: bool,
    next_prompt_id: u64,
}

impl ManagerState {
    fn can_show_request(&self) -> bool {
        self.document_loaded && !self.queued.is_empty() && self.current.is_none()
    }

    fn take_all(&mut self) -> Vec<Request> {
        self.current.take().into_iter().chain(self.queued.drain(..)).collect()
    }
}

/// Per-page queue of file system access prompts.
///
/// Prompts are shown one at a time in FIFO order, and only once the page
/// finished loading. Requests for the same entry are folded into one prompt
/// whose answer is delivered to every caller. Every callback handed to
/// [`add_request`](Self::add_request) runs exactly once; tearing the queue
/// down denies whatever is still pending.
pub struct FileSystemAccessPermissionRequestManager {
    weak_self: Weak<Self>,
    context: Weak<FileSystemAccessPermissionContext>,
    sequence: Sequence,
    presenter: Mutex<Option<Arc<dyn PermissionPresenter>>>,
    state: Mutex<ManagerState>,
}

impl FileSystemAccessPermissionRequestManager {
    pub fn new(context: &Arc<FileSystemAccessPermissionContext>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            context: Arc::downgrade(context),
            sequence: context.sequence().clone(),
            presenter: Mutex::default(),
            state: Mutex::default(),
        })
    }

    pub fn set_presenter(&self, presenter: Option<Arc<dyn PermissionPresenter>>) {
        *self.presenter.lock() = presenter;
    }

    pub fn is_showing_request(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn queued_request_count(&self) -> usize {
        self.state.lock().queued.len()
    }

    pub fn add_request(
        &self,
        data: RequestData,
        callback: impl FnOnce(PermissionAction) + Send + 'static,
        fullscreen_block: FullscreenBlock,
    ) {
        let callback: PermissionCallback = Box::new(callback);
        let mut state = self.state.lock();

        if let Some(current) = state.current.as_mut().filter(|current| current.data == data) {
            log::debug!("Merging request for {} into the visible prompt", data.path.display());
            current.merge(callback, fullscreen_block);
            return;
        }

        // The first queued request for the entry absorbs the new one. A
        // different access kind turns it into a read-write prompt.
        if let Some(queued) = state
            .queued
            .iter_mut()
            .find(|queued| queued.data.is_for_same_path(&data))
        {
            if queued.data.access != data.access {
                queued.data.access = AccessKind::ReadWrite;
            }
            log::debug!(
                "Merging request for {} into a queued {:?} prompt",
                data.path.display(),
                queued.data.access
            );
            queued.merge(callback, fullscreen_block);
            return;
        }

        state
            .queued
            .push_back(Request::new(data, callback, fullscreen_block));
        let showing = state.current.is_some();
        drop(state);
        if !showing {
            self.schedule_show_request();
        }
    }

    /// The page's main document finished loading.
    pub fn document_on_load_completed(&self) {
        let mut state = self.state.lock();
        state.document_loaded = true;
        let has_queued = !state.queued.is_empty();
        drop(state);
        if has_queued {
            self.schedule_show_request();
        }
    }

    pub fn did_finish_navigation(&self, navigation: &NavigationInfo) {
        if !navigation.is_main_frame || !navigation.has_committed {
            return;
        }
        if !navigation.is_same_document {
            self.state.lock().document_loaded = false;
        }

        // Opaque origins never hold grants.
        let Some(Ok(src_origin)) = navigation.previous_url.as_ref().map(Origin::from_url) else {
            return;
        };
        if Origin::from_url(&navigation.url).is_ok_and(|dest_origin| dest_origin == src_origin) {
            return;
        }
        if let Some(context) = self.context.upgrade() {
            context.navigated_away_from_origin(&src_origin);
        }
    }

    /// The page is going away: deny everything still pending, then let the
    /// context decide whether `last_committed_origin` loses its grants.
    pub fn page_destroyed(&self, last_committed_origin: &Origin) {
        let pending = self.state.lock().take_all();
        if !pending.is_empty() {
            log::debug!("Denying {} pending prompt(s) of a closed page", pending.len());
        }
        for request in pending {
            request.resolve(PermissionAction::Denied);
        }
        if let Some(context) = self.context.upgrade() {
            context.navigated_away_from_origin(last_committed_origin);
        }
    }

    fn schedule_show_request(&self) {
        if !self.state.lock().can_show_request() {
            return;
        }
        // Posted so that requests issued back to back (read, then write) are
        // all queued, and merged, before the first prompt appears.
        let manager = self.weak_self.clone();
        self.sequence.post_task(move || {
            if let Some(manager) = manager.upgrade() {
                manager.dequeue_and_show_request();
            }
        });
    }

    fn dequeue_and_show_request(&self) {
        let (prompt_id, data) = {
            let mut state = self.state.lock();
            if !state.can_show_request() {
                return;
            }
            let Some(mut request) = state.queued.pop_front() else {
                return;
            };
            state.next_prompt_id += 1;
            request.prompt_id = state.next_prompt_id;
            let shown = (request.prompt_id, request.data.clone());
            state.current = Some(request);
            shown
        };

        let presenter = self.presenter.lock().clone();
        let Some(presenter) = presenter else {
            log::error!(
                "Attempt to request file system access from {} on a page without a presenter",
                data.origin
            );
            self.on_permission_dialog_result(prompt_id, PermissionAction::Denied);
            return;
        };

        if *DEBUG_LOG_ENABLED {
            log::debug!(
                "{} Showing {:?} prompt for {} on \"{}\"",
                PERMISSION_EMOJI,
                data.access,
                data.origin,
                data.path.display()
            );
        }
        let manager = self.weak_self.clone();
        let controller = RequestController::file_system_access(
            data.origin,
            data.path,
            data.handle_type,
            data.access,
            move |action| {
                if let Some(manager) = manager.upgrade() {
                    manager.on_permission_dialog_result(prompt_id, action);
                }
            },
        );
        presenter.present(PermissionRequest::new(controller));
    }

    fn on_permission_dialog_result(&self, prompt_id: u64, action: PermissionAction) {
        let request = {
            let mut state = self.state.lock();
            match &state.current {
                Some(current) if current.prompt_id == prompt_id => state.current.take(),
                // Answer to a prompt that was already cancelled.
                _ => None,
            }
        };
        let Some(request) = request else {
            log::debug!("Ignoring {action:?} for prompt {prompt_id}, it is no longer current");
            return;
        };
        request.resolve(action);
        self.schedule_show_request();
    }
}

impl Drop for FileSystemAccessPermissionRequestManager {
    fn drop(&mut self) {
        for request in self.state.get_mut().take_all() {
            request.resolve(PermissionAction::Denied);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use crate::Url;
    use crate::WebPage;
    use std::path::Path;

    fn data(env: &TestEnv, path: &str, access: AccessKind) -> RequestData {
        RequestData {
            origin: env.origin.clone(),
            path: PathBuf::from(path),
            handle_type: HandleType::File,
            access,
        }
    }

    fn add(
        env: &TestEnv,
        data: RequestData,
    ) -> Arc<Mutex<Vec<PermissionAction>>> {
        let (actions, callback) = recorder();
        env.manager.add_request(data, callback, env.page.drop_fullscreen());
        actions
    }

    fn navigation(previous: &str, url: &str) -> NavigationInfo {
        NavigationInfo {
            is_main_frame: true,
            has_committed: true,
            is_same_document: false,
            previous_url: Some(Url::parse(previous).unwrap()),
            url: Url::parse(url).unwrap(),
        }
    }

    #[test]
    fn read_then_write_becomes_one_prompt() {
        let env = TestEnv::new();
        let read = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        let write = add(&env, data(&env, "/docs/a.txt", AccessKind::Write));
        assert_eq!(env.manager.queued_request_count(), 1);
        // Nothing is shown synchronously.
        assert!(env.presenter.is_empty());

        env.sequence.run_until_idle();
        let requests = env.presenter.take();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].access_flags(), Some(AccessKind::ReadWrite));
        assert_eq!(requests[0].file_path(), Some(Path::new("/docs/a.txt")));
        assert_eq!(env.page.fullscreen_blocks_held(), 2);

        requests[0].accept();
        assert_eq!(*read.lock(), vec![PermissionAction::Granted]);
        assert_eq!(*write.lock(), vec![PermissionAction::Granted]);
        assert_eq!(env.page.fullscreen_blocks_held(), 0);
        assert!(!env.manager.is_showing_request());
    }

    #[test]
    fn identical_request_joins_the_visible_prompt() {
        let env = TestEnv::new();
        let first = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        assert!(env.manager.is_showing_request());

        let second = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        // A different access kind is not folded into a visible prompt.
        let third = add(&env, data(&env, "/docs/a.txt", AccessKind::Write));
        assert_eq!(env.manager.queued_request_count(), 1);

        let requests = env.presenter.take();
        assert_eq!(requests.len(), 1);
        requests[0].reject();
        assert_eq!(*first.lock(), vec![PermissionAction::Denied]);
        assert_eq!(*second.lock(), vec![PermissionAction::Denied]);
        assert!(third.lock().is_empty());

        env.sequence.run_until_idle();
        let requests = env.presenter.take();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].access_flags(), Some(AccessKind::Write));
        requests[0].accept();
        assert_eq!(*third.lock(), vec![PermissionAction::Granted]);
    }

    #[test]
    fn prompts_are_shown_one_at_a_time_in_order() {
        let env = TestEnv::new();
        let a = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        let b = add(&env, data(&env, "/docs/b.txt", AccessKind::Read));
        let mut c_data = data(&env, "/docs/a.txt", AccessKind::Read);
        c_data.handle_type = HandleType::Directory;
        let c = add(&env, c_data);
        assert_eq!(env.manager.queued_request_count(), 3);

        for (expected, log, action) in [
            ("/docs/a.txt", &a, PermissionAction::Granted),
            ("/docs/b.txt", &b, PermissionAction::Denied),
            ("/docs/a.txt", &c, PermissionAction::Granted),
        ] {
            env.sequence.run_until_idle();
            let requests = env.presenter.take();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].file_path(), Some(Path::new(expected)));
            if action == PermissionAction::Granted {
                requests[0].accept();
            } else {
                requests[0].reject();
            }
            assert_eq!(*log.lock(), vec![action]);
        }
        assert_eq!(c.lock().len(), 1);
        assert_eq!(env.manager.queued_request_count(), 0);
    }

    #[test]
    fn prompts_wait_for_the_document_to_load() {
        let env = TestEnv::new();
        env.manager.did_finish_navigation(&navigation(
            "https://example.com/a",
            "https://example.com/b",
        ));
        let actions = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        assert!(env.presenter.is_empty());
        assert!(!env.manager.is_showing_request());

        env.manager.document_on_load_completed();
        env.sequence.run_until_idle();
        let requests = env.presenter.take();
        assert_eq!(requests.len(), 1);
        requests[0].accept();
        assert_eq!(*actions.lock(), vec![PermissionAction::Granted]);
    }

    #[test]
    fn same_document_navigation_keeps_prompts_enabled() {
        let env = TestEnv::new();
        let mut info = navigation("https://example.com/a", "https://example.com/a#b");
        info.is_same_document = true;
        env.manager.did_finish_navigation(&info);
        add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        assert_eq!(env.presenter.len(), 1);
    }

    #[test]
    fn missing_presenter_denies_and_moves_on() {
        let env = TestEnv::new();
        env.manager.set_presenter(None);
        let a = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        let b = add(&env, data(&env, "/docs/b.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        assert_eq!(*a.lock(), vec![PermissionAction::Denied]);
        assert_eq!(*b.lock(), vec![PermissionAction::Denied]);
        assert!(!env.manager.is_showing_request());
        assert_eq!(env.page.fullscreen_blocks_held(), 0);
    }

    #[test]
    fn dropping_the_request_denies_it() {
        let env = TestEnv::new();
        let actions = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        drop(env.presenter.take());
        assert_eq!(*actions.lock(), vec![PermissionAction::Denied]);
        assert!(!env.manager.is_showing_request());
    }

    #[test]
    fn page_teardown_denies_pending_and_ignores_late_answers() {
        let env = TestEnv::new();
        let grant = env.context.get_read_permission_grant(
            &env.origin,
            Path::new("/docs/granted.txt"),
            HandleType::File,
            crate::UserAction::Open,
        );
        let shown = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        let queued = add(&env, data(&env, "/docs/b.txt", AccessKind::Write));
        let requests = env.presenter.take();

        env.manager.page_destroyed(&env.origin);
        assert_eq!(*shown.lock(), vec![PermissionAction::Denied]);
        assert_eq!(*queued.lock(), vec![PermissionAction::Denied]);
        assert_eq!(env.page.fullscreen_blocks_held(), 0);
        assert_eq!(grant.status(), crate::PermissionStatus::Ask);

        requests[0].accept();
        assert_eq!(shown.lock().len(), 1);
        env.sequence.run_until_idle();
        assert!(env.presenter.is_empty());
    }

    #[test]
    fn dropping_the_manager_denies_everything_once() {
        let env = TestEnv::new();
        let shown = add(&env, data(&env, "/docs/a.txt", AccessKind::Read));
        env.sequence.run_until_idle();
        let queued = add(&env, data(&env, "/docs/b.txt", AccessKind::Read));
        let requests = env.presenter.take();

        let TestEnv { manager, page, sequence, .. } = env;
        page.set_request_manager(None);
        drop(manager);
        assert_eq!(*shown.lock(), vec![PermissionAction::Denied]);
        assert_eq!(*queued.lock(), vec![PermissionAction::Denied]);

        drop(requests);
        sequence.run_until_idle();
        assert_eq!(shown.lock().len(), 1);
    }

    #[test]
    fn cross_origin_navigation_revokes() {
        let env = TestEnv::new();
        let grant = env.context.get_read_permission_grant(
            &env.origin,
            Path::new("/docs/a.txt"),
            HandleType::File,
            crate::UserAction::Open,
        );

        env.manager
            .did_finish_navigation(&navigation("https://example.com/a", "https://example.com/b"));
        assert_eq!(grant.status(), crate::PermissionStatus::Granted);

        let mut subframe = navigation("https://example.com/a", "https://other.example/");
        subframe.is_main_frame = false;
        env.manager.did_finish_navigation(&subframe);
        assert_eq!(grant.status(), crate::PermissionStatus::Granted);

        env.manager
            .did_finish_navigation(&navigation("https://example.com/a", "https://other.example/"));
        assert_eq!(grant.status(), crate::PermissionStatus::Ask);
    }
}
