use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::BasePathKey;
use crate::BlockedPathPolicy;
use crate::BrowserEngine;
use crate::FileSystemAccessPermissionContext;
use crate::FileSystemAccessPermissionRequestManager;
use crate::FrameId;
use crate::FullscreenBlock;
use crate::Origin;
use crate::PathService;
use crate::PermissionPresenter;
use crate::PermissionRequest;
use crate::RenderFrame;
use crate::Sequence;
use crate::WebPage;

pub const TEST_FRAME: FrameId = FrameId::new(1, 1);

/// Returns a shared log and a callback appending to it.
pub fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnOnce(T) + Send + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    (log, move |value| l.lock().push(value))
}

#[derive(Default)]
pub struct FakePathService {
    paths: HashMap<BasePathKey, PathBuf>,
}

impl FakePathService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: BasePathKey, path: &str) -> Self {
        self.paths.insert(key, PathBuf::from(path));
        self
    }
}

impl PathService for FakePathService {
    fn get(&self, key: BasePathKey) -> Option<PathBuf> {
        self.paths.get(&key).cloned()
    }
}

#[derive(Default)]
pub struct FakeEngine {
    frames: Mutex<HashMap<FrameId, Arc<FakeFrame>>>,
    live_origins: Mutex<Vec<Origin>>,
}

impl FakeEngine {
    pub fn add_frame(&self, id: FrameId, frame: Arc<FakeFrame>) {
        self.frames.lock().insert(id, frame);
    }

    pub fn remove_frame(&self, id: FrameId) {
        self.frames.lock().remove(&id);
    }

    pub fn set_live_origins(&self, origins: Vec<Origin>) {
        *self.live_origins.lock() = origins;
    }
}

impl BrowserEngine for FakeEngine {
    fn frame(&self, id: FrameId) -> Option<Arc<dyn RenderFrame>> {
        let frame = self.frames.lock().get(&id).cloned()?;
        Some(frame as Arc<dyn RenderFrame>)
    }

    fn live_page_origins(&self) -> Vec<Origin> {
        self.live_origins.lock().clone()
    }
}

pub struct FakeFrame {
    inactive: AtomicBool,
    user_activation: AtomicBool,
    page: Mutex<Option<Arc<FakePage>>>,
}

impl FakeFrame {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            inactive: AtomicBool::new(false),
            user_activation: AtomicBool::new(true),
            page: Mutex::new(Some(page)),
        })
    }

    pub fn set_inactive(&self, inactive: bool) {
        self.inactive.store(inactive, Ordering::SeqCst);
    }

    pub fn set_user_activation(&self, active: bool) {
        self.user_activation.store(active, Ordering::SeqCst);
    }

    pub fn set_page(&self, page: Option<Arc<FakePage>>) {
        *self.page.lock() = page;
    }
}

impl RenderFrame for FakeFrame {
    fn is_inactive_and_disallow_activation(&self) -> bool {
        self.inactive.load(Ordering::SeqCst)
    }

    fn has_transient_user_activation(&self) -> bool {
        self.user_activation.load(Ordering::SeqCst)
    }

    fn page(&self) -> Option<Arc<dyn WebPage>> {
        let page = self.page.lock().clone()?;
        Some(page as Arc<dyn WebPage>)
    }
}

#[derive(Default)]
pub struct FakePage {
    origin: Mutex<Option<Origin>>,
    request_manager: Mutex<Option<Arc<FileSystemAccessPermissionRequestManager>>>,
    fullscreen_blocks: Arc<AtomicUsize>,
}

impl FakePage {
    pub fn set_origin(&self, origin: Option<Origin>) {
        *self.origin.lock() = origin;
    }

    pub fn set_request_manager(
        &self,
        manager: Option<Arc<FileSystemAccessPermissionRequestManager>>,
    ) {
        *self.request_manager.lock() = manager;
    }

    pub fn fullscreen_blocks_held(&self) -> usize {
        self.fullscreen_blocks.load(Ordering::SeqCst)
    }
}

impl WebPage for FakePage {
    fn last_committed_origin(&self) -> Option<Origin> {
        self.origin.lock().clone()
    }

    fn request_manager(&self) -> Option<Arc<FileSystemAccessPermissionRequestManager>> {
        self.request_manager.lock().clone()
    }

    fn drop_fullscreen(&self) -> FullscreenBlock {
        self.fullscreen_blocks.fetch_add(1, Ordering::SeqCst);
        let blocks = self.fullscreen_blocks.clone();
        FullscreenBlock::new(move || {
            blocks.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Keeps every presented request for the test to answer.
#[derive(Default)]
pub struct RecordingPresenter {
    requests: Mutex<Vec<PermissionRequest>>,
}

impl RecordingPresenter {
    pub fn take(&self) -> Vec<PermissionRequest> {
        std::mem::take(&mut *self.requests.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }
}

impl PermissionPresenter for RecordingPresenter {
    fn present(&self, request: PermissionRequest) {
        self.requests.lock().push(request);
    }
}

/// A profile with one loaded page for `https://example.com` hosting
/// [`TEST_FRAME`], whose prompts land in `presenter`.
pub struct TestEnv {
    pub origin: Origin,
    pub sequence: Sequence,
    pub engine: Arc<FakeEngine>,
    pub frame: Arc<FakeFrame>,
    pub page: Arc<FakePage>,
    pub presenter: Arc<RecordingPresenter>,
    pub manager: Arc<FileSystemAccessPermissionRequestManager>,
    pub context: Arc<FileSystemAccessPermissionContext>,
}

impl TestEnv {
    pub fn new() -> Self {
        let origin: Origin = "https://example.com".parse().unwrap();
        let sequence = Sequence::new();
        let paths = FakePathService::new()
            .with(BasePathKey::Home, "/home/user")
            .with(BasePathKey::UserDocuments, "/home/user/Documents")
            .with(BasePathKey::DefaultDownloads, "/home/user/Downloads");
        let policy = BlockedPathPolicy::new(&paths, "Notes");

        let engine = Arc::new(FakeEngine::default());
        let context = FileSystemAccessPermissionContext::new(
            engine.clone() as Arc<dyn BrowserEngine>,
            Arc::new(paths),
            policy,
            sequence.clone(),
        );

        let presenter = Arc::new(RecordingPresenter::default());
        let manager = FileSystemAccessPermissionRequestManager::new(&context);
        manager.set_presenter(Some(presenter.clone() as Arc<dyn PermissionPresenter>));
        manager.document_on_load_completed();

        let page = Arc::new(FakePage::default());
        page.set_origin(Some(origin.clone()));
        page.set_request_manager(Some(manager.clone()));
        let frame = FakeFrame::new(page.clone());
        engine.add_frame(TEST_FRAME, frame.clone());

        Self {
            origin,
            sequence,
            engine,
            frame,
            page,
            presenter,
            manager,
            context,
        }
    }
}
