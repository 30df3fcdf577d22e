use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::AccessKind;
use crate::HandleType;
use crate::Origin;
use crate::PermissionAction;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum QuotaResponse {
    Allow,
    Disallow,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ProtocolHandlerResponse {
    Accept,
    Ignore,
}

/// Payload of a pending user-facing request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestKind {
    FileSystemAccess {
        path: PathBuf,
        handle_type: HandleType,
        access: AccessKind,
    },
    Quota {
        requested_size: u64,
    },
    RegisterProtocolHandler {
        scheme: String,
        handler_url: Url,
    },
}

enum Reply {
    FileSystemAccess(Box<dyn FnOnce(PermissionAction) + Send>),
    Quota(Box<dyn FnOnce(QuotaResponse) + Send>),
    RegisterProtocolHandler(Box<dyn FnOnce(ProtocolHandlerResponse) + Send>),
}

impl Reply {
    fn finalize(self, accepted: bool) {
        match self {
            Reply::FileSystemAccess(reply) => reply(if accepted {
                PermissionAction::Granted
            } else {
                PermissionAction::Denied
            }),
            Reply::Quota(reply) => reply(if accepted {
                QuotaResponse::Allow
            } else {
                QuotaResponse::Disallow
            }),
            Reply::RegisterProtocolHandler(reply) => reply(if accepted {
                ProtocolHandlerResponse::Accept
            } else {
                ProtocolHandlerResponse::Ignore
            }),
        }
    }
}

/// A request that is answered at most once.
///
/// `accept()` and `reject()` are idempotent and mutually exclusive: the
/// first call wins and every later call is a no-op. A controller dropped
/// without an answer is rejected.
pub struct RequestController {
    origin: Origin,
    kind: RequestKind,
    answered: AtomicBool,
    reply: Mutex<Option<Reply>>,
}

impl RequestController {
    fn new(origin: Origin, kind: RequestKind, reply: Reply) -> Self {
        Self {
            origin,
            kind,
            answered: AtomicBool::new(false),
            reply: Mutex::new(Some(reply)),
        }
    }

    pub fn file_system_access(
        origin: Origin,
        path: PathBuf,
        handle_type: HandleType,
        access: AccessKind,
        reply: impl FnOnce(PermissionAction) + Send + 'static,
    ) -> Self {
        Self::new(
            origin,
            RequestKind::FileSystemAccess {
                path,
                handle_type,
                access,
            },
            Reply::FileSystemAccess(Box::new(reply)),
        )
    }

    pub fn quota(
        origin: Origin,
        requested_size: u64,
        reply: impl FnOnce(QuotaResponse) + Send + 'static,
    ) -> Self {
        Self::new(
            origin,
            RequestKind::Quota { requested_size },
            Reply::Quota(Box::new(reply)),
        )
    }

    pub fn register_protocol_handler(
        origin: Origin,
        scheme: impl Into<String>,
        handler_url: Url,
        reply: impl FnOnce(ProtocolHandlerResponse) + Send + 'static,
    ) -> Self {
        Self::new(
            origin,
            RequestKind::RegisterProtocolHandler {
                scheme: scheme.into(),
                handler_url,
            },
            Reply::RegisterProtocolHandler(Box::new(reply)),
        )
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn is_answered(&self) -> bool {
        self.answered.load(Ordering::Acquire)
    }

    pub fn accept(&self) {
        self.answer(true);
    }

    pub fn reject(&self) {
        self.answer(false);
    }

    pub fn file_path(&self) -> Option<&Path> {
        match &self.kind {
            RequestKind::FileSystemAccess { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn handle_type(&self) -> Option<HandleType> {
        match &self.kind {
            RequestKind::FileSystemAccess { handle_type, .. } => Some(*handle_type),
            _ => None,
        }
    }

    pub fn access_flags(&self) -> Option<AccessKind> {
        match &self.kind {
            RequestKind::FileSystemAccess { access, .. } => Some(*access),
            _ => None,
        }
    }

    pub fn requested_size(&self) -> Option<u64> {
        match &self.kind {
            RequestKind::Quota { requested_size } => Some(*requested_size),
            _ => None,
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        match &self.kind {
            RequestKind::RegisterProtocolHandler { scheme, .. } => Some(scheme),
            _ => None,
        }
    }

    fn answer(&self, accepted: bool) {
        if self.answered.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!(
            "{} {:?} request from {}",
            if accepted { "Accepted" } else { "Rejected" },
            self.kind,
            self.origin
        );
        let reply = self.reply.lock().take();
        if let Some(reply) = reply {
            reply.finalize(accepted);
        }
    }
}

impl Drop for RequestController {
    fn drop(&mut self) {
        self.answer(false);
    }
}

impl fmt::Debug for RequestController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestController")
            .field("origin", &self.origin)
            .field("kind", &self.kind)
            .field("answered", &self.is_answered())
            .finish()
    }
}

/// Shared handle given to the presentation layer. Copies refer to the same
/// controller; the controller is rejected once the last copy goes away
/// unanswered.
#[derive(Clone, Debug)]
pub struct PermissionRequest(Arc<RequestController>);

impl PermissionRequest {
    pub fn new(controller: RequestController) -> Self {
        Self(Arc::new(controller))
    }
}

impl Deref for PermissionRequest {
    type Target = RequestController;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for PermissionRequest {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PermissionRequest {}
