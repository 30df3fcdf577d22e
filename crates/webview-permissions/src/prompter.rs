use crate::AccessKind;
use crate::HandleType;
use crate::PermissionRequest;
use crate::RequestController;
use crate::RequestKind;

pub const PERMISSION_EMOJI: &str = "⚠️";

// 10kB of permission prompting should be enough for anyone
pub const MAX_PERMISSION_PROMPT_LENGTH: usize = 10 * 1024;

/// The UI side of the broker. Given a request it must eventually call exactly
/// one of `accept()`/`reject()`, or drop every copy of the request, which
/// counts as a rejection.
pub trait PermissionPresenter: Send + Sync {
    fn present(&self, request: PermissionRequest);
}

/// Human readable one-line description of a request.
pub fn prompt_message(request: &RequestController) -> String {
    match request.kind() {
        RequestKind::FileSystemAccess {
            path,
            handle_type,
            access,
        } => {
            let access = match access {
                AccessKind::Read => "read",
                AccessKind::Write => "write",
                AccessKind::ReadWrite => "read and write",
            };
            let entry = match handle_type {
                HandleType::File => "file",
                HandleType::Directory => "folder",
            };
            format!(
                "{} wants {access} access to the {entry} \"{}\"",
                request.origin(),
                path.display()
            )
        }
        RequestKind::Quota { requested_size } => format!(
            "{} wants to store up to {requested_size} bytes of data",
            request.origin()
        ),
        RequestKind::RegisterProtocolHandler {
            scheme,
            handler_url,
        } => format!(
            "{} wants to open {scheme} links with {handler_url}",
            request.origin()
        ),
    }
}
