use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Stdin;

use parking_lot::Mutex;
use termcolor::Color;
use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::WriteColor;

use super::is_stderr_tty;
use crate::prompt_message;
use crate::PermissionPresenter;
use crate::PermissionRequest;
use crate::MAX_PERMISSION_PROMPT_LENGTH;
use crate::PERMISSION_EMOJI;

/// Asks on a terminal. Prompts are serialized: a second request waits until
/// the first one has been answered.
pub struct TtyPresenter<R, W> {
    io: Mutex<(R, W)>,
}

impl TtyPresenter<BufReader<Stdin>, StandardStream> {
    /// Reads answers from stdin and writes prompts to stderr.
    pub fn stdio() -> Self {
        let color = if is_stderr_tty() {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self::new(
            BufReader::new(io::stdin()),
            StandardStream::stderr(color),
        )
    }
}

impl<R: BufRead + Send, W: WriteColor + Send> TtyPresenter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }

    fn ask(&self, message: &str) -> io::Result<bool> {
        let mut io = self.io.lock();
        let (reader, writer) = &mut *io;

        writer.set_color(ColorSpec::new().set_bold(true))?;
        write!(writer, "┏ {PERMISSION_EMOJI}  ")?;
        writer.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        writeln!(writer, "{message}")?;
        writer.reset()?;
        write!(writer, "┗ Allow? [y/n] > ")?;
        writer.flush()?;

        let mut line = String::new();
        loop {
            line.clear();
            // EOF counts as a denial.
            if reader.read_line(&mut line)? == 0 {
                writeln!(writer)?;
                return Ok(false);
            }
            match line.trim() {
                "y" | "Y" | "yes" => return Ok(true),
                "n" | "N" | "no" => return Ok(false),
                _ => {
                    writer.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                    write!(writer, "┗ Unrecognized option. Allow? [y/n] > ")?;
                    writer.reset()?;
                    writer.flush()?;
                }
            }
        }
    }
}

impl<R: BufRead + Send, W: WriteColor + Send> PermissionPresenter for TtyPresenter<R, W> {
    fn present(&self, request: PermissionRequest) {
        let message = prompt_message(&request);
        if message.len() > MAX_PERMISSION_PROMPT_LENGTH {
            log::warn!(
                "❌ Permission prompt length ({} bytes) exceeds the maximum, denying",
                message.len()
            );
            request.reject();
            return;
        }

        // The lock is released before answering; the answer may show the
        // next prompt right away.
        match self.ask(&message) {
            Ok(true) => request.accept(),
            Ok(false) => request.reject(),
            Err(err) => {
                log::warn!("Unable to prompt for permission: {err}");
                request.reject();
            }
        }
    }
}
