//! Clipboard and browser integration through platform commands

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Result};

#[cfg(target_os = "macos")]
const CLIPBOARD_COMMANDS: &[&[&str]] = &[&["pbcopy"]];
#[cfg(target_os = "windows")]
const CLIPBOARD_COMMANDS: &[&[&str]] = &[&["clip"]];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CLIPBOARD_COMMANDS: &[&[&str]] = &[
    &["wl-copy"],
    &["xclip", "-selection", "clipboard"],
    &["xsel", "--clipboard", "--input"],
];

/// Copy `text` with the first clipboard command that works.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut last_error: Option<io::Error> = None;
    for command in CLIPBOARD_COMMANDS {
        match pipe_to(command, text) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => anyhow!("no clipboard command succeeded: {}", e),
        None => anyhow!("no clipboard command available"),
    })
}

fn pipe_to(command: &[&str], text: &str) -> io::Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // stdin is dropped before waiting so the command sees EOF.
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };

    let status = child.wait()?;
    written?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} exited with {}", program, status),
        ))
    }
}

/// Open a file with the desktop's default handler.
pub fn open_path(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };
    command.arg(path);
    run_opener(command).map_err(|e| anyhow!("could not open {}: {}", path.display(), e))
}

/// Run an opener to completion. Openers hand the file off and exit at once.
fn run_opener(mut command: Command) -> io::Result<()> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("opener exited with {}", status),
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn pipe_reports_exit_status() {
        assert!(pipe_to(&["cat"], "hello").is_ok());
        assert!(pipe_to(&["false"], "hello").is_err());
        assert!(pipe_to(&[], "hello").is_err());
    }

    #[test]
    fn pipe_to_command_that_ignores_stdin_is_reaped() {
        // `true` exits without reading; a large write may hit a broken pipe.
        let text = "x".repeat(1 << 20);
        let _ = pipe_to(&["true"], &text);
        assert!(pipe_to(&["missing-clipboard-command-xyz"], "hi").is_err());
    }

    #[test]
    fn opener_waits_for_exit_status() {
        assert!(run_opener(Command::new("true")).is_ok());
        assert!(run_opener(Command::new("false")).is_err());
    }
}
