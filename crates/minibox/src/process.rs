//! Host command resolution

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("command '{0}' not found in PATH")]
pub struct CommandNotFound(pub String);

/// Resolve the program in a command to an absolute path using the host's PATH.
///
/// A missing compiler or launcher is reported here, before anything is
/// spawned, so it can be told apart from a program that failed to start.
/// Commands that already contain a `/` (like `./main` or `/usr/bin/javac`)
/// are only checked for existence.
pub fn resolve_command(command: &mut [String]) -> Result<(), CommandNotFound> {
    let first = match command.first_mut() {
        Some(first) => first,
        None => return Ok(()),
    };

    if first.contains('/') {
        return if Path::new(first.as_str()).is_file() {
            Ok(())
        } else {
            Err(CommandNotFound(first.clone()))
        };
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(&*first);
        if candidate.is_file() {
            // Not canonicalized: multi-call binaries dispatch on the link name
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(CommandNotFound(first.clone()))
}
