//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Determines if standard error is attached to a terminal that understands ANSI escapes.
pub fn is_ansi_interactive_terminal() -> bool {
    let stderr_is_tty = unsafe { libc::isatty(libc::STDERR_FILENO) == 1 };
    let term = std::env::var("TERM").unwrap_or_default();

    if stderr_is_tty && term.is_empty() {
        tracing::debug!("detected TTY without TERM environment variable");
    }

    stderr_is_tty && term != "dumb"
}

/// Determines if standard output is attached to a terminal.
pub fn is_stdout_terminal() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 }
}
