//! Terminal presentation of failures
//!
//! Every CLI failure funnels through here so users see one shape: a
//! one-line summary on stderr, a suggestion when one follows from the
//! error, and the documented exit code.

use crate::error::AcpError;

/// Formats errors for end users and maps them to exit codes.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Print the error and terminate the process with its mapped exit code.
    pub fn report_and_exit(err: &AcpError) -> ! {
        eprintln!("error: {err}");
        if let Some(suggestion) = err.suggestion() {
            eprintln!("  hint: {suggestion}");
        }
        std::process::exit(err.to_exit_code().as_i32());
    }
}
