use acpctl::error_reporter::ErrorReporter;

fn main() {
    if let Err(err) = acpctl::cli::run() {
        ErrorReporter::report_and_exit(&err);
    }
}
