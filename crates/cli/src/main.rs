fn main() {
    if let Err(error) = xpathkit_cli::run() {
        // run() installs the subscriber right after argument parsing.
        tracing::error!(error = %format!("{error:#}"), "evaluation failed");
        std::process::exit(1);
    }
}
