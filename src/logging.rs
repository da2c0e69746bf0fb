//! Tracing subscriber setup for tools embedding the pipeline.

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber.
///
/// Uses `RUST_LOG` if set, otherwise the verbose flag picks between
/// `jarforge=debug` and `jarforge=info`. Examples: `RUST_LOG=jarforge=trace`,
/// `RUST_LOG=jarforge::pipeline=debug`. Calling this more than once is a no-op.
pub fn init(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("jarforge=debug")
    } else {
        EnvFilter::new("jarforge=info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("Logging initialized (verbose={})", verbose);
}
