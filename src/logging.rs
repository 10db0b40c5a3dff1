use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber: stderr, `RUST_LOG` wins over the verbosity default.
pub fn init(verbose: bool, json: bool) {
  let default = if verbose { "eng_metrics=debug,warn" } else { "eng_metrics=info,warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  let builder = fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false);

  // try_init: a second call (tests) keeps the first subscriber
  let _ = if json { builder.json().try_init() } else { builder.try_init() };
}
