use env_logger::Env;

/// Install the process logger if nobody has done so yet.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Hosts that already
/// installed a `log` backend keep theirs.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
