use std::{num::NonZeroU8, panic, path::Path};

use anyhow::Result;
use time::format_description::well_known::{iso8601, Iso8601};
use tracing::error;
use tracing_subscriber::{
    fmt::time::LocalTime, prelude::__tracing_subscriber_SubscriberExt, EnvFilter, Layer,
};

const MY_CONFIG: iso8601::EncodedConfig = iso8601::Config::DEFAULT
    .set_time_precision(iso8601::TimePrecision::Second {
        decimal_digits: NonZeroU8::new(3),
    })
    .encode();

fn directives() -> &'static str {
    if cfg!(debug_assertions) {
        "rivalhook=trace,rivalhook_lib=trace"
    } else {
        "rivalhook=info,rivalhook_lib=info"
    }
}

/// Logs into `dir/file_name` and, with `console`, also to stdout.
pub fn init_tracing(dir: &Path, file_name: &str, console: bool) -> Result<()> {
    let default_layer = || {
        const WITH_FILE_PATH: bool = cfg!(debug_assertions);
        tracing_subscriber::fmt::layer()
            .compact()
            .with_file(WITH_FILE_PATH)
            .with_line_number(WITH_FILE_PATH)
            .with_target(!WITH_FILE_PATH)
            .with_thread_ids(true)
            .with_timer(LocalTime::new(Iso8601::<MY_CONFIG>))
    };
    let writer = tracing_appender::rolling::never(dir, file_name);
    let file_layer = default_layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(EnvFilter::new(directives()));

    if console {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(
                file_layer.and_then(
                    default_layer()
                        .with_ansi(true)
                        .with_filter(EnvFilter::new(directives())),
                ),
            ),
        )?;
    } else {
        tracing::subscriber::set_global_default(tracing_subscriber::registry().with(file_layer))?;
    }

    panic::set_hook(Box::new(|panic| error!("{}", panic)));
    Ok(())
}
