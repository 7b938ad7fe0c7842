use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Set up the global `tracing` subscriber. Must run before any other
/// subsystem starts, since the worker pools log from dedicated threads that
/// never re-enter this function.
pub fn setup_tracing(log_level: &str, log_fmt: &str, log_no_color: bool) -> Result<()> {
    let filter_layer = EnvFilter::new(log_level)
        // wasmtime and its codegen backend are noisy at debug/trace and not
        // interesting to us
        .add_directive("cranelift_codegen=off".parse().unwrap())
        .add_directive("cranelift_wasm=off".parse().unwrap())
        .add_directive("h2=off".parse().unwrap())
        .add_directive("hyper=off".parse().unwrap())
        .add_directive("wasmtime_cranelift=off".parse().unwrap())
        .add_directive("wasmtime_jit=off".parse().unwrap());

    match log_fmt {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().json())
            .init(),
        "text" => {
            let fmt_layer = fmt::layer().with_ansi(!log_no_color);

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init()
        }
        _ => return Err(anyhow!("unknown log message format: {log_fmt}")),
    };

    Ok(())
}
