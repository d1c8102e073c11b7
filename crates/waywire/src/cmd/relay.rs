use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use waywire_frame::{WireConfig, WireMessage};
use waywire_relay::{Direction, NullObserver, Observer, RelayConfig, RelayServer};

use crate::cmd::RelayArgs;
use crate::exit::{CliError, CliResult, OrExit, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_batch, OutputFormat};

const DEFAULT_DISPLAY: &str = "wayland-0";

pub fn run(args: RelayArgs, format: OutputFormat) -> CliResult<i32> {
    let upstream = resolve_upstream(
        args.upstream,
        std::env::var_os("XDG_RUNTIME_DIR"),
        std::env::var_os("WAYLAND_DISPLAY"),
    )?;
    if upstream == args.path {
        return Err(CliError::new(
            USAGE,
            "listen path and upstream path must differ",
        ));
    }
    if args.read_buffer == 0 {
        return Err(CliError::new(USAGE, "--read-buffer must be greater than 0"));
    }

    let config = RelayConfig {
        listen_path: args.path,
        upstream_path: upstream,
        wire: WireConfig {
            read_buffer_size: args.read_buffer,
            ancillary_buffer_size: args.ancillary_buffer,
            ..WireConfig::default()
        },
    };

    let observer: Arc<dyn Observer> = if args.quiet {
        Arc::new(NullObserver)
    } else {
        Arc::new(move |direction: Direction, wire: &WireMessage| {
            print_batch(direction.as_str(), &wire.messages, wire.fds.len(), format);
        })
    };

    let server = RelayServer::bind(config)
        .or_exit("bind failed")?
        .with_observer(observer);
    tracing::info!(
        listen = %server.path().display(),
        upstream = %server.config().upstream_path.display(),
        "relay ready"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    server
        .serve(&running)
        .or_exit("relay failed")?;

    Ok(SUCCESS)
}

/// Explicit path wins; otherwise the display socket under the runtime dir.
/// An absolute `WAYLAND_DISPLAY` is used as is.
fn resolve_upstream(
    explicit: Option<PathBuf>,
    runtime_dir: Option<OsString>,
    display: Option<OsString>,
) -> CliResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let display = display
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DISPLAY));
    if display.is_absolute() {
        return Ok(display);
    }

    match runtime_dir.filter(|d| !d.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir).join(display)),
        None => Err(CliError::new(
            USAGE,
            "no --upstream given and XDG_RUNTIME_DIR is not set",
        )),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
