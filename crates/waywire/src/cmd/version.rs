use serde::Serialize;
use waywire_frame::{
    DEFAULT_ANCILLARY_BUFFER_SIZE, DEFAULT_READ_BUFFER_SIZE, HEADER_SIZE, MAX_MESSAGE_SIZE,
};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    git_hash: &'static str,
    relay: bool,
    wire: WireInfo,
}

/// Protocol constants compiled into this binary.
#[derive(Serialize)]
struct WireInfo {
    byte_order: &'static str,
    header_size: usize,
    max_message_size: usize,
    read_buffer_size: usize,
    ancillary_buffer_size: usize,
    fd_passing: &'static str,
}

fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("WAYWIRE_BUILD_TARGET").unwrap_or("unknown"),
        profile: option_env!("WAYWIRE_BUILD_PROFILE").unwrap_or("unknown"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        relay: cfg!(feature = "relay"),
        wire: WireInfo {
            byte_order: if cfg!(target_endian = "little") {
                "little"
            } else {
                "big"
            },
            header_size: HEADER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            ancillary_buffer_size: DEFAULT_ANCILLARY_BUFFER_SIZE,
            fd_passing: "SCM_RIGHTS",
        },
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = build_info();
    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("name: {}", info.name);
            println!("version: {}", info.version);
            println!("target: {} ({})", info.target, info.profile);
            println!("git_hash: {}", info.git_hash);
            println!("features: relay={}, cli=true", info.relay);
            println!("byte_order: {}", info.wire.byte_order);
            println!(
                "message_size: {}..={} bytes",
                info.wire.header_size, info.wire.max_message_size
            );
            println!(
                "buffers: read={} ancillary={}",
                info.wire.read_buffer_size, info.wire.ancillary_buffer_size
            );
            println!("fd_passing: {}", info.wire.fd_passing);
        }
    }

    Ok(SUCCESS)
}
