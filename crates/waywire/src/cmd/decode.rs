use std::io::Read;
use std::path::Path;

use waywire_frame::split_messages;

use crate::cmd::DecodeArgs;
use crate::exit::{CliResult, OrExit, SUCCESS};
use crate::output::{print_batch, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = match args.file.as_deref() {
        Some(path) if path != Path::new("-") => {
            std::fs::read(path).or_exit(&format!("failed reading {}", path.display()))?
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .or_exit("failed reading stdin")?;
            buf
        }
    };

    let messages = split_messages(&bytes).or_exit("decode failed")?;
    tracing::debug!(messages = messages.len(), bytes = bytes.len(), "decoded capture");
    print_batch("capture", &messages, 0, format);

    Ok(SUCCESS)
}
