use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use waywire_frame::Message;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    source: &'a str,
    object_id: u32,
    opcode: u16,
    size: u16,
    fds: usize,
    payload: String,
    timestamp: String,
}

/// Print one batch: every message it carries plus the descriptor count of
/// the transfer.
pub fn print_batch(source: &str, messages: &[Message], fds: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let timestamp = now_unix_millis();
            for message in messages {
                let out = MessageOutput {
                    source,
                    object_id: message.header.object_id,
                    opcode: message.header.opcode,
                    size: message.header.size,
                    fds,
                    payload: payload_hex(&message.payload),
                    timestamp: timestamp.clone(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "OBJECT", "OPCODE", "SIZE", "FDS", "PAYLOAD"]);
            for message in messages {
                table.add_row(vec![
                    source.to_string(),
                    message.header.object_id.to_string(),
                    message.header.opcode.to_string(),
                    message.header.size.to_string(),
                    fds.to_string(),
                    payload_hex(&message.payload),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for message in messages {
                println!(
                    "{source} object={} opcode={} size={} fds={} payload=[{}]",
                    message.header.object_id,
                    message.header.opcode,
                    message.header.size,
                    fds,
                    payload_hex(&message.payload)
                );
            }
        }
    }
}

/// Payload as space-separated hex words, the unit arguments are encoded in.
pub fn payload_hex(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() * 9 / 4);
    for (i, word) in payload.chunks(4).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        for byte in word {
            let _ = write!(out, "{byte:02x}");
        }
    }
    out
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_groups_words() {
        assert_eq!(payload_hex(&[]), "");
        assert_eq!(payload_hex(&[1, 0, 0, 0, 0xab, 0xcd, 0, 0]), "01000000 abcd0000");
    }
}
