use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipetap_payload::DecodedPacket;
use serde::Serialize;

/// Longest argument rendering shown in a table cell.
const TABLE_ARGUMENT_LIMIT: usize = 120;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded frame of a captured stream.
#[derive(Serialize)]
pub struct PacketOutput<'a> {
    pub index: usize,
    pub size: usize,
    #[serde(flatten)]
    pub packet: &'a DecodedPacket,
}

/// Collects decoded packets and prints them in the chosen format.
///
/// JSON and pretty output are streamed; the table is printed on `finish`.
pub struct PacketPrinter {
    format: OutputFormat,
    table: Option<Table>,
}

impl PacketPrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = match format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["#", "CHANNEL", "COMMAND", "SIZE", "ARGUMENT"]);
                Some(table)
            }
            _ => None,
        };
        Self { format, table }
    }

    pub fn print(&mut self, out: &PacketOutput<'_>) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Pretty => {
                let kind = if out.packet.is_raw_fallback() {
                    "packet (raw payload)"
                } else {
                    "packet"
                };
                println!(
                    "#{} {kind} channel={} command={} size={}",
                    out.index, out.packet.channel, out.packet.command, out.size
                );
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out.packet.argument)
                        .unwrap_or_else(|_| "null".to_string())
                );
                if let Some(err) = &out.packet.decode_error {
                    println!("decode error: {err}");
                }
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        out.index.to_string(),
                        out.packet.channel.to_string(),
                        out.packet.command.clone(),
                        out.size.to_string(),
                        argument_preview(&out.packet.argument.to_string()),
                    ]);
                }
            }
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

fn argument_preview(rendered: &str) -> String {
    match rendered.char_indices().nth(TABLE_ARGUMENT_LIMIT) {
        Some((cut, _)) => format!("{}…", &rendered[..cut]),
        None => rendered.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pipetap_payload::Value;

    use super::*;

    #[test]
    fn json_output_flattens_packet_fields() {
        let packet = DecodedPacket {
            channel: 1,
            command: "build".to_string(),
            argument: Value::Map(vec![("target".to_string(), Value::from("App"))]),
            decode_error: None,
        };
        let out = PacketOutput {
            index: 0,
            size: 27,
            packet: &packet,
        };

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "index": 0,
                "size": 27,
                "channel": 1,
                "command": "build",
                "argument": { "target": "App" }
            })
        );
    }

    #[test]
    fn long_arguments_are_cut_on_char_boundaries() {
        let long = "é".repeat(TABLE_ARGUMENT_LIMIT + 5);
        let preview = argument_preview(&long);
        assert_eq!(preview.chars().count(), TABLE_ARGUMENT_LIMIT + 1);
        assert!(preview.ends_with('…'));
        assert_eq!(argument_preview("short"), "short");
    }
}
