use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use pipetap_frame::{FrameConfig, FrameReader};
use pipetap_payload::DecodedPacket;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::logging::{init_logging, LogDestination, LogSettings};
use crate::output::{OutputFormat, PacketOutput, PacketPrinter};

pub fn run(args: DecodeArgs, log: LogSettings) -> CliResult<i32> {
    init_logging(log, LogDestination::Stderr);

    let source = open_input(&args.input)?;
    let config = args
        .max_payload
        .map(|max_payload_size| FrameConfig { max_payload_size })
        .unwrap_or_default();
    let format = args.format.unwrap_or_else(OutputFormat::default_for_stdout);

    let mut printer = PacketPrinter::new(format);
    let result = decode_stream(source, config, |out| printer.print(out));
    printer.finish();

    let count = result?;
    tracing::debug!(count, "decoded captured stream");
    Ok(SUCCESS)
}

fn open_input(path: &Path) -> CliResult<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(path)
        .map_err(|err| io_error(&format!("failed to open {}", path.display()), err))?;
    Ok(Box::new(file))
}

/// Decode every frame of `source`, handing each packet to `emit`. Returns the
/// number of frames; packets before a truncated tail are still emitted.
fn decode_stream<R, F>(source: R, config: FrameConfig, mut emit: F) -> CliResult<usize>
where
    R: Read,
    F: FnMut(&PacketOutput<'_>),
{
    let mut reader = FrameReader::with_config(source, config);
    let mut index = 0usize;

    while let Some(frame) = reader
        .read_frame()
        .map_err(|err| frame_error(&format!("frame {index}"), err))?
    {
        let packet = DecodedPacket::decode(frame.channel(), &frame.payload());
        emit(&PacketOutput {
            index,
            size: frame.wire_size(),
            packet: &packet,
        });
        index += 1;
    }
    Ok(index)
}
