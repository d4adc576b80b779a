use bcnp_frame::{encode_messages, Flags};
use bcnp_schema::{DriveCmd, Message, Schema};
use bytes::BytesMut;
use serde::Serialize;
use tracing::debug;

use crate::cmd::EncodeArgs;
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_json, print_raw, print_table, spaced_hex, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    type_id: u16,
    records: usize,
    flags: u8,
    size: usize,
    hex: String,
}

pub fn run(args: EncodeArgs, schema: &Schema, format: OutputFormat) -> CliResult<i32> {
    let flags = packet_flags(&args);
    let packet = encode(schema, &args.cmds, flags)?;
    debug!(records = args.cmds.len(), bytes = packet.len(), %flags, "encoded packet");

    let out = EncodeOutput {
        type_id: DriveCmd::TYPE_ID.get(),
        records: args.cmds.len(),
        flags: flags.bits(),
        size: packet.len(),
        hex: hex::encode(&packet),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["RECORDS", "FLAGS", "SIZE", "BYTES"],
            vec![vec![
                out.records.to_string(),
                flags.to_string(),
                out.size.to_string(),
                spaced_hex(&packet),
            ]],
        ),
        OutputFormat::Pretty => println!("{}", spaced_hex(&packet)),
        OutputFormat::Raw => print_raw(&packet),
    }
    Ok(SUCCESS)
}

fn packet_flags(args: &EncodeArgs) -> Flags {
    let flags = Flags::from_bits_retain(args.flags);
    if args.clear_queue {
        flags | Flags::CLEAR_QUEUE
    } else {
        flags
    }
}

fn encode(schema: &Schema, cmds: &[DriveCmd], flags: Flags) -> CliResult<BytesMut> {
    let mut packet = BytesMut::new();
    encode_messages(schema, cmds, flags, &mut packet)
        .map_err(|err| encode_error("encode failed", err))?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    fn args(cmds: Vec<DriveCmd>, clear_queue: bool, flags: u8) -> EncodeArgs {
        EncodeArgs {
            cmds,
            clear_queue,
            flags,
        }
    }

    #[test]
    fn clear_queue_merges_with_raw_flags() {
        assert_eq!(packet_flags(&args(vec![], true, 0x80)).bits(), 0x81);
        assert_eq!(packet_flags(&args(vec![], false, 0x01)).bits(), 0x01);
        assert_eq!(packet_flags(&args(vec![], false, 0)), Flags::NONE);
    }

    #[test]
    fn three_command_batch() {
        let cmds = [
            DriveCmd::new(1.0, 0.0, 1000),
            DriveCmd::new(0.0, 1.5708, 500),
            DriveCmd::new(0.5, 0.0, 2000),
        ];
        let packet = encode(&Schema::builtin(), &cmds, Flags::CLEAR_QUEUE).unwrap();
        assert_eq!(packet.len(), 39);
        assert_eq!(&packet[..9], &[0x02, 0x04, 0x01, 0x00, 0x03, 0x00, 0x00, 0x27, 0x10]);
    }

    #[test]
    fn non_finite_velocity_rejected() {
        let err = encode(
            &Schema::builtin(),
            &[DriveCmd::new(f32::INFINITY, 0.0, 1)],
            Flags::NONE,
        )
        .unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("vx"));
    }
}
