use bcnp_frame::{decode_packet, Packet};
use bcnp_schema::{FieldValue, MessageTypeId, Schema};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cmd::DecodeArgs;
use crate::exit::{decode_error, hex_error, CliResult, SUCCESS};
use crate::output::{parse_hex, print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct DecodeOutput {
    protocol_version: String,
    type_id: u16,
    message: String,
    flags: u8,
    clear_queue: bool,
    count: usize,
    records: Vec<Value>,
}

pub fn run(args: DecodeArgs, schema: &Schema, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex).map_err(|err| hex_error("packet", err))?;
    let type_id = MessageTypeId(args.type_id);
    let packet =
        decode_packet(schema, type_id, &bytes).map_err(|err| decode_error("decode failed", err))?;

    let field_names = field_names(schema, type_id);
    match format {
        OutputFormat::Json => print_json(&describe(schema, &packet, &field_names)),
        OutputFormat::Table => {
            println!(
                "version {}  flags {}  records {}",
                packet.version(),
                packet.flags(),
                packet.len()
            );
            let mut header = vec!["#"];
            header.extend(field_names.iter().map(String::as_str));
            let rows = packet
                .records
                .iter()
                .enumerate()
                .map(|(index, record)| {
                    std::iter::once(index.to_string())
                        .chain(record.values().iter().map(FieldValue::to_string))
                        .collect::<Vec<String>>()
                })
                .collect();
            print_table(&header, rows);
        }
        OutputFormat::Pretty => {
            println!(
                "version={} flags={} records={}",
                packet.version(),
                packet.flags(),
                packet.len()
            );
            for (index, record) in packet.records.iter().enumerate() {
                let fields = field_names
                    .iter()
                    .zip(record.values())
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("  [{index}] {fields}");
            }
        }
        OutputFormat::Raw => {
            let lines: String = packet
                .records
                .iter()
                .map(|record| {
                    let values: Vec<String> =
                        record.values().iter().map(FieldValue::to_string).collect();
                    format!("{}\n", values.join(","))
                })
                .collect();
            print_raw(lines.as_bytes());
        }
    }
    Ok(SUCCESS)
}

fn field_names(schema: &Schema, type_id: MessageTypeId) -> Vec<String> {
    schema
        .layout(type_id)
        .map(|layout| {
            layout
                .descriptor()
                .fields
                .iter()
                .map(|field| field.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn describe(schema: &Schema, packet: &Packet, field_names: &[String]) -> DecodeOutput {
    let message = schema
        .layout(packet.type_id)
        .map(|layout| layout.name().to_string())
        .unwrap_or_default();

    let records = packet
        .records
        .iter()
        .map(|record| {
            let object: Map<String, Value> = field_names
                .iter()
                .zip(record.values())
                .map(|(name, value)| (name.clone(), field_json(*value)))
                .collect();
            Value::Object(object)
        })
        .collect();

    DecodeOutput {
        protocol_version: packet.version().to_string(),
        type_id: packet.type_id.get(),
        message,
        flags: packet.flags().bits(),
        clear_queue: packet.flags().clear_queue(),
        count: packet.len(),
        records,
    }
}

fn field_json(value: FieldValue) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use bcnp_frame::{encode_messages, Flags};
    use bcnp_schema::DriveCmd;
    use bytes::BytesMut;

    use super::*;
    use crate::exit::{DATA_INVALID, USAGE};

    fn wire(cmds: &[DriveCmd], flags: Flags) -> String {
        let mut buf = BytesMut::new();
        encode_messages(&Schema::builtin(), cmds, flags, &mut buf).unwrap();
        hex::encode(&buf)
    }

    fn args(hex: String, type_id: u16) -> DecodeArgs {
        DecodeArgs { hex, type_id }
    }

    #[test]
    fn json_records_use_field_names() {
        let schema = Schema::builtin();
        let bytes = hex::decode(wire(&[DriveCmd::new(0.5, -0.25, 40)], Flags::CLEAR_QUEUE)).unwrap();
        let packet = decode_packet(&schema, MessageTypeId::DRIVE_CMD, &bytes).unwrap();
        let names = field_names(&schema, MessageTypeId::DRIVE_CMD);

        let json = serde_json::to_value(describe(&schema, &packet, &names)).unwrap();
        assert_eq!(json["message"], "DriveCmd");
        assert_eq!(json["clear_queue"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["records"][0]["vx"], 0.5);
        assert_eq!(json["records"][0]["omega"], -0.25);
        assert_eq!(json["records"][0]["durationMs"], 40);
    }

    #[test]
    fn corrupted_packet_is_data_invalid() {
        let mut hex = wire(&[DriveCmd::new(1.0, 0.0, 1000)], Flags::NONE);
        hex.replace_range(10..12, "ff");
        let err = run(args(hex, 1), &Schema::builtin(), OutputFormat::Json).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("checksum"));
    }

    #[test]
    fn unknown_type_is_usage_error() {
        let hex = wire(&[], Flags::NONE);
        let err = run(args(hex, 42), &Schema::builtin(), OutputFormat::Json).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn empty_batch_decodes() {
        let hex = wire(&[], Flags::NONE);
        assert_eq!(
            run(args(hex, 1), &Schema::builtin(), OutputFormat::Pretty).unwrap(),
            SUCCESS
        );
    }
}
