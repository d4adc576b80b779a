use bcnp_frame::{CHECKSUM_SIZE, HEADER_SIZE};
use bcnp_schema::{FieldType, RecordLayout, Schema};
use serde::Serialize;

use crate::cmd::SchemaArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct FieldOutput<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
    offset: usize,
    size: usize,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    id: u16,
    name: &'a str,
    wire_size: usize,
    fields: Vec<FieldOutput<'a>>,
}

#[derive(Serialize)]
struct SchemaOutput<'a> {
    protocol_version: String,
    schema_hash: String,
    header_size: usize,
    checksum_size: usize,
    messages: Vec<MessageOutput<'a>>,
}

pub fn run(_args: SchemaArgs, schema: &Schema, format: OutputFormat) -> CliResult<i32> {
    let out = describe(schema);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let rows = out
                .messages
                .iter()
                .flat_map(|message| {
                    message.fields.iter().map(move |field| {
                        vec![
                            message.id.to_string(),
                            message.name.to_string(),
                            field.name.to_string(),
                            type_label(field),
                            field.offset.to_string(),
                            field.size.to_string(),
                        ]
                    })
                })
                .collect();
            println!(
                "protocol {}  schema hash {}",
                out.protocol_version, out.schema_hash
            );
            print_table(&["ID", "MESSAGE", "FIELD", "TYPE", "OFFSET", "SIZE"], rows);
        }
        OutputFormat::Pretty => {
            println!("Protocol:    {}", out.protocol_version);
            println!("Schema hash: {}", out.schema_hash);
            for message in &out.messages {
                println!("  {} {} ({} bytes)", message.id, message.name, message.wire_size);
                for field in &message.fields {
                    println!("    +{:<3} {:<12} {}", field.offset, field.name, type_label(field));
                }
            }
        }
        OutputFormat::Raw => print_raw(&schema.hash().to_be_bytes()),
    }
    Ok(SUCCESS)
}

fn describe(schema: &Schema) -> SchemaOutput<'_> {
    let mut layouts: Vec<&RecordLayout> = schema.registry().iter().collect();
    layouts.sort_by_key(|layout| layout.id());

    SchemaOutput {
        protocol_version: schema.version().to_string(),
        schema_hash: schema.hash().to_string(),
        header_size: HEADER_SIZE,
        checksum_size: CHECKSUM_SIZE,
        messages: layouts.into_iter().map(describe_message).collect(),
    }
}

fn describe_message(layout: &RecordLayout) -> MessageOutput<'_> {
    let mut offset = 0;
    let fields = layout
        .descriptor()
        .fields
        .iter()
        .map(|field| {
            let size = field.ty.wire_size();
            let scale = match field.ty {
                FieldType::Fixed32 { scale } => Some(scale),
                _ => None,
            };
            let out = FieldOutput {
                name: &field.name,
                ty: field.ty.name(),
                scale,
                offset,
                size,
            };
            offset += size;
            out
        })
        .collect();

    MessageOutput {
        id: layout.id().get(),
        name: layout.name(),
        wire_size: layout.wire_size(),
        fields,
    }
}

fn type_label(field: &FieldOutput<'_>) -> String {
    match field.scale {
        Some(scale) => format!("{}(x{scale})", field.ty),
        None => field.ty.to_string(),
    }
}
