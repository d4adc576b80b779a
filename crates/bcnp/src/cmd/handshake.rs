use bcnp_peer::{encode_handshake, validate_handshake, HANDSHAKE_SIZE};
use bcnp_schema::{Schema, SchemaHash};
use serde::Serialize;
use tracing::warn;

use crate::cmd::HandshakeArgs;
use crate::exit::{handshake_error, hex_error, CliResult, SUCCESS};
use crate::output::{parse_hex, print_json, print_raw, print_table, spaced_hex, OutputFormat};

#[derive(Serialize)]
struct HandshakeOutput {
    schema_hash: String,
    handshake: String,
    size: usize,
}

#[derive(Serialize)]
struct CheckOutput {
    valid: bool,
    local_hash: String,
    remote_hash: String,
}

pub fn run(args: HandshakeArgs, schema: &Schema, format: OutputFormat) -> CliResult<i32> {
    match args.check {
        Some(hex) => check(&hex, schema.hash(), format),
        None => show(schema.hash(), format),
    }
}

fn show(hash: SchemaHash, format: OutputFormat) -> CliResult<i32> {
    let bytes = encode_handshake(hash);
    let out = HandshakeOutput {
        schema_hash: hash.to_string(),
        handshake: hex::encode(bytes),
        size: HANDSHAKE_SIZE,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["SCHEMA HASH", "HANDSHAKE"],
            vec![vec![out.schema_hash, spaced_hex(&bytes)]],
        ),
        OutputFormat::Pretty => {
            println!("Schema hash: {}", out.schema_hash);
            println!("Handshake:   {}", spaced_hex(&bytes));
        }
        OutputFormat::Raw => print_raw(&bytes),
    }
    Ok(SUCCESS)
}

fn check(input: &str, local: SchemaHash, format: OutputFormat) -> CliResult<i32> {
    let received = parse_hex(input).map_err(|err| hex_error("--check", err))?;
    let remote = validate_handshake(&received, local).map_err(|err| {
        warn!(error = %err, "handshake rejected");
        handshake_error("handshake rejected", err)
    })?;

    let out = CheckOutput {
        valid: true,
        local_hash: local.to_string(),
        remote_hash: remote.to_string(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["VALID", "LOCAL", "REMOTE"],
            vec![vec![
                out.valid.to_string(),
                out.local_hash,
                out.remote_hash,
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => println!("handshake ok ({})", out.remote_hash),
    }
    Ok(SUCCESS)
}
