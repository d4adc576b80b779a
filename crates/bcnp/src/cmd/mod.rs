use std::path::Path;
use std::sync::Arc;

use bcnp_schema::{DriveCmd, MessageTypeId, Schema, SchemaDescription};
use clap::{Args, Subcommand};
use tracing::debug;

use crate::exit::{schema_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod handshake;
pub mod schema;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List message types, record layouts and the schema hash.
    Schema(SchemaArgs),
    /// Print the local handshake, or validate a received one.
    Handshake(HandshakeArgs),
    /// Encode a batch of drive commands into a packet.
    Encode(EncodeArgs),
    /// Decode a packet and print its records.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, schema_path: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Schema(args) => {
            let loaded = load_schema(schema_path)?;
            schema::run(args, &loaded, format)
        }
        Command::Handshake(args) => {
            let loaded = load_schema(schema_path)?;
            handshake::run(args, &loaded, format)
        }
        Command::Encode(args) => {
            let loaded = load_schema(schema_path)?;
            encode::run(args, &loaded, format)
        }
        Command::Decode(args) => {
            let loaded = load_schema(schema_path)?;
            decode::run(args, &loaded, format)
        }
        Command::Version(args) => version::run(args),
    }
}

/// Compile the schema from `path`, or use the built-in one.
pub fn load_schema(path: Option<&Path>) -> CliResult<Arc<Schema>> {
    let Some(path) = path else {
        return Ok(Arc::new(Schema::builtin()));
    };

    let context = format!("schema {}", path.display());
    let description =
        SchemaDescription::from_path(path).map_err(|err| schema_error(&context, err))?;
    let schema = Schema::compile(description).map_err(|err| schema_error(&context, err))?;
    debug!(path = %path.display(), hash = %schema.hash(), "loaded schema");
    Ok(Arc::new(schema))
}

#[derive(Args, Debug, Default)]
pub struct SchemaArgs {}

#[derive(Args, Debug)]
pub struct HandshakeArgs {
    /// Received handshake bytes (hex) to validate against the local schema.
    #[arg(long, value_name = "HEX")]
    pub check: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Drive command as VX,OMEGA,MS (repeatable; order is preserved).
    #[arg(long = "cmd", value_name = "VX,OMEGA,MS", value_parser = parse_drive_cmd, allow_hyphen_values = true)]
    pub cmds: Vec<DriveCmd>,
    /// Ask the receiver to drop queued commands first.
    #[arg(long)]
    pub clear_queue: bool,
    /// Raw flags byte (combined with --clear-queue).
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub flags: u8,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Packet bytes (hex).
    pub hex: String,
    /// Message type the records are decoded as.
    #[arg(long, value_name = "N", default_value_t = MessageTypeId::DRIVE_CMD.get())]
    pub type_id: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_drive_cmd(input: &str) -> Result<DriveCmd, String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let [vx, omega, ms] = parts.as_slice() else {
        return Err(format!("expected VX,OMEGA,MS, got '{input}'"));
    };

    let vx: f32 = vx.parse().map_err(|_| format!("invalid vx '{vx}'"))?;
    let omega: f32 = omega
        .parse()
        .map_err(|_| format!("invalid omega '{omega}'"))?;
    let ms: u16 = ms
        .parse()
        .map_err(|_| format!("invalid duration '{ms}' (0..=65535 ms)"))?;
    Ok(DriveCmd::new(vx, omega, ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_cmd_argument() {
        assert_eq!(
            parse_drive_cmd("1.0, -0.5,250").unwrap(),
            DriveCmd::new(1.0, -0.5, 250)
        );
        assert!(parse_drive_cmd("1.0,0.0").is_err());
        assert!(parse_drive_cmd("1.0,0.0,70000").is_err());
        assert!(parse_drive_cmd("fast,0.0,1").is_err());
    }

    #[test]
    fn missing_schema_file() {
        let err = load_schema(Some(Path::new("/nonexistent/bcnp-schema.json"))).unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);
    }

    #[test]
    fn commands_run_against_loaded_schema() {
        let code = run(Command::Schema(SchemaArgs {}), OutputFormat::Json, None).unwrap();
        assert_eq!(code, crate::exit::SUCCESS);

        let handshake = HandshakeArgs { check: None };
        assert!(run(Command::Handshake(handshake), OutputFormat::Raw, None).is_ok());

        let err = run(
            Command::Schema(SchemaArgs {}),
            OutputFormat::Json,
            Some(Path::new("/nonexistent/bcnp-schema.json")),
        )
        .unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);
    }

    #[test]
    fn builtin_schema_by_default() {
        assert_eq!(load_schema(None).unwrap().hash(), Schema::builtin().hash());
    }
}
