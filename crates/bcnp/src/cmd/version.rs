use bcnp_peer::MAGIC;
use bcnp_schema::{ProtocolVersion, Schema, HEADER_LAYOUT_VERSION};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("bcnp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: bcnp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol: {}", ProtocolVersion::CURRENT);
    println!("header_layout: {HEADER_LAYOUT_VERSION}");
    println!("magic: {}", MAGIC.escape_ascii());
    println!("builtin_schema_hash: {}", Schema::builtin().hash());
    println!(
        "target: {}",
        option_env!("BCNP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));

    Ok(SUCCESS)
}
