//! Decode a protobuf payload without a schema and show it as a field tree.
//!
//! Usage:
//!   protoedit <input.bin> [--schema=FILE] [--message=NAME] [--json] [--emit-schema] [--dump] [--out=FILE] [--verbose]
//!
//! Prints an indented dump by default. `--json` prints the name-keyed JSON view and
//! `--emit-schema` a schema describing the tree; `--dump` adds the dump back when either is
//! given. `--schema` applies a schema first (its root message, or `--message`). `--out`
//! re-encodes the tree and writes the bytes to FILE.

use anyhow::{bail, Context};
use protoedit::dump::node_to_dump;
use protoedit::{apply_schema, apply_schema_as, decode, emit_schema, encode, to_json_string};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn take_value(args: &mut Vec<String>, prefix: &str) -> Option<String> {
    let pos = args.iter().position(|a| a.starts_with(prefix))?;
    let arg = args.remove(pos);
    arg.strip_prefix(prefix).map(str::to_string)
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut args, "--verbose") | take_flag(&mut args, "-v");
    let json = take_flag(&mut args, "--json");
    let emit = take_flag(&mut args, "--emit-schema");
    let dump = take_flag(&mut args, "--dump") || !(json || emit);
    let schema_path = take_value(&mut args, "--schema=").map(PathBuf::from);
    let message = take_value(&mut args, "--message=");
    let out_path = take_value(&mut args, "--out=").map(PathBuf::from);

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Some(unknown) = args.iter().find(|a| a.starts_with('-')) {
        bail!("unknown option {}", unknown);
    }
    let mut rest = args.into_iter();
    let Some(input) = rest.next().map(PathBuf::from) else {
        bail!("usage: protoedit <input.bin> [--schema=FILE] [--message=NAME] [--json] [--emit-schema] [--dump] [--out=FILE] [--verbose]");
    };
    if message.is_some() && schema_path.is_none() {
        bail!("--message needs --schema");
    }

    let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let mut root = decode(&bytes).with_context(|| format!("decoding {}", input.display()))?;

    if let Some(path) = &schema_path {
        let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        match &message {
            Some(name) => apply_schema_as(&mut root, &source, name),
            None => apply_schema(&mut root, &source),
        }
        .with_context(|| format!("applying {}", path.display()))?;
    }

    if dump {
        println!("{}", node_to_dump(&root, 0));
    }
    if json {
        println!("{}", to_json_string(Some(&root), true)?);
    }
    if emit {
        print!("{}", emit_schema(&root));
    }
    if let Some(path) = &out_path {
        let encoded = encode(&root).context("encoding tree")?;
        std::fs::write(path, &encoded).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("wrote {} bytes to {}", encoded.len(), path.display());
    }
    Ok(())
}
