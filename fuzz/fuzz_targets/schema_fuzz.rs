//! Schema fuzz target: feed arbitrary text to the schema parser and resolver.
//! Neither may panic; they return Ok or a SchemaParseError.
//! Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(schema) = protoedit::parse_resolved(s) {
        let _ = schema.root_message();
        let mut root = protoedit::Node::root();
        let _ = protoedit::apply_schema(&mut root, s);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
