//! Decoder fuzz target: feed arbitrary bytes to the schemaless decoder.
//! Decoding must not panic; whatever decodes must re-encode, emit a schema that applies
//! back onto the tree, and decode again to the same tree.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let tree = match protoedit::decode(data) {
        Ok(t) => t,
        Err(_) => return,
    };
    let bytes = protoedit::encode(&tree).expect("decoded trees encode");
    let again = protoedit::decode(&bytes).expect("encoded trees decode");
    assert_eq!(again, tree);
    let schema = protoedit::emit_schema(&tree);
    let mut applied = tree.clone();
    protoedit::apply_schema(&mut applied, &schema).expect("emitted schema applies");
    let _ = protoedit::to_json(Some(&applied));
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
