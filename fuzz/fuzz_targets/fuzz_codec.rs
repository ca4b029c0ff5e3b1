#![no_main]

//! Fuzz target for the identifier codec
//!
//! Arbitrary input must never panic. Inputs built from lowercase words joined
//! by `_` and `::` must survive a `to_type_name` → `to_key` round trip.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use singular::{AliasMap, IdentifierCodec, SingularError};

#[derive(Debug, Arbitrary)]
struct Input {
    raw: String,
    /// Segments of words; each word is reduced to `[a-z][a-z0-9]*`
    segments: Vec<Vec<String>>,
    alias: Option<(String, String)>,
}

fn word(raw: &str) -> Option<String> {
    let mut out: String = raw
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    while out.starts_with(|c: char| c.is_ascii_digit()) {
        out.remove(0);
    }
    (!out.is_empty()).then_some(out)
}

fuzz_target!(|input: Input| {
    let plain = IdentifierCodec::plain();

    // Arbitrary strings: errors are fine, panics are not
    if let Err(err) = plain.to_type_name(&input.raw, true) {
        assert!(matches!(err, SingularError::EmptySegment { .. }));
    }
    let _ = plain.to_type_name(&input.raw, false);
    let _ = plain.to_key(&input.raw);

    let aliases = AliasMap::new();
    if let Some((from, to)) = &input.alias {
        aliases.insert(from.clone(), to.clone());
    }
    let _ = IdentifierCodec::with_aliases(&aliases).to_type_name(&input.raw, true);

    // Well-formed snake_case paths round trip
    let segments: Vec<String> = input
        .segments
        .iter()
        .filter_map(|words| {
            let words: Vec<String> = words.iter().filter_map(|w| word(w)).collect();
            (!words.is_empty()).then(|| words.join("_"))
        })
        .collect();
    if segments.is_empty() {
        return;
    }

    let key = segments.join("::");
    let type_name = plain.to_type_name(&key, true).expect("well-formed key");
    assert_eq!(plain.to_key(&type_name).expect("well-formed type name"), key);
});
