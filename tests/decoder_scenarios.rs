// tests/decoder_scenarios.rs
//
// Decoder behaviour against the shipped dictionary (config/symbols.json).

use prophecy_decoder::decoder::{DecodedEntry, NO_MATCH_MESSAGE};
use prophecy_decoder::{Decoder, SymbolDictionary};
use serde_json::json;

fn shipped_decoder() -> Decoder {
    let dict = SymbolDictionary::load("config/symbols.json");
    assert!(!dict.is_empty(), "shipped dictionary should load");
    Decoder::new(dict)
}

#[test]
fn the_number_666_decodes_to_revelation_13_18() {
    let d = shipped_decoder();
    let out = d.decode("the number 666 appears");
    let m = out
        .matches()
        .find(|m| m.name == "666")
        .expect("666 should match");
    assert!(m.symbol.scriptures.iter().any(|s| s == "Revelation 13:18"));
    assert!(!out.is_no_match());
}

#[test]
fn hello_world_is_the_single_sentinel() {
    let d = shipped_decoder();
    let out = d.decode("hello world");
    assert_eq!(out.decoded, vec![DecodedEntry::NoMatch]);
    assert_eq!(
        serde_json::to_value(&out).unwrap(),
        json!({ "decoded": [{ "message": NO_MATCH_MESSAGE }] })
    );
}

#[test]
fn empty_input_is_the_sentinel_too() {
    let d = shipped_decoder();
    assert!(d.decode("").is_no_match());
    assert!(d.decode("   \n\t").is_no_match());
}

#[test]
fn decode_is_idempotent_and_once_per_symbol() {
    let d = shipped_decoder();
    let text = "The dragon, the serpent and the DRAGON again; war, wars and more war.";
    let a = d.decode(text);
    let b = d.decode(text);
    assert_eq!(a, b);

    let names = a.symbol_names();
    let mut dedup = names.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(names.len(), dedup.len(), "each symbol at most once: {names:?}");
    assert!(names.contains(&"Dragon"));
    assert!(names.contains(&"Wars and Rumors of Wars"));
}

#[test]
fn results_follow_dictionary_order() {
    let d = shipped_decoder();
    // Dragon precedes Earthquakes in the file even though the text says it later.
    let out = d.decode("An earthquake woke the dragon");
    assert_eq!(out.symbol_names(), vec!["Dragon", "Earthquakes"]);
}

#[test]
fn whole_words_only_for_non_numeric_terms() {
    let d = shipped_decoder();
    assert!(d.decode("Extended warranty offer").is_no_match());
    assert!(d.decode("Babylonian cuneiform exhibit").is_no_match());
}

#[test]
fn missing_dictionary_file_degrades_to_no_match() {
    let d = Decoder::new(SymbolDictionary::load("config/definitely_missing.json"));
    assert!(d.is_empty());
    assert!(d.decode("the number 666 appears").is_no_match());
}
