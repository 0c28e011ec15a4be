// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::BTreeMap;

use readql::{
    Backend, CompileOptions, Harness, Interpreter, Summary, compile,
    record::{AuxValue, Header, Record, flags},
};

/// References "1", "2" and "12".
pub fn header() -> Header {
    let mut header = Header::new(["1", "2", "12"]);
    header.text = "@HD\tVN:1.6\tSO:coordinate\n@RG\tID:grpA\n@RG\tID:grpB\n".to_string();
    header
}

fn aux(fields: &[(&str, AuxValue)]) -> BTreeMap<String, AuxValue> {
    fields
        .iter()
        .map(|(tag, value)| (tag.to_string(), value.clone()))
        .collect()
}

/// Reads sorted by reference, the way a coordinate-sorted file delivers them.
///
/// | name | ref | pos   | end   | notes                                  |
/// |------|-----|-------|-------|----------------------------------------|
/// | A    | 1   | 100   | 109   | RG grpA, NM 0                          |
/// | B    | 1   | 10050 | 10069 | duplicate                              |
/// | G    | 1   | 300   | 305   | 2M2D2M, RG grpB                        |
/// | C    | 2   | 500   | 507   | paired read1, mate on "1", mapq 10     |
/// | F    | 2   | 10000 | 10003 | reverse, XS 0.25                       |
/// | D    | 12  | 2000  | 2007  | RG grpA, NM 2                          |
/// | H    | 12  | 50    | 53    | secondary, mapq 0                      |
/// | E    | -   | -     | -     | unmapped                               |
pub fn records() -> Vec<Record> {
    let mut a = Record::mapped("A", 0, 100, "ACGTACGTAC");
    a.aux = aux(&[("RG", AuxValue::Str("grpA".into())), ("NM", AuxValue::Int(0))]);

    let mut b = Record::mapped("B", 0, 10050, "ACGTACGTACGTACGTACGT");
    b.flag = flags::DUPLICATE;

    let mut g = Record::mapped("G", 0, 300, "AAGG");
    g.cigar = "2M2D2M".to_string();
    g.aux = aux(&[("RG", AuxValue::Str("grpB".into()))]);

    let mut c = Record::mapped("C", 1, 500, "GGGGCCCC");
    c.flag = flags::PAIRED | flags::PROPER_PAIR | flags::READ1;
    c.mapq = 10;
    c.mate_ref_id = 0;
    c.mate_pos = 120;

    let mut f = Record::mapped("F", 1, 10000, "ACGT");
    f.flag = flags::REVERSE;
    f.aux = aux(&[("XS", AuxValue::Float(0.25))]);

    let mut d = Record::mapped("D", 2, 2000, "TTTTAAAA");
    d.aux = aux(&[("RG", AuxValue::Str("grpA".into())), ("NM", AuxValue::Int(2))]);

    let mut h = Record::mapped("H", 2, 50, "CCCC");
    h.flag = flags::SECONDARY;
    h.mapq = 0;

    let e = Record {
        name: "E".to_string(),
        seq: "NNNN".to_string(),
        ..Record::default()
    };

    vec![a, b, g, c, f, d, h, e]
}

/// Outcome of running a query over the fixture.
pub struct Run {
    pub accepted: Vec<String>,
    pub errors: Vec<String>,
    pub summary: Summary,
}

pub fn run_with(query: &str, options: &CompileOptions, use_index: bool) -> Run {
    let compiled = compile(query, options).unwrap_or_else(|e| panic!("{}: {}", query, e));
    let index_name = compiled.index_name();
    let loaded = Interpreter.load(compiled.module).unwrap();
    let mut harness = Harness::new(loaded.filter(&compiled.name).unwrap());
    if use_index {
        harness = harness.with_index(loaded.index(&index_name).unwrap());
    }

    let header = header();
    let records = records();
    let mut accepted = Vec::new();
    let mut errors = Vec::new();
    let summary = harness.run(
        &header,
        &records,
        &mut |record, ok| {
            if ok {
                accepted.push(record.name.clone());
            }
        },
        &mut |message| errors.push(message.to_string()),
    );
    Run {
        accepted,
        errors,
        summary,
    }
}

pub fn run(query: &str) -> Run {
    run_with(query, &CompileOptions::default(), false)
}

/// Names of the fixture reads `query` accepts, in fixture order.
pub fn accepted(query: &str) -> Vec<String> {
    run(query).accepted
}

/// Evaluate the index function of `query` for every reference of the fixture.
pub fn index_verdicts(query: &str) -> Vec<bool> {
    let compiled = compile(query, &CompileOptions::default()).unwrap();
    let index_name = compiled.index_name();
    let loaded = Interpreter.load(compiled.module).unwrap();
    let index = loaded.index(&index_name).unwrap();
    let header = header();
    (0..header.references.len() as u32)
        .map(|id| index.call(&header, id, &mut |_| {}))
        .collect()
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
