// tests/integration_tests.rs

mod common;

use std::{fs, path::PathBuf};

use common::{accepted, index_verdicts, names, run, run_with};
use readql::CompileOptions;

const ALL: [&str; 8] = ["A", "B", "G", "C", "F", "D", "H", "E"];

fn temp_bed(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("readql-{}-{}.bed", name, std::process::id()));
    fs::write(&path, contents).unwrap();
    path
}

// ============================================================================
// Flags
// ============================================================================

#[test]
fn test_duplicate_flag() {
    assert_eq!(accepted("duplicate?"), names(&["B"]));
}

#[test]
fn test_negated_flag() {
    assert_eq!(accepted("!duplicate?"), names(&["A", "G", "C", "F", "D", "H", "E"]));
}

#[test]
fn test_unmapped_flag() {
    assert_eq!(accepted("unmapped?"), names(&["E"]));
}

#[test]
fn test_raw_flag_needs_every_bit() {
    assert_eq!(accepted("raw_flag(3)"), names(&["C"]));
    assert_eq!(accepted("raw_flag(7)"), Vec::<String>::new());
}

#[test]
fn test_split_pair() {
    assert_eq!(accepted("split_pair?"), names(&["C"]));
}

// ============================================================================
// Chromosomes
// ============================================================================

#[test]
fn test_chromosome_exact() {
    assert_eq!(accepted("chr(1)"), names(&["A", "B", "G"]));
    assert_eq!(accepted("chr(chr2)"), names(&["C", "F"]));
}

#[test]
fn test_chromosome_globs_intersect() {
    assert_eq!(accepted("chr(1*) & chr(*2)"), names(&["D", "H"]));
    assert_eq!(index_verdicts("chr(1*) & chr(*2)"), vec![false, false, true]);
}

#[test]
fn test_mate_chromosome() {
    assert_eq!(accepted("mate_chr(1)"), names(&["C"]));
}

#[test]
fn test_chromosome_name_regex() {
    let run = run("chr_name ~ /^1/");
    assert_eq!(run.accepted, names(&["A", "B", "G", "D", "H"]));
    // Only the unmapped read has no reference name.
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].contains("read is not mapped to a reference"));
}

#[test]
fn test_bind_captures_typed_values() {
    let query = "bind chr_name using /^(?P<n_i>[0-9]+)$/ in n_i > 1";
    assert_eq!(accepted(query), names(&["C", "F", "D", "H"]));
}

// ============================================================================
// Positions
// ============================================================================

#[test]
fn test_before_and_after() {
    assert_eq!(accepted("before(10060)"), names(&["A", "B", "G", "C", "F", "D", "H"]));
    assert_eq!(accepted("after(10060)"), names(&["B"]));
}

#[test]
fn test_position_overlap_is_closed() {
    assert_eq!(accepted("position(105, 300)"), names(&["A", "G"]));
    assert_eq!(accepted("position(110, 299)"), Vec::<String>::new());
}

#[test]
fn test_end_accounts_for_deletions() {
    assert_eq!(accepted("end == 305"), names(&["G"]));
}

#[test]
fn test_mapping_quality() {
    assert_eq!(accepted("mapping_quality(30)"), names(&["A", "B", "G", "F", "D"]));
}

#[test]
fn test_begin_on_unmapped_read_reports() {
    let run = run("begin > 0");
    assert_eq!(run.accepted, names(&["A", "B", "G", "C", "F", "D", "H"]));
    assert_eq!(run.summary.errors, 1);
    assert!(run.errors[0].starts_with("1:1: "));
    assert!(run.errors[0].ends_with("read is unmapped, so it has no start position"));
}

#[test]
fn test_max_fold() {
    assert_eq!(accepted("max(begin, 1000) == begin"), names(&["B", "F", "D"]));
}

// ============================================================================
// Sequence
// ============================================================================

#[test]
fn test_nucleotide() {
    assert_eq!(accepted("nt(100, A)"), names(&["A"]));
    assert_eq!(accepted("nt(304, G)"), names(&["G"]));
    assert_eq!(accepted("nt(302, A)"), Vec::<String>::new());
}

#[test]
fn test_nucleotide_ambiguity_codes() {
    assert_eq!(accepted("nt(101, M)"), names(&["A"]));
    assert_eq!(accepted("nt_exact(101, M)"), Vec::<String>::new());
    assert_eq!(accepted("nt_exact(101, C)"), names(&["A"]));
}

// ============================================================================
// Auxiliary Fields
// ============================================================================

#[test]
fn test_read_group_glob() {
    assert_eq!(accepted("read_group(grp*)"), names(&["A", "G", "D"]));
    assert_eq!(accepted("read_group(GRPA)"), names(&["A", "D"]));
}

#[test]
fn test_aux_int_counts_missing_fields() {
    let run = run("aux_int(NM) == 2");
    assert_eq!(run.accepted, names(&["D"]));
    assert_eq!(run.summary.errors, 6);
}

#[test]
fn test_aux_dbl_missing_is_never_less() {
    assert_eq!(accepted("aux_dbl(XS) < 0.5"), names(&["F"]));
}

#[test]
fn test_aux_str_equality() {
    assert_eq!(accepted("aux_str(RG) == \"grpA\""), names(&["A", "D"]));
}

#[test]
fn test_header_text() {
    assert_eq!(accepted("header ~ /grpB/"), names(&ALL));
}

// ============================================================================
// Logic
// ============================================================================

#[test]
fn test_quantifier_under_negation() {
    assert_eq!(accepted("!(all x = 3, 4 in x == 3)"), names(&ALL));
    assert_eq!(accepted("any x = 3, 4 in x == 3"), names(&ALL));
}

#[test]
fn test_quantifier_over_positions() {
    assert_eq!(accepted("any p = 100, 500 in begin == p"), names(&["A", "C"]));
}

#[test]
fn test_implication_matches_its_expansion() {
    let expected = names(&["A", "C", "F", "D", "H", "E"]);
    assert_eq!(accepted("chr(1) -> read_group(grpA)"), expected);
    assert_eq!(accepted("!chr(1) | read_group(grpA)"), expected);
}

#[test]
fn test_xor() {
    assert_eq!(accepted("duplicate? ^ chr(1)"), names(&["A", "G"]));
}

#[test]
fn test_conditional() {
    let query = "paired? then mapping_quality(5) else mapping_quality(50)";
    assert_eq!(accepted(query), names(&["A", "B", "G", "C", "F", "D"]));
}

#[test]
fn test_let_evaluates_once() {
    assert_eq!(accepted("let lucky = random(0.5) in lucky | !lucky"), names(&ALL));
    assert!(accepted("let lucky = random(0.5) in lucky ^ lucky").is_empty());
}

#[test]
fn test_random_extremes() {
    assert_eq!(accepted("random(1)"), names(&ALL));
    assert!(accepted("random(0)").is_empty());
}

// ============================================================================
// Definitions
// ============================================================================

#[test]
fn test_defines_are_usable_predicates() {
    let options = CompileOptions {
        defines: vec![
            ("hq?".to_string(), "mapping_quality(30)".to_string()),
            ("good".to_string(), "hq? & !duplicate?".to_string()),
        ],
        ..CompileOptions::default()
    };
    let run = run_with("good & chr(1)", &options, false);
    assert_eq!(run.accepted, names(&["A", "G"]));
}

#[test]
fn test_defines_with_bindings_used_twice() {
    let options = CompileOptions {
        defines: vec![("low".to_string(), "let q = 20 in !mapping_quality(q)".to_string())],
        ..CompileOptions::default()
    };
    let run = run_with("low | low & chr(2)", &options, false);
    assert_eq!(run.accepted, names(&["C", "H", "E"]));
}

// ============================================================================
// Index
// ============================================================================

#[test]
fn test_index_skips_whole_references() {
    let with_index = run_with("chr(2) & !duplicate?", &CompileOptions::default(), true);
    let without = run_with("chr(2) & !duplicate?", &CompileOptions::default(), false);
    assert_eq!(with_index.accepted, without.accepted);
    assert_eq!(with_index.summary.skipped_references, 2);
    assert_eq!(with_index.summary.accepted + with_index.summary.rejected, 3);
}

#[test]
fn test_index_is_sound_under_negation() {
    assert_eq!(index_verdicts("!chr(1)"), vec![false, true, true]);
    assert_eq!(index_verdicts("!(chr(1) & duplicate?)"), vec![true, true, true]);
    assert_eq!(index_verdicts("chr(1) | duplicate?"), vec![true, true, true]);
}

#[test]
fn test_index_without_chromosomes_accepts_everything() {
    assert_eq!(index_verdicts("duplicate?"), vec![true, true, true]);
}

// ============================================================================
// BED Files
// ============================================================================

#[test]
fn test_bed_restricts_to_intervals() {
    let path = temp_bed("two", "chr1\t99\t105\nchr12\t2004\t2010\n");
    let options = CompileOptions {
        bed: Some(path.clone()),
        ..CompileOptions::default()
    };
    let run = run_with("true", &options, true);
    fs::remove_file(&path).unwrap();
    assert_eq!(run.accepted, names(&["A", "D"]));
    assert_eq!(run.summary.skipped_references, 1);
}

#[test]
fn test_bed_combines_with_query() {
    let path = temp_bed("combined", "1\t0\t20000\n");
    let options = CompileOptions {
        bed: Some(path.clone()),
        ..CompileOptions::default()
    };
    let run = run_with("!duplicate?", &options, false);
    fs::remove_file(&path).unwrap();
    assert_eq!(run.accepted, names(&["A", "G"]));
}

#[test]
fn test_missing_bed_file() {
    let options = CompileOptions {
        bed: Some(PathBuf::from("/nonexistent/readql.bed")),
        ..CompileOptions::default()
    };
    let err = readql::compile("true", &options).unwrap_err();
    assert!(matches!(err, readql::CompileError::Bed(_)));
}

// ============================================================================
// Canonical Text
// ============================================================================

/// One query per built-in, keyed by the built-in it exercises.
const BUILTIN_QUERIES: &[(&str, &str)] = &[
    ("chr", "chr(1*)"),
    ("mate_chr", "mate_chr(1)"),
    ("chr_name", "chr_name ~ /^1/"),
    ("mate_chr_name", "mate_chr_name == \"1\""),
    ("paired?", "paired?"),
    ("proper_pair?", "proper_pair?"),
    ("unmapped?", "unmapped?"),
    ("mate_unmapped?", "mate_unmapped?"),
    ("mapped_to_reverse?", "mapped_to_reverse?"),
    ("mate_mapped_to_reverse?", "mate_mapped_to_reverse?"),
    ("read1?", "read1?"),
    ("read2?", "read2?"),
    ("secondary?", "secondary?"),
    ("failed_qc?", "failed_qc?"),
    ("duplicate?", "duplicate?"),
    ("supplementary?", "supplementary?"),
    ("raw_flag", "raw_flag(3)"),
    ("before", "before(1000)"),
    ("after", "after(500)"),
    ("position", "position(100, 2000)"),
    ("begin", "begin > 200"),
    ("end", "end < 10010"),
    ("mapping_quality", "mapping_quality(20)"),
    ("nt", "nt(100, R)"),
    ("nt_exact", "nt_exact(101, C)"),
    ("split_pair?", "split_pair?"),
    ("random", "random(1.0)"),
    ("read_group", "read_group(grp*)"),
    ("aux_str", "aux_str(RG) == \"grpA\""),
    ("aux_int", "aux_int(NM) <= 1"),
    ("aux_dbl", "aux_dbl(XS) < 0.5"),
    ("header", "header ~ /grpB/"),
    ("true", "true"),
    ("false", "false | chr(2)"),
    ("min", "min(begin, 150) == begin"),
    ("max", "max(end, 0) > 300"),
    ("all", "all x = 1, 2 in x > 0 & chr(1)"),
    ("any", "any g = \"grpA\", \"grpB\" in read_group(grpA) | chr_name == g"),
    ("bind", "bind chr_name using /(?P<n_i>[0-9]+)/ in n_i > 1"),
];

#[test]
fn test_every_builtin_has_a_canonical_sample() {
    for name in readql::predicates::NAMES {
        assert!(
            BUILTIN_QUERIES.iter().any(|(builtin, _)| builtin == name),
            "no sample query for `{}`",
            name
        );
    }
}

#[test]
fn test_canonical_text_parses_to_the_same_query() {
    for (builtin, query) in BUILTIN_QUERIES {
        let canonical = readql::parse(query)
            .unwrap_or_else(|e| panic!("{}: {}", query, e))
            .to_string();
        let reparsed = readql::parse(&canonical)
            .unwrap_or_else(|e| panic!("`{}` prints as `{}`, which does not parse: {}", builtin, canonical, e));
        assert_eq!(reparsed.to_string(), canonical, "{}", builtin);

        let original = run(query);
        let again = run(&canonical);
        assert_eq!(original.accepted, again.accepted, "{} vs {}", query, canonical);
        assert_eq!(original.errors.len(), again.errors.len(), "{} vs {}", query, canonical);
    }
}

#[test]
fn test_builtins_print_as_written() {
    let canonical = |query: &str| readql::parse(query).unwrap().to_string();
    assert_eq!(canonical("duplicate?"), "duplicate?");
    assert_eq!(canonical("mapping_quality(30)"), "mapping_quality(30)");
    assert_eq!(canonical("position(1, 10)"), "position(1, 10)");
    assert_eq!(canonical("nt_exact(5,a)"), "nt_exact(5, a)");
    assert_eq!(canonical("raw_flag( 3 )"), "raw_flag(3)");
}
