// tests/lexer_tests.rs

use readql::lexer::{NumberLiteral, ParseState, is_glob_char, nucleotide_mask};

// ============================================================================
// Whitespace and Punctuation
// ============================================================================

#[test]
fn test_skip_space_and_comments() {
    let mut state = ParseState::new("  # a comment\n\t chr");
    state.skip_space();
    assert_eq!(state.peek(), Some('c'));
    assert_eq!(state.location().line, 2);
    assert_eq!(state.location().column, 3);
}

#[test]
fn test_consume_char_in_space() {
    let mut state = ParseState::new(" ( x");
    assert!(state.consume_char('('));
    assert_eq!(state.peek(), Some('x'));
    assert!(!state.consume_char(')'));
    assert_eq!(state.peek(), Some('x'));
}

#[test]
fn test_required_char_reports_position() {
    let mut state = ParseState::new("abc");
    let err = state.parse_char_in_space('(').unwrap_err();
    assert_eq!((err.line, err.column), (1, 1));
    assert_eq!(err.message, "expected `(`");
}

#[test]
fn test_consume_str() {
    let mut state = ParseState::new("-> b");
    assert!(state.consume_str("->"));
    assert_eq!(state.peek(), Some('b'));
}

// ============================================================================
// Keywords and Names
// ============================================================================

#[test]
fn test_keyword_must_be_whole_token() {
    let mut state = ParseState::new("inside");
    assert!(!state.parse_keyword("in"));
    assert_eq!(state.offset(), 0);

    let mut state = ParseState::new("in x");
    assert!(state.parse_keyword("in"));
    assert_eq!(state.peek(), Some('x'));
}

#[test]
fn test_name_with_question_mark() {
    let mut state = ParseState::new("duplicate? & x");
    assert_eq!(state.parse_name(), Some("duplicate?"));

    let mut state = ParseState::new("mapping_quality(3)");
    assert_eq!(state.parse_name(), Some("mapping_quality"));
    assert_eq!(state.peek(), Some('('));
}

#[test]
fn test_glob_characters() {
    for c in ['a', 'Z', '0', '_', '*', '?', '.', '-', '+', ':', '|'] {
        assert!(is_glob_char(c), "{:?} should be a glob character", c);
    }
    for c in [' ', '(', ')', ',', '/', '&'] {
        assert!(!is_glob_char(c), "{:?} should not be a glob character", c);
    }
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn test_numbers() {
    let test_cases = vec![
        ("42", NumberLiteral::Int(42)),
        ("-7", NumberLiteral::Int(-7)),
        ("1.5", NumberLiteral::Float(1.5)),
        ("-0.25", NumberLiteral::Float(-0.25)),
        ("1e-3", NumberLiteral::Float(0.001)),
        ("2E2", NumberLiteral::Float(200.0)),
    ];

    for (input, expected) in test_cases {
        let mut state = ParseState::new(input);
        assert_eq!(state.parse_number().unwrap(), expected, "Failed for input: {}", input);
        assert!(state.at_end(), "Trailing input for: {}", input);
    }
}

#[test]
fn test_integer_stops_at_dot_without_digits() {
    let mut state = ParseState::new("3.x");
    assert_eq!(state.parse_number().unwrap(), NumberLiteral::Int(3));
    assert_eq!(state.peek(), Some('.'));
}

#[test]
fn test_parse_int_rejects_words() {
    let mut state = ParseState::new("ten");
    let err = state.parse_int().unwrap_err();
    assert_eq!(err.message, "expected integer");
}

#[test]
fn test_starts_number() {
    assert!(ParseState::new("12").starts_number());
    assert!(ParseState::new("-1").starts_number());
    assert!(!ParseState::new("-x").starts_number());
    assert!(!ParseState::new("x1").starts_number());
}

// ============================================================================
// Strings and Characters
// ============================================================================

#[test]
fn test_string_escapes() {
    let mut state = ParseState::new(r#""a\"b\\c\n\td""#);
    assert_eq!(state.parse_string_literal().unwrap(), "a\"b\\c\n\td");
    assert!(state.at_end());
}

#[test]
fn test_unterminated_string() {
    let mut state = ParseState::new("  \"abc");
    let err = state.parse_string_literal().unwrap_err();
    assert_eq!(err.message, "unterminated string literal");
    assert_eq!(err.column, 3);
}

#[test]
fn test_invalid_escape() {
    let mut state = ParseState::new(r#""\q""#);
    let err = state.parse_string_literal().unwrap_err();
    assert_eq!(err.message, "invalid escape sequence `\\q`");
}

#[test]
fn test_char_literal() {
    let mut state = ParseState::new("'A");
    assert_eq!(state.parse_char_literal().unwrap(), 65);
    assert!(ParseState::new("' ").parse_char_literal().is_err());
}

// ============================================================================
// Regular Expressions
// ============================================================================

#[test]
fn test_regex_with_flag() {
    let mut state = ParseState::new("/chr[0-9]+/i");
    let spec = state.parse_regex().unwrap();
    assert_eq!(spec.source, "chr[0-9]+");
    assert!(spec.case_insensitive);
    assert!(state.at_end());
}

#[test]
fn test_regex_escaped_slash() {
    let mut state = ParseState::new(r"/a\/b/ in");
    let spec = state.parse_regex().unwrap();
    assert_eq!(spec.source, "a/b");
    assert!(!spec.case_insensitive);
}

#[test]
fn test_regex_i_prefix_of_word_is_not_a_flag() {
    let mut state = ParseState::new("/x/in");
    let spec = state.parse_regex().unwrap();
    assert!(!spec.case_insensitive);
    assert_eq!(state.peek(), Some('i'));
}

#[test]
fn test_invalid_regex_is_a_parse_error() {
    let mut state = ParseState::new("/(/");
    let err = state.parse_regex().unwrap_err();
    assert!(err.message.starts_with("invalid regular expression"));
}

#[test]
fn test_unterminated_regex() {
    let mut state = ParseState::new("/abc");
    assert_eq!(state.parse_regex().unwrap_err().message, "unterminated regular expression");
}

// ============================================================================
// Nucleotides
// ============================================================================

#[test]
fn test_nucleotide_masks() {
    assert_eq!(nucleotide_mask('A'), 1);
    assert_eq!(nucleotide_mask('c'), 2);
    assert_eq!(nucleotide_mask('G'), 4);
    assert_eq!(nucleotide_mask('T'), 8);
    assert_eq!(nucleotide_mask('U'), 8);
    assert_eq!(nucleotide_mask('N'), 15);
    assert_eq!(nucleotide_mask('R'), nucleotide_mask('A') | nucleotide_mask('G'));
    assert_eq!(nucleotide_mask('Y'), nucleotide_mask('C') | nucleotide_mask('T'));
    assert_eq!(nucleotide_mask('X'), 0);
    assert_eq!(nucleotide_mask('-'), 0);
}

#[test]
fn test_parse_nt() {
    let mut state = ParseState::new("  g");
    assert_eq!(state.parse_nt().unwrap(), 4);
    assert!(ParseState::new("5").parse_nt().is_err());
}
