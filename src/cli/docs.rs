//! Documentation content for the readql CLI

use super::CliError;

/// Available documentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Syntax,
    Flags,
    Positions,
    Sequence,
    Fields,
    Values,
    Constructs,
    Errors,
}

impl DocCategory {
    pub const ALL: [DocCategory; 8] = [
        DocCategory::Syntax,
        DocCategory::Flags,
        DocCategory::Positions,
        DocCategory::Sequence,
        DocCategory::Fields,
        DocCategory::Values,
        DocCategory::Constructs,
        DocCategory::Errors,
    ];

    /// Parse category name from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "syntax" | "operators" | "ops" => Some(Self::Syntax),
            "flags" | "flag" => Some(Self::Flags),
            "positions" | "position" | "chromosomes" | "chr" => Some(Self::Positions),
            "sequence" | "nt" | "bases" => Some(Self::Sequence),
            "fields" | "aux" | "names" | "header" => Some(Self::Fields),
            "values" | "types" | "literals" => Some(Self::Values),
            "constructs" | "let" | "bind" | "quantifiers" => Some(Self::Constructs),
            "errors" | "error" => Some(Self::Errors),
            _ => None,
        }
    }

    pub fn content(self) -> &'static str {
        match self {
            DocCategory::Syntax => SYNTAX_DOC,
            DocCategory::Flags => FLAGS_DOC,
            DocCategory::Positions => POSITIONS_DOC,
            DocCategory::Sequence => SEQUENCE_DOC,
            DocCategory::Fields => FIELDS_DOC,
            DocCategory::Values => VALUES_DOC,
            DocCategory::Constructs => CONSTRUCTS_DOC,
            DocCategory::Errors => ERRORS_DOC,
        }
    }
}

/// Get the docs overview (category listing)
pub fn get_docs_overview() -> &'static str {
    r#"READQL DOCUMENTATION

Readql is a query language for selecting sequencing reads. A query is a
predicate over one alignment record; it is compiled into a filter function
and, when it constrains chromosomes, a companion index function that rules
out whole references before their records are read.

DOCUMENTATION CATEGORIES

  syntax            Operators, precedence, grouping and comparisons
  flags             Predicates over the record flag bits
  positions         Chromosomes, coordinates and mapping quality
  sequence          Bases at reference positions
  fields            Read groups, auxiliary fields and header text
  values            Literals, value types and the min/max folds
  constructs        let, bind and the all/any quantifiers
  errors            Parse errors and runtime error messages

QUICK REFERENCE

  chr(1) & !duplicate?          Chromosome 1, not a duplicate
  position(1000, 2000)          Overlaps 1000..2000 (1-based, closed)
  mapping_quality(30)           MAPQ of at least 30
  aux_int(NM) <= 2              Auxiliary integer field
  chr_name ~ /^chr[0-9]+$/      Regular expression match

Run 'readql doc <category>' for detailed documentation.
"#
}

/// Get documentation for a specific category
pub fn get_doc_category(name: &str) -> Result<&'static str, CliError> {
    DocCategory::from_str(name)
        .map(DocCategory::content)
        .ok_or_else(|| CliError::UnknownCategory(name.to_string()))
}

const SYNTAX_DOC: &str = r#"SYNTAX - Operators and Precedence

LOGICAL OPERATORS (loosest first)
  let x = v in q        Local definitions
  c then a else b       Conditional
  a | b                 Or (stops at the first true operand)
  a ^ b                 Exclusive or
  a & b                 And (stops at the first false operand)
  a -> b                Implication, same as !a | b; left associative
  !a                    Not

  Example:
    chr(1) & (duplicate? | failed_qc?)
    paired? -> proper_pair?

GROUPING
  ( q )
    Parentheses override precedence. A parenthesized value may be compared:
      (paired? then begin else end) > 100

COMPARISONS
  ==  !=  <  <=  >  >=
    Both sides must have the same type. An integer literal next to a
    floating point value is widened.

    Example:
      begin >= 100
      aux_dbl(XS) < 0.5

REGULAR EXPRESSIONS
  value ~ /pattern/
  value ~ /pattern/i
    Matches a string value against a regular expression. The trailing `i`
    makes the match case insensitive. A missing string never matches.

    Example:
      chr_name ~ /^chr(X|Y)$/i

WHITESPACE
  Spaces, tabs and newlines may appear between any two tokens. `#` starts
  a comment that runs to the end of the line. Names that end in `?` are
  flags, not operators.
"#;

const FLAGS_DOC: &str = r#"FLAGS - Record Flag Bits

Each flag predicate is true when its bit is set.

  paired?                   0x1    Read is paired in sequencing
  proper_pair?              0x2    Mapped in a proper pair
  unmapped?                 0x4    Read is unmapped
  mate_unmapped?            0x8    Mate is unmapped
  mapped_to_reverse?        0x10   Read is on the reverse strand
  mate_mapped_to_reverse?   0x20   Mate is on the reverse strand
  read1?                    0x40   First in pair
  read2?                    0x80   Second in pair
  secondary?                0x100  Secondary alignment
  failed_qc?                0x200  Failed quality checks
  duplicate?                0x400  PCR or optical duplicate
  supplementary?            0x800  Supplementary alignment

RAW FLAGS
  raw_flag(mask)
    True when every bit of `mask` is set.

    Example:
      raw_flag(3)           Paired and in a proper pair

SPLIT PAIRS
  split_pair?
    Both mates are mapped, to different references.
"#;

const POSITIONS_DOC: &str = r#"POSITIONS - Chromosomes and Coordinates

CHROMOSOMES
  chr(glob)
  mate_chr(glob)
    True when the name of the (mate's) reference matches `glob`. `*` matches
    any run of characters and `?` a single one. A leading `chr` is ignored on
    both sides and matching is case insensitive, so chr(chrX) and chr(x) are
    the same. 23, 24 and 25 are read as X, Y and M; MT is the same as M.

    Example:
      chr(1*)               1, 10, 11, ... 19
      chr(X) | chr(Y)

    Constraints:
      - chr(...) is the only predicate the index function can decide on its
        own; every other predicate is treated as unknown there

  chr_name
  mate_chr_name
    The reference name as a string value.

COORDINATES
  Positions are 1-based and closed, as in the textual alignment format.

  before(n)                 Mapped and starting before n
  after(n)                  Mapped and ending after n
  position(start, end)      Mapped and overlapping start..end
  begin                     First mapped position (integer value)
  end                       Last mapped position (integer value)

    Example:
      position(10000, 10060)
      begin >= 100 & end <= 200

    Constraints:
      - begin and end report an error on unmapped reads

MAPPING QUALITY
  mapping_quality(q)
    MAPQ is at least q.
"#;

const SEQUENCE_DOC: &str = r#"SEQUENCE - Bases at Reference Positions

  nt(position, base)
    The read base aligned to the 1-based reference `position` is compatible
    with `base`. Bases are IUPAC codes, so nt(100, R) is true for A or G.

  nt_exact(position, base)
    The aligned base is exactly the same code as `base`.

    Example:
      nt(100, A) & !nt_exact(101, N)

    Constraints:
      - False when no match operation covers the position (deletions,
        skipped regions, positions outside the alignment)
"#;

const FIELDS_DOC: &str = r#"FIELDS - Read Groups, Auxiliary Fields and the Header

READ GROUP
  read_group(glob)
    The RG field matches `glob`, case insensitively.

AUXILIARY FIELDS
  aux_str(XX)               String field, compare with == or ~
  aux_int(XX)               Integer field
  aux_dbl(XX)               Floating point field
    Tags are exactly two characters.

    Example:
      aux_int(NM) <= 2
      aux_str(MD) ~ /^[0-9]+$/

    Constraints:
      - A missing integer or floating point field reports an error and the
        comparison sees 0 or NaN
      - A missing string field is absent: it is ordered before every string
        and never matches a regular expression

HEADER
  header
    The free-form header text as a string value.
"#;

const VALUES_DOC: &str = r#"VALUES - Literals, Types and Folds

TYPES
  bool      Predicates
  int       64-bit integers
  float     64-bit floating point
  str       Strings

LITERALS
  true  false               Bool constants
  42  -7                    Integers
  1.5  -0.25  1e-3          Floating point
  'A                        Character code as an integer
  "text"                    String; supports \n \t \r \" \\ escapes

FOLDS
  min(v, ...)
  max(v, ...)
    Smallest or largest of values of one ordered type (int, float or str).

    Example:
      max(begin, 100) < 200
"#;

const CONSTRUCTS_DOC: &str = r#"CONSTRUCTS - Definitions, Bindings and Quantifiers

LET
  let name = value in q
  let a = v1, b = v2 in q
    Each value is evaluated once, before q. A later definition may use the
    earlier ones.

    Example:
      let hq = mapping_quality(30) in hq & chr(1) | hq & chr(2)
      let lucky = random(0.1) in lucky | !lucky

RANDOM SAMPLING
  random(p)
    True with probability p, for 0 <= p <= 1.

BIND
  bind value using /re/ in q
    Matches a string value against a regular expression and makes each
    named group a value in q. The group name's suffix picks the type:
    `_i` int, `_d` float, `_c` single character (int), anything else str.
    False if the value does not match.

    Example:
      bind chr_name using /chr(?P<n_i>[0-9]+)/ in n_i < 10

QUANTIFIERS
  all x = v1, v2, ... in q
  any x = v1, v2, ... in q
    q must hold for every (some) listed literal. Literals share one type.

    Example:
      any g = "grpA", "grpB" in aux_str(RG) == g
      !(all x = 3, 4 in x == 3)
"#;

const ERRORS_DOC: &str = r#"ERRORS - Parse Errors and Runtime Messages

PARSE ERRORS
  Errors name the line and column and point at the offending text:

    error: 1:10: unknown predicate `bogus`
    chr(1) & bogus
             ^

RUNTIME ERRORS
  Some predicates cannot always produce a value: begin and end on unmapped
  reads, aux_int and aux_dbl on missing fields, regular expressions that do
  not compile. These report a message through the error callback, prefixed
  by the query location, and evaluation continues with a neutral value.
  `readql filter` prints the messages on stderr and counts them in the
  summary.

DEFINITIONS
  --define NAME=QUERY
    Makes NAME a predicate usable in the query. A definition that does not
    parse is rejected before the query is read.
"#;
