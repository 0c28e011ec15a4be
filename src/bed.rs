//! Turn a BED interval file into a predicate.
//!
//! BED coordinates are 0-based and half-open; queries use 1-based closed
//! ranges, so `start end` becomes `position(start + 1, end)`. Intervals on the
//! same chromosome are OR-ed together and guarded by `chr(name)`; the
//! chromosomes are then OR-ed onto `false`, which is also the result for a
//! file without intervals.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use csv::{ReaderBuilder, StringRecord, Trim};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{Expr, strip_chr_prefix},
    lexer::is_glob_char,
    predicates,
};

#[derive(Debug, Error)]
pub enum BedError {
    #[error("cannot read BED file: {0}")]
    Io(#[from] io::Error),

    #[error("BED line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("BED line {line}: `{name}` is not a usable chromosome name")]
    BadChromosome { line: usize, name: String },
}

/// The three leading columns of a BED row; later columns are ignored.
#[derive(Debug, Deserialize)]
struct BedRow {
    chrom: String,
    start: i64,
    end: i64,
}

/// One interval, already converted to a 1-based closed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

fn csv_error(error: csv::Error) -> BedError {
    let line = error.position().map_or(0, |p| p.line() as usize);
    let message = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(e) => BedError::Io(e),
        _ => BedError::Malformed { line, message },
    }
}

/// Intervals grouped by chromosome (prefix stripped), in first-seen order.
///
/// Rows are tab separated. `#` comments, blank lines and `track`/`browser`
/// lines are skipped.
pub fn read_intervals(reader: impl Read) -> Result<Vec<(String, Vec<Interval>)>, BedError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut groups: Vec<(String, Vec<Interval>)> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let number = record.position().map_or(0, |p| p.line() as usize);
        let first = record.get(0).unwrap_or("");
        if first.starts_with("track") || first.starts_with("browser") {
            continue;
        }
        let malformed = |message: String| BedError::Malformed { line: number, message };

        if record.len() < 3 {
            return Err(malformed("expected chromosome, start and end".into()));
        }
        let leading: StringRecord = record.iter().take(3).collect();
        let row: BedRow = leading
            .deserialize(None)
            .map_err(|e| malformed(format!("bad interval: {}", e)))?;
        if row.start < 0 {
            return Err(malformed(format!("start {} is negative", row.start)));
        }
        if row.end < row.start {
            return Err(malformed(format!("end {} is before start {}", row.end, row.start)));
        }
        let start = row
            .start
            .checked_add(1)
            .ok_or_else(|| malformed(format!("start {} is out of range", row.start)))?;
        let interval = Interval { start, end: row.end };

        let name = strip_chr_prefix(&row.chrom);
        if !name.chars().all(|c| is_glob_char(c) && c != '*' && c != '?') {
            return Err(BedError::BadChromosome {
                line: number,
                name: row.chrom.clone(),
            });
        }
        let slot = *index.entry(name.to_string()).or_insert_with(|| {
            groups.push((name.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(interval);
    }
    Ok(groups)
}

/// The predicate accepting reads that overlap any interval.
pub fn intervals_to_expr(groups: &[(String, Vec<Interval>)]) -> Expr {
    groups.iter().fold(Expr::bool(false), |acc, (name, intervals)| {
        let ranges = intervals
            .iter()
            .map(|i| predicates::position(i.start, i.end))
            .collect();
        let term = Expr::and(vec![Expr::chromosome(name, false), Expr::or(ranges)]);
        Expr::or(vec![term, acc])
    })
}

pub fn read_bed(reader: impl Read) -> Result<Expr, BedError> {
    let groups = read_intervals(reader)?;
    debug!(
        chromosomes = groups.len(),
        intervals = groups.iter().map(|(_, i)| i.len()).sum::<usize>(),
        "BED file read"
    );
    Ok(intervals_to_expr(&groups))
}

pub fn load(path: &Path) -> Result<Expr, BedError> {
    read_bed(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Literal};

    #[test]
    fn test_grouping_strips_prefix() {
        let text = "chr1\t10\t20\n1\t30\t40\tname\t0\t+\nchrX\t5\t6\n";
        let groups = read_intervals(text.as_bytes()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "1");
        assert_eq!(groups[0].1, vec![Interval { start: 11, end: 20 }, Interval { start: 31, end: 40 }]);
        assert_eq!(groups[1].0, "X");
    }

    #[test]
    fn test_headers_and_comments_are_skipped() {
        let text = "track name=x\nbrowser position chr1\n# note\n\n2\t1\t2\n";
        let groups = read_intervals(text.as_bytes()).unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_malformed_line_reports_number() {
        let err = read_intervals("1\t1\t2\n1\tx\t4\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 2, .. }));
        let err = read_intervals("1\t5\t4\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 1, .. }));
        let err = read_intervals("1\t5\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 1, .. }));
        let err = read_intervals("1\t-5\t4\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_start_at_largest_coordinate_is_rejected() {
        let err = read_bed("1\t9223372036854775807\t9223372036854775807\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 1, .. }), "{}", err);
    }

    #[test]
    fn test_coordinates_beyond_integer_range_are_rejected() {
        let err = read_bed("1\t18446744073709551000\t18446744073709551610\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::Malformed { line: 1, .. }), "{}", err);
    }

    #[test]
    fn test_bad_chromosome_name() {
        let err = read_intervals("chr1/2\t0\t10\n".as_bytes()).unwrap_err();
        assert!(matches!(err, BedError::BadChromosome { line: 1, .. }));
    }

    #[test]
    fn test_empty_file_is_false() {
        let expr = read_bed("".as_bytes()).unwrap();
        assert_eq!(expr.as_constant(), Some(&Literal::Bool(false)));
    }

    #[test]
    fn test_shape() {
        let expr = read_bed("1\t0\t10\n".as_bytes()).unwrap();
        let ExprKind::Or(terms) = &expr.kind else {
            panic!("expected disjunction, got {}", expr);
        };
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[1].as_constant(), Some(&Literal::Bool(false)));
        assert_eq!(terms[0].to_string(), "(chr(1) & position(1, 10))");
    }
}
