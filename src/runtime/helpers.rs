//! Interpreter implementations of the runtime helpers.
//!
//! Arguments arrive in declaration order; see the `HelperDecl` statics in the
//! parent module for each signature.

use std::{cmp::Ordering, sync::Arc};

use rand::Rng;
use regex::Regex;
use tracing::trace;

use crate::{
    ast::{CaptureKind, RegexSpec},
    engine::{HelperCtx, HelperFn, RtValue},
    lexer::nucleotide_mask,
    record::{AuxValue, CigarKind, Record},
};

pub fn lookup(name: &str) -> Option<HelperFn> {
    let helper: HelperFn = match name {
        "read_flag" => read_flag,
        "read_mapq" => read_mapq,
        "check_before" => check_before,
        "check_after" => check_after,
        "check_position" => check_position,
        "read_begin" => read_begin,
        "read_end" => read_end,
        "check_chromosome" => check_chromosome,
        "check_mate_chromosome" => check_mate_chromosome,
        "check_chromosome_id" => check_chromosome_id,
        "chromosome_name" => chromosome_name,
        "mate_chromosome_name" => mate_chromosome_name,
        "check_nt" => check_nt,
        "check_split_pair" => check_split_pair,
        "randomly" => randomly,
        "check_read_group" => check_read_group,
        "aux_int" => aux_int,
        "aux_dbl" => aux_dbl,
        "aux_str" => aux_str,
        "header_text" => header_text,
        "re_compile" => re_compile,
        "re_free" => re_free,
        "re_match" => re_match,
        "re_bind" => re_bind,
        "str_compare" => str_compare,
        _ => return None,
    };
    Some(helper)
}

fn read_flag<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    RtValue::Int(args[0].as_record().flag as i64)
}

fn read_mapq<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    RtValue::Int(args[0].as_record().mapq as i64)
}

fn check_before<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    RtValue::Bool(record.is_mapped() && record.pos < args[1].as_int())
}

fn check_after<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    RtValue::Bool(record.is_mapped() && record.end() > args[1].as_int())
}

fn check_position<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    let (start, end) = (args[1].as_int(), args[2].as_int());
    RtValue::Bool(record.is_mapped() && record.pos <= end && record.end() >= start)
}

fn read_begin<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    if !record.is_mapped() {
        return RtValue::Bool(false);
    }
    ctx.store(&args[1], RtValue::Int(record.pos));
    RtValue::Bool(true)
}

fn read_end<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    if !record.is_mapped() {
        return RtValue::Bool(false);
    }
    ctx.store(&args[1], RtValue::Int(record.end()));
    RtValue::Bool(true)
}

fn reference_matches(args: &[RtValue<'_>], id: i64, pattern: &RtValue<'_>) -> bool {
    args[1]
        .as_header()
        .reference_name(id)
        .is_some_and(|name| pattern.as_pattern().is_match(name))
}

fn check_chromosome<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let id = args[0].as_record().ref_id as i64;
    RtValue::Bool(reference_matches(args, id, &args[2]))
}

fn check_mate_chromosome<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let id = args[0].as_record().mate_ref_id as i64;
    RtValue::Bool(reference_matches(args, id, &args[2]))
}

fn check_chromosome_id<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let matched = args[0]
        .as_header()
        .reference_name(args[1].as_int())
        .is_some_and(|name| args[2].as_pattern().is_match(name));
    RtValue::Bool(matched)
}

fn name_of<'a>(args: &[RtValue<'a>], id: i32) -> RtValue<'a> {
    RtValue::Str(
        args[1]
            .as_header()
            .reference_name(id as i64)
            .map(Arc::from),
    )
}

fn chromosome_name<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    name_of(args, args[0].as_record().ref_id)
}

fn mate_chromosome_name<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    name_of(args, args[0].as_record().mate_ref_id)
}

/// Base of `record` aligned to 1-based reference `position`, if an
/// `M`/`=`/`X` operation covers it.
fn base_at(record: &Record, position: i64) -> Option<char> {
    if !record.is_mapped() {
        return None;
    }
    let ops = record.cigar_ops().ok()?;
    let mut reference = record.pos;
    let mut query = 0usize;
    for op in ops {
        let len = op.len as i64;
        if op.kind.consumes_reference() && position < reference + len {
            if position < reference {
                return None;
            }
            return match op.kind {
                CigarKind::Match | CigarKind::Equal | CigarKind::Diff => {
                    record.seq.chars().nth(query + (position - reference) as usize)
                }
                _ => None,
            };
        }
        if op.kind.consumes_reference() {
            reference += len;
        }
        if op.kind.consumes_query() {
            query += op.len as usize;
        }
    }
    None
}

fn check_nt<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let record = args[0].as_record();
    let (position, mask, exact) = (args[1].as_int(), args[2].as_int(), args[3].as_bool());
    let matched = base_at(record, position).is_some_and(|base| {
        let base = nucleotide_mask(base) as i64;
        if exact { base == mask } else { base & mask != 0 }
    });
    RtValue::Bool(matched)
}

fn check_split_pair<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    use crate::record::flags;
    let record = args[0].as_record();
    RtValue::Bool(
        record.has_flag(flags::PAIRED)
            && record.is_mapped()
            && !record.has_flag(flags::MATE_UNMAPPED)
            && record.mate_ref_id >= 0
            && record.mate_ref_id != record.ref_id,
    )
}

fn randomly<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    RtValue::Bool(rand::thread_rng().r#gen::<f64>() < args[0].as_float())
}

fn check_read_group<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let matched = match args[0].as_record().aux.get("RG") {
        Some(AuxValue::Str(group)) => args[1].as_pattern().is_match(group),
        _ => false,
    };
    RtValue::Bool(matched)
}

fn aux_field<'r>(record: &'r Record, first: &RtValue<'_>, second: &RtValue<'_>) -> Option<&'r AuxValue> {
    let tag: String = [first.as_int(), second.as_int()]
        .iter()
        .filter_map(|c| u32::try_from(*c).ok().and_then(char::from_u32))
        .collect();
    record.aux.get(&tag)
}

fn aux_int<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    match aux_field(args[0].as_record(), &args[1], &args[2]) {
        Some(AuxValue::Int(n)) => {
            ctx.store(&args[3], RtValue::Int(*n));
            RtValue::Bool(true)
        }
        _ => RtValue::Bool(false),
    }
}

fn aux_dbl<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    match aux_field(args[0].as_record(), &args[1], &args[2]) {
        Some(AuxValue::Float(n)) => {
            ctx.store(&args[3], RtValue::Float(*n));
            RtValue::Bool(true)
        }
        _ => RtValue::Bool(false),
    }
}

fn aux_str<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    match aux_field(args[0].as_record(), &args[1], &args[2]) {
        Some(AuxValue::Str(s)) => RtValue::string(s),
        _ => RtValue::Str(None),
    }
}

fn header_text<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    RtValue::string(&args[0].as_header().text)
}

fn re_compile<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let source = args[0].as_str().unwrap_or("");
    let spec = RegexSpec::new(source, args[1].as_bool());
    match spec.compile() {
        Ok(re) => RtValue::Pattern(Arc::new(re)),
        Err(e) => {
            ctx.report(&format!("cannot compile {}: {}", spec, e));
            RtValue::Pattern(Arc::new(never_matches()))
        }
    }
}

fn never_matches() -> Regex {
    Regex::new(r"[^\s\S]").unwrap_or_else(|_| unreachable!())
}

fn re_free<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    trace!(pattern = args[0].as_pattern().as_str(), "pattern released");
    RtValue::Void
}

fn re_match<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let matched = args[1]
        .as_str()
        .is_some_and(|s| args[0].as_pattern().is_match(s));
    RtValue::Bool(matched)
}

/// Decode one named group. `None` if the text does not fit the kind.
fn decode_capture<'a>(kind: CaptureKind, text: &str) -> Option<RtValue<'a>> {
    match kind {
        CaptureKind::Str => Some(RtValue::string(text)),
        CaptureKind::Int => text.trim().parse().ok().map(RtValue::Int),
        CaptureKind::Float => text.trim().parse().ok().map(RtValue::Float),
        CaptureKind::Char => text.chars().next().map(|c| RtValue::Int(c as i64)),
    }
}

/// `re_bind(pattern, input, error_fn, error_ctx, count, [kind, name, slot, message]*)`
///
/// No match is a plain `false`. A match whose named group did not
/// participate or does not decode reports that capture's message and also
/// yields `false`.
fn re_bind<'a>(ctx: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let Some(input) = args[1].as_str() else {
        return RtValue::Bool(false);
    };
    let Some(captures) = args[0].as_pattern().captures(input) else {
        return RtValue::Bool(false);
    };
    let count = args[4].as_int() as usize;
    for capture in args[5..].chunks(4).take(count) {
        let kind = CaptureKind::from_code(capture[0].as_int()).unwrap_or(CaptureKind::Str);
        let name = capture[1].as_str().unwrap_or("");
        let decoded = captures
            .name(name)
            .and_then(|m| decode_capture(kind, m.as_str()));
        match decoded {
            Some(value) => ctx.store(&capture[2], value),
            None => {
                if let Some(message) = capture[3].as_str() {
                    ctx.report(message);
                }
                return RtValue::Bool(false);
            }
        }
    }
    RtValue::Bool(true)
}

fn str_compare<'a>(_: &mut HelperCtx<'_, 'a>, args: &[RtValue<'a>]) -> RtValue<'a> {
    let ordering = args[0].as_str().cmp(&args[1].as_str());
    RtValue::Int(match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Header;

    fn base(record: &Record, position: i64) -> Option<char> {
        base_at(record, position)
    }

    #[test]
    fn test_base_at_all_match() {
        let record = Record::mapped("r", 0, 100, "ACGT");
        assert_eq!(base(&record, 100), Some('A'));
        assert_eq!(base(&record, 103), Some('T'));
        assert_eq!(base(&record, 104), None);
        assert_eq!(base(&record, 99), None);
    }

    #[test]
    fn test_base_at_skips_clips_and_deletions() {
        let mut record = Record::mapped("r", 0, 10, "NNACGT");
        record.cigar = "2S2M1D2M".to_string();
        assert_eq!(base(&record, 10), Some('A'));
        assert_eq!(base(&record, 11), Some('C'));
        assert_eq!(base(&record, 12), None);
        assert_eq!(base(&record, 13), Some('G'));
    }

    #[test]
    fn test_base_at_insertion() {
        let mut record = Record::mapped("r", 0, 1, "AATTC");
        record.cigar = "2M2I1M".to_string();
        assert_eq!(base(&record, 3), Some('C'));
    }

    #[test]
    fn test_decode_capture() {
        assert!(matches!(decode_capture(CaptureKind::Int, "42"), Some(RtValue::Int(42))));
        assert!(decode_capture(CaptureKind::Int, "4x").is_none());
        assert!(matches!(decode_capture(CaptureKind::Char, "A"), Some(RtValue::Int(65))));
        assert!(decode_capture(CaptureKind::Char, "").is_none());
    }

    #[test]
    fn test_reference_helpers() {
        let header = Header::new(["chr1", "2"]);
        let record = Record::mapped("r", 1, 5, "A");
        let pattern = RtValue::Pattern(Arc::new(Regex::new("^(chr)?(2)$").unwrap()));
        let args = [RtValue::Record(&record), RtValue::Header(&header), pattern];
        assert!(reference_matches(&args, 1, &args[2]));
        assert!(!reference_matches(&args, 0, &args[2]));
        assert!(!reference_matches(&args, -1, &args[2]));
    }
}
