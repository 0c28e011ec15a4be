//! In-memory model of alignment records and their container header.
//!
//! The compiled filter functions only ever see these through the runtime
//! helpers, so this is the single place that knows how flags, CIGAR strings
//! and auxiliary fields are laid out. Positions are 1-based, matching the
//! textual alignment format; a reference id of `-1` means "no reference".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record flag bits.
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const READ1: u16 = 0x40;
    pub const READ2: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const FAILED_QC: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    #[serde(default)]
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Free-form header text (`@HD`, `@RG`, ... lines).
    #[serde(default)]
    pub text: String,
}

impl Header {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Header {
            references: names
                .into_iter()
                .map(|name| Reference {
                    name: name.into(),
                    length: 0,
                })
                .collect(),
            text: String::new(),
        }
    }

    /// Name of reference `id`, or `None` for negative or out-of-range ids.
    pub fn reference_name(&self, id: i64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.references.get(i))
            .map(|r| r.name.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid CIGAR `{cigar}`: {reason}")]
    Cigar { cigar: String, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Padding,
    Equal,
    Diff,
}

impl CigarKind {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'M' => CigarKind::Match,
            'I' => CigarKind::Insertion,
            'D' => CigarKind::Deletion,
            'N' => CigarKind::Skip,
            'S' => CigarKind::SoftClip,
            'H' => CigarKind::HardClip,
            'P' => CigarKind::Padding,
            '=' => CigarKind::Equal,
            'X' => CigarKind::Diff,
            _ => return None,
        })
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarKind::Match
                | CigarKind::Deletion
                | CigarKind::Skip
                | CigarKind::Equal
                | CigarKind::Diff
        )
    }

    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarKind::Match
                | CigarKind::Insertion
                | CigarKind::SoftClip
                | CigarKind::Equal
                | CigarKind::Diff
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

/// Typed value of an auxiliary field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxValue {
    Int(i64),
    Float(f64),
    Str(String),
}

fn no_reference() -> i32 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub flag: u16,
    #[serde(default = "no_reference")]
    pub ref_id: i32,
    /// 1-based leftmost mapped position.
    #[serde(default)]
    pub pos: i64,
    #[serde(default)]
    pub mapq: u8,
    #[serde(default)]
    pub cigar: String,
    #[serde(default)]
    pub seq: String,
    #[serde(default = "no_reference")]
    pub mate_ref_id: i32,
    #[serde(default)]
    pub mate_pos: i64,
    /// Auxiliary fields keyed by their two-character tag.
    #[serde(default)]
    pub aux: BTreeMap<String, AuxValue>,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            name: String::new(),
            flag: flags::UNMAPPED,
            ref_id: -1,
            pos: 0,
            mapq: 0,
            cigar: String::new(),
            seq: String::new(),
            mate_ref_id: -1,
            mate_pos: 0,
            aux: BTreeMap::new(),
        }
    }
}

impl Record {
    /// A mapped, unpaired record with an all-match CIGAR covering `seq`.
    pub fn mapped(name: &str, ref_id: i32, pos: i64, seq: &str) -> Self {
        Record {
            name: name.to_string(),
            flag: 0,
            ref_id,
            pos,
            mapq: 60,
            cigar: format!("{}M", seq.len()),
            seq: seq.to_string(),
            ..Record::default()
        }
    }

    pub fn has_flag(&self, mask: u16) -> bool {
        self.flag & mask == mask
    }

    pub fn is_mapped(&self) -> bool {
        self.ref_id >= 0 && !self.has_flag(flags::UNMAPPED)
    }

    pub fn cigar_ops(&self) -> Result<Vec<CigarOp>, RecordError> {
        let error = |reason| RecordError::Cigar {
            cigar: self.cigar.clone(),
            reason,
        };
        let mut ops = Vec::new();
        let mut len: Option<u32> = None;
        for c in self.cigar.chars() {
            if let Some(d) = c.to_digit(10) {
                let current = len.unwrap_or(0);
                len = Some(
                    current
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(d))
                        .ok_or_else(|| error("operation length overflows"))?,
                );
            } else {
                let kind = CigarKind::from_char(c).ok_or_else(|| error("unknown operation"))?;
                let len = len.take().ok_or_else(|| error("operation without length"))?;
                ops.push(CigarOp { kind, len });
            }
        }
        if len.is_some() {
            return Err(error("trailing length without operation"));
        }
        Ok(ops)
    }

    /// Number of reference bases covered by the alignment.
    pub fn reference_length(&self) -> i64 {
        self.cigar_ops()
            .map(|ops| {
                ops.iter()
                    .filter(|op| op.kind.consumes_reference())
                    .map(|op| op.len as i64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// 1-based inclusive end of the alignment; equal to `pos` when the
    /// CIGAR covers no reference bases.
    pub fn end(&self) -> i64 {
        self.pos + (self.reference_length() - 1).max(0)
    }
}
