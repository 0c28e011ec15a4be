//! Drive a compiled filter over a stream of records.

use serde::Serialize;
use tracing::debug;

use crate::{
    engine::{FilterFn, IndexFn},
    record::{Header, Record},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub accepted: usize,
    pub rejected: usize,
    /// Runs of records skipped because the index ruled out their reference.
    pub skipped_references: usize,
    /// Error callback invocations.
    pub errors: usize,
}

pub struct Harness<'m> {
    filter: FilterFn<'m>,
    index: Option<IndexFn<'m>>,
}

impl<'m> Harness<'m> {
    pub fn new(filter: FilterFn<'m>) -> Self {
        Harness { filter, index: None }
    }

    /// Consult `index` once per reference before scanning its records.
    pub fn with_index(mut self, index: IndexFn<'m>) -> Self {
        self.index = Some(index);
        self
    }

    /// Run every record through the filter, handing each one and its verdict
    /// to `sink` and every error message to `report`.
    ///
    /// Records are taken in order; consecutive records with the same
    /// reference id form one run. Runs on a reference the index rejects never
    /// reach the filter or the sink.
    pub fn run<'r>(
        &self,
        header: &Header,
        records: impl IntoIterator<Item = &'r Record>,
        sink: &mut dyn FnMut(&'r Record, bool),
        report: &mut dyn FnMut(&str),
    ) -> Summary {
        let mut summary = Summary::default();
        let mut errors = 0;
        let mut counting = |message: &str| {
            errors += 1;
            report(message);
        };
        let mut current: Option<(i32, bool)> = None;

        for record in records {
            let included = match current {
                Some((ref_id, included)) if ref_id == record.ref_id => included,
                _ => {
                    let included = match (&self.index, u32::try_from(record.ref_id)) {
                        (Some(index), Ok(ref_id)) => index.call(header, ref_id, &mut counting),
                        _ => true,
                    };
                    if !included {
                        summary.skipped_references += 1;
                        debug!(ref_id = record.ref_id, "reference skipped by index");
                    }
                    current = Some((record.ref_id, included));
                    included
                }
            };
            if !included {
                continue;
            }
            let accepted = self.filter.call(header, record, &mut counting);
            if accepted {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
            sink(record, accepted);
        }
        summary.errors = errors;
        summary
    }
}
