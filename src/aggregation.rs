// Cross-series summation and per-group reduction.
// Series in a group are summed per timestamp index, then reduced to
// min/avg/max/count (aggregate mode) or kept as the full trend (raw mode).

use std::collections::BTreeMap;

use crate::classifier::{GroupClassifier, GroupKey};
use crate::models::{AggregatedSummary, RawSeries};
use crate::units::UnitTransform;

#[derive(Debug, Clone, Copy)]
pub struct SeriesAggregator {
    aggregate: bool,
    transform: UnitTransform,
}

impl SeriesAggregator {
    pub fn new(aggregate: bool) -> Self {
        Self {
            aggregate,
            transform: UnitTransform::Identity,
        }
    }

    pub fn with_transform(self, transform: UnitTransform) -> Self {
        Self { transform, ..self }
    }

    /// Groups, sums and reduces `series`. Groups without samples are absent from the result.
    pub fn aggregate(
        &self,
        series: &[RawSeries],
        classifier: &dyn GroupClassifier,
    ) -> BTreeMap<GroupKey, AggregatedSummary> {
        let mut out = BTreeMap::new();
        for (group, members) in group_series(series, classifier) {
            let aligned = sum_aligned(&members);
            if aligned.skipped_samples > 0 {
                tracing::debug!(
                    group = %group,
                    series = members.len(),
                    skipped_samples = aligned.skipped_samples,
                    "series lengths differ; totals truncated to shortest"
                );
            }
            if let Some(summary) = self.summarize(&aligned.totals) {
                out.insert(group, summary);
            }
        }
        out
    }

    fn summarize(&self, totals: &[f64]) -> Option<AggregatedSummary> {
        let xform = self.transform;
        if self.aggregate {
            let (min, avg, max, count) = reduce(totals)?;
            Some(AggregatedSummary::Aggregate {
                min: xform.apply(min),
                avg: xform.apply(avg),
                max: xform.apply(max),
                count,
            })
        } else {
            if totals.is_empty() {
                return None;
            }
            Some(AggregatedSummary::Raw {
                values: totals.iter().map(|v| xform.apply(*v)).collect(),
            })
        }
    }
}

/// Buckets series by group key, dropping excluded series. Keeps input order within a group.
pub fn group_series<'a>(
    series: &'a [RawSeries],
    classifier: &dyn GroupClassifier,
) -> BTreeMap<GroupKey, Vec<&'a RawSeries>> {
    let mut by_group: BTreeMap<GroupKey, Vec<&RawSeries>> = BTreeMap::new();
    for s in series {
        let Some(group) = classifier.classify(&s.labels) else {
            continue;
        };
        by_group.entry(group).or_default().push(s);
    }
    by_group
}

/// Per-timestamp totals across a group and the number of tail samples left out.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTotals {
    pub totals: Vec<f64>,
    pub skipped_samples: usize,
}

/// Sums values index by index. The totals stop at the shortest series; tail
/// samples past that point are skipped, never zero-filled.
pub fn sum_aligned(series: &[&RawSeries]) -> AlignedTotals {
    let Some((first, rest)) = series.split_first() else {
        return AlignedTotals {
            totals: Vec::new(),
            skipped_samples: 0,
        };
    };

    let mut totals = first.values();
    let mut skipped_samples = 0;
    for s in rest {
        if s.len() < totals.len() {
            skipped_samples += totals.len() - s.len();
            totals.truncate(s.len());
        } else {
            skipped_samples += s.len() - totals.len();
        }
        for (total, sample) in totals.iter_mut().zip(&s.samples) {
            *total += sample.value;
        }
    }
    AlignedTotals {
        totals,
        skipped_samples,
    }
}

/// (min, avg, max, count) over the non-NaN values; `None` when none remain.
/// NaN marks a timestamp without data (e.g. a rate over no samples), so it is
/// left out of every statistic and of the count.
pub fn reduce(values: &[f64]) -> Option<(f64, f64, f64, usize)> {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return None;
    }
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = present.iter().sum::<f64>() / (present.len() as f64);
    Some((min, avg, max, present.len()))
}
