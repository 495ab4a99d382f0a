// Domain models: raw Prometheus series and flattened summaries

mod series;
mod summary;

pub use series::{Labels, RawSeries, Sample};
pub use summary::{
    AggregatedSummary, HistoryEntry, SummaryMap, SummaryReport, SummaryValue, TemplateFailure,
    ZERO,
};
