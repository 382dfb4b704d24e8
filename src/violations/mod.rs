mod aggregator;
mod enricher;
mod model;
mod reporter;
mod set;
mod summary;
mod sync;

pub use aggregator::{
    aggregate_violations, embedded_violations, fetch_assignment_violations, Aggregation,
    SourceReport,
};
pub use enricher::{submissions_with_violations, EnrichedSubmissions, SubmissionWithViolations};
pub use model::{
    decode_violations, timestamp, CompositeKey, NewViolation, Severity, Violation, ViolationType,
};
pub use reporter::{report_paths, report_violation, Persisted, Reported};
pub use set::ViolationSet;
pub use summary::{
    compute_summary, summarize_violations, RosterSize, SeverityCounts, SummarySource, TypeCounts,
    ViolationSummary,
};
pub use sync::{delete_violation, sync_outbox, SyncReport};
