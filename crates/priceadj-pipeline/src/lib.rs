//! The price adjustment processor: record/notifier seams, the five pipeline
//! stages, reports, franchisee snapshots and run orchestration.

pub mod clock;
pub mod commit;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod financial;
pub mod ledger;
pub mod memory;
pub mod notice;
pub mod notifier;
pub mod outcome;
pub mod reconcile;
pub mod report;
pub mod revalidate;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod work_item;

pub use clock::{Clock, FixedClock, SystemClock};
pub use commit::{commit_customer, CommitOutcome};
pub use discovery::{discover, due_sessions, Discovery, TriggerWindows};
pub use dispatch::{classify, dispatch, Action, DispatchDeps};
pub use error::{NotifyError, PipelineError, StoreError};
pub use financial::{refresh_pricing_lines, should_refresh};
pub use ledger::{ItemOutcome, RunItem, RunLedger, RunRecord, RunStatus};
pub use memory::{Fault, MemoryStore};
pub use notice::{build_notice, send_customer_notice};
pub use notifier::{
    Attachment, CustomerNotice, LoggingNotifier, Mail, MaintainerAlert, Notifier,
    RecordingNotifier, SentMessage,
};
pub use outcome::{ItemFailure, Stage};
pub use reconcile::{reconcile, Reconciliation};
pub use report::{
    build_run_report, build_weekly_report, franchisee_statuses, is_weekly_report_day,
    run_report_mail, weekly_report_mail, FranchiseeStatusRow, Sheet, Workbook,
};
pub use revalidate::revalidate;
pub use runner::{
    run_and_record, run_pipeline, PipelineContext, PipelineSettings, RecordedRun, RunSummary,
};
pub use snapshot::{build_franchisee_snapshot, prepare_rows};
pub use store::{RecordStore, SessionFilter};
pub use work_item::{CandidateService, CompletedItem, Phase, RevalidatedItem, Trigger, WorkItem};
