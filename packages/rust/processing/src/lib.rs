//! In-memory processing stages for collected job records.
//!
//! - [`validator`]: quality gate with machine-readable reject reasons
//! - [`dedup`]: exact-id, fingerprint, and fuzzy duplicate detection
//! - [`features`]: experience, seniority, work mode, skills, and role
//!
//! Every stage is a pure function over a batch; nothing here touches the
//! network or the database.

pub mod dedup;
pub mod features;
pub mod validator;

pub use dedup::{DedupReport, NearDuplicate, dedupe, dedupe_against_known, fingerprint};
pub use features::{extract, extract_batch};
pub use validator::{RejectReason, Rejection, ValidationReport, validate, validate_batch};
