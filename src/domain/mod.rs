//! Domain entities for the scheduling core

pub mod absence;
pub mod assignment;
pub mod block;
pub mod import;
pub mod person;
pub mod procedure;
pub mod rotation;
pub mod subscription;
pub mod swap;
pub mod webhook;

pub use absence::{Absence, AbsenceKind};
pub use assignment::{Assignment, AssignmentRole};
pub use block::{Block, TimeOfDay};
pub use import::{
    ConflictKind, ConflictResolution, ImportBatch, ImportBatchStatus, ImportStagedAssignment,
    StagedAssignmentStatus,
};
pub use person::{FacultyProfile, FacultyRole, Person, PersonKind};
pub use procedure::Procedure;
pub use rotation::RotationTemplate;
pub use subscription::CalendarSubscription;
pub use swap::{SwapRecord, SwapStatus};
pub use webhook::{WebhookDelivery, WebhookEndpoint};
