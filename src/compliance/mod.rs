//! ACGME compliance checking and reporting

pub mod reports;
pub mod validator;

pub use reports::{
    ComplianceReportData, ComplianceReportGenerator, ReportFilters, ResidentComplianceSummary,
};
pub use validator::{
    ComplianceOptions, ComplianceReport, ComplianceValidator, RuleType, Severity, Violation,
};
