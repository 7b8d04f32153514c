//! People: residents and faculty
//!
//! Persons are externally managed reference data; the core never mutates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Faculty role tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacultyRole {
    Pd,
    Apd,
    Oic,
    DeptChief,
    SportsMed,
    Core,
}

impl FacultyRole {
    /// Display label used by search facets and exports
    pub fn label(&self) -> &'static str {
        match self {
            FacultyRole::Pd => "Program Director",
            FacultyRole::Apd => "Associate Program Director",
            FacultyRole::Oic => "Officer in Charge",
            FacultyRole::DeptChief => "Department Chief",
            FacultyRole::SportsMed => "Sports Medicine",
            FacultyRole::Core => "Core Faculty",
        }
    }

    /// Key used by search facets and serialized payloads
    pub fn key(&self) -> &'static str {
        match self {
            FacultyRole::Pd => "pd",
            FacultyRole::Apd => "apd",
            FacultyRole::Oic => "oic",
            FacultyRole::DeptChief => "dept_chief",
            FacultyRole::SportsMed => "sports_med",
            FacultyRole::Core => "core",
        }
    }
}

/// Faculty-specific attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacultyProfile {
    pub role: Option<FacultyRole>,
    pub performs_procedures: bool,
    /// Specialty tags; `"Parent > Child"` values form facet hierarchies
    pub specialties: Vec<String>,
}

/// Resident vs faculty classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PersonKind {
    Resident {
        /// Post-graduate year, 1 through 3
        pgy_level: u8,
    },
    Faculty(FacultyProfile),
}

/// A person in the program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub kind: PersonKind,
}

impl Person {
    /// Construct a resident
    pub fn resident(name: impl Into<String>, email: impl Into<String>, pgy_level: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            kind: PersonKind::Resident { pgy_level },
        }
    }

    /// Construct a faculty member
    pub fn faculty(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            kind: PersonKind::Faculty(FacultyProfile::default()),
        }
    }

    /// Set the faculty role tag (no-op for residents)
    pub fn with_role(mut self, role: FacultyRole) -> Self {
        if let PersonKind::Faculty(profile) = &mut self.kind {
            profile.role = Some(role);
        }
        self
    }

    /// Attach specialty tags (no-op for residents)
    pub fn with_specialties(mut self, specialties: Vec<String>) -> Self {
        if let PersonKind::Faculty(profile) = &mut self.kind {
            profile.specialties = specialties;
        }
        self
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.kind, PersonKind::Resident { .. })
    }

    pub fn is_faculty(&self) -> bool {
        matches!(self.kind, PersonKind::Faculty(_))
    }

    /// PGY level for residents, None for faculty
    pub fn pgy_level(&self) -> Option<u8> {
        match self.kind {
            PersonKind::Resident { pgy_level } => Some(pgy_level),
            PersonKind::Faculty(_) => None,
        }
    }

    /// Faculty role tag, if any
    pub fn faculty_role(&self) -> Option<FacultyRole> {
        match &self.kind {
            PersonKind::Faculty(profile) => profile.role,
            PersonKind::Resident { .. } => None,
        }
    }

    /// Specialty tags (empty for residents)
    pub fn specialties(&self) -> &[String] {
        match &self.kind {
            PersonKind::Faculty(profile) => &profile.specialties,
            PersonKind::Resident { .. } => &[],
        }
    }
}
