//! Resilience analysis: contingency simulation and equilibrium modeling

pub mod centrality;
pub mod contingency;
pub mod le_chatelier;

pub use contingency::{
    CentralityInfo, ContingencyAnalyzer, ContingencyOptions, ContingencyReport, FatalPairInfo,
    N1SimulationResult, N2SimulationResult, VulnerabilityAssessment, VulnerabilityInfo,
};
pub use le_chatelier::{
    CompensationResponse, CompensationSpec, CompensationType, EquilibriumReport, EquilibriumShift,
    EquilibriumState, LeChatelierAnalyzer, NewEquilibrium, StressResponsePrediction, StressSpec,
    StressType, SystemStress,
};
