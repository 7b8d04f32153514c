//! Le Chatelier equilibrium analysis
//!
//! A scheduling system under stress partially counteracts it through
//! compensation responses (overtime, cross-coverage, deferred leave). This
//! analyzer tracks the operating point (capacity vs demand), the hidden cost
//! of compensation, and how long the counteraction can hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Capacity floor; the model is meaningless below 10%
const CAPACITY_FLOOR: f64 = 0.1;

/// Diminishing-returns step per additional compensation on the same system
const DIMINISHING_RETURNS_STEP: f64 = 0.15;

/// Kinds of stress the system can experience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressType {
    FacultyLoss,
    DemandSurge,
    QualityPressure,
    TimeCompression,
    ResourceScarcity,
    ExternalPressure,
}

/// Kinds of compensation response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationType {
    Overtime,
    CrossCoverage,
    DeferredLeave,
    ServiceReduction,
    EfficiencyGain,
    BackupActivation,
    QualityTrade,
}

/// Operating regimes, ordered from healthy to failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquilibriumState {
    Stable,
    Compensating,
    Stressed,
    Unsustainable,
    Critical,
}

/// An applied stress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStress {
    pub id: Uuid,
    pub stress_type: StressType,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    /// Normalized severity in [0, 1]
    pub magnitude: f64,
    pub duration_days: u32,
    pub is_acute: bool,
    pub is_reversible: bool,
    /// Additive change to capacity (negative reduces)
    pub capacity_impact: f64,
    /// Multiplicative change to demand (0.3 means +30%)
    pub demand_impact: f64,
    pub is_active: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Parameters for applying a stress
#[derive(Debug, Clone)]
pub struct StressSpec {
    pub stress_type: StressType,
    pub description: String,
    pub magnitude: f64,
    pub duration_days: u32,
    pub capacity_impact: f64,
    pub demand_impact: f64,
    pub is_acute: bool,
    pub is_reversible: bool,
}

impl StressSpec {
    pub fn new(
        stress_type: StressType,
        description: impl Into<String>,
        magnitude: f64,
        duration_days: u32,
    ) -> Self {
        Self {
            stress_type,
            description: description.into(),
            magnitude,
            duration_days,
            capacity_impact: 0.0,
            demand_impact: 0.0,
            is_acute: true,
            is_reversible: true,
        }
    }

    pub fn capacity_impact(mut self, impact: f64) -> Self {
        self.capacity_impact = impact;
        self
    }

    pub fn demand_impact(mut self, impact: f64) -> Self {
        self.demand_impact = impact;
        self
    }

    pub fn gradual(mut self) -> Self {
        self.is_acute = false;
        self
    }
}

/// An active counteraction tied to a stress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationResponse {
    pub id: Uuid,
    pub stress_id: Uuid,
    pub compensation_type: CompensationType,
    pub description: String,
    pub initiated_at: DateTime<Utc>,
    pub compensation_magnitude: f64,
    /// Fraction of the magnitude actually delivered
    pub effectiveness: f64,
    pub immediate_cost: f64,
    /// Accrues to the compensation debt
    pub hidden_cost: f64,
    /// How long this response can hold
    pub sustainability_days: u32,
    pub is_active: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

/// Parameters for initiating a compensation
#[derive(Debug, Clone)]
pub struct CompensationSpec {
    pub compensation_type: CompensationType,
    pub description: String,
    pub magnitude: f64,
    pub effectiveness: f64,
    pub sustainability_days: u32,
    pub immediate_cost: f64,
    pub hidden_cost: f64,
}

impl CompensationSpec {
    pub fn new(
        compensation_type: CompensationType,
        description: impl Into<String>,
        magnitude: f64,
    ) -> Self {
        Self {
            compensation_type,
            description: description.into(),
            magnitude,
            effectiveness: 0.8,
            sustainability_days: 30,
            immediate_cost: 0.0,
            hidden_cost: 0.0,
        }
    }

    pub fn effectiveness(mut self, effectiveness: f64) -> Self {
        self.effectiveness = effectiveness;
        self
    }

    pub fn sustainability_days(mut self, days: u32) -> Self {
        self.sustainability_days = days;
        self
    }

    pub fn costs(mut self, immediate: f64, hidden: f64) -> Self {
        self.immediate_cost = immediate;
        self.hidden_cost = hidden;
        self
    }
}

/// Snapshot of how stresses and compensations move the operating point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumShift {
    pub original_capacity: f64,
    pub original_demand: f64,
    pub total_capacity_impact: f64,
    pub total_demand_impact: f64,
    pub stresses: Vec<Uuid>,
    pub compensations: Vec<Uuid>,
    /// Sum of active compensation magnitudes, before diminishing returns
    pub total_compensation: f64,
    /// Effective over raw compensation; 1.0 when one response is active
    pub compensation_efficiency: f64,
    /// Capacity without any compensation
    pub sustainable_capacity: f64,
    pub new_capacity: f64,
    pub new_demand: f64,
    pub new_coverage_rate: f64,
    pub equilibrium_state: EquilibriumState,
    pub burnout_risk: f64,
    pub days_until_exhaustion: Option<u32>,
}

/// Prediction for a hypothetical stress, computed without mutating state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResponsePrediction {
    pub stress_type: StressType,
    pub stress_magnitude: f64,
    pub stress_duration_days: u32,
    pub predicted_new_capacity: f64,
    pub predicted_coverage_rate: f64,
    pub predicted_compensation: f64,
    pub predicted_daily_cost: f64,
    pub predicted_total_cost: f64,
    /// Capacity still missing after natural compensation
    pub additional_intervention_needed: f64,
    pub sustainability_assessment: String,
    pub recommended_actions: Vec<String>,
}

/// Current-state report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumReport {
    pub current_equilibrium_state: EquilibriumState,
    pub current_capacity: f64,
    pub current_demand: f64,
    pub current_coverage_rate: f64,
    pub active_stresses: Vec<SystemStress>,
    pub active_compensations: Vec<CompensationResponse>,
    pub total_stress_magnitude: f64,
    pub total_compensation_magnitude: f64,
    pub compensation_debt: f64,
    pub days_until_exhaustion: Option<u32>,
    /// 1.0 when stable, decreasing with state severity
    pub sustainability_score: f64,
    pub recommendations: Vec<String>,
}

/// Simplified equilibrium after a single stress reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEquilibrium {
    pub capacity: f64,
    pub sustainable_capacity: f64,
    pub compensation_debt: f64,
    pub compensation_ratio: f64,
}

/// Tracks stresses, compensations and the resulting equilibrium
pub struct LeChatelierAnalyzer {
    pub base_compensation_rate: f64,
    pub compensation_cost_multiplier: f64,
    pub sustainability_threshold: f64,
    current_capacity: f64,
    current_demand: f64,
    compensation_debt: f64,
    pub stresses: HashMap<Uuid, SystemStress>,
    pub compensations: HashMap<Uuid, CompensationResponse>,
    pub shifts: Vec<EquilibriumShift>,
}

impl Default for LeChatelierAnalyzer {
    fn default() -> Self {
        Self::new(0.5, 1.5, 0.7)
    }
}

impl LeChatelierAnalyzer {
    pub fn new(
        base_compensation_rate: f64,
        compensation_cost_multiplier: f64,
        sustainability_threshold: f64,
    ) -> Self {
        Self {
            base_compensation_rate,
            compensation_cost_multiplier,
            sustainability_threshold,
            current_capacity: 1.0,
            current_demand: 0.8,
            compensation_debt: 0.0,
            stresses: HashMap::new(),
            compensations: HashMap::new(),
            shifts: Vec::new(),
        }
    }

    pub fn current_capacity(&self) -> f64 {
        self.current_capacity
    }

    pub fn current_demand(&self) -> f64 {
        self.current_demand
    }

    pub fn compensation_debt(&self) -> f64 {
        self.compensation_debt
    }

    /// Apply a stress, shifting capacity and demand immediately
    pub fn apply_stress(&mut self, spec: StressSpec) -> SystemStress {
        let stress = SystemStress {
            id: Uuid::new_v4(),
            stress_type: spec.stress_type,
            description: spec.description,
            applied_at: Utc::now(),
            magnitude: spec.magnitude,
            duration_days: spec.duration_days,
            is_acute: spec.is_acute,
            is_reversible: spec.is_reversible,
            capacity_impact: spec.capacity_impact,
            demand_impact: spec.demand_impact,
            is_active: true,
            resolved_at: None,
        };

        self.current_capacity = (self.current_capacity + stress.capacity_impact).max(CAPACITY_FLOOR);
        self.current_demand *= 1.0 + stress.demand_impact;

        debug!(
            stress = ?stress.stress_type,
            capacity = self.current_capacity,
            demand = self.current_demand,
            "stress applied"
        );

        self.stresses.insert(stress.id, stress.clone());
        stress
    }

    /// Resolve a stress, restoring its impacts and ending its compensations
    pub fn resolve_stress(&mut self, stress_id: Uuid) {
        let Some(stress) = self.stresses.get_mut(&stress_id) else {
            return;
        };
        if !stress.is_active {
            return;
        }
        stress.is_active = false;
        stress.resolved_at = Some(Utc::now());

        if stress.is_reversible {
            self.current_capacity = (self.current_capacity - stress.capacity_impact).min(1.0);
            let demand_factor = 1.0 + stress.demand_impact;
            if demand_factor != 0.0 {
                self.current_demand /= demand_factor;
            }
        }

        for compensation in self.compensations.values_mut() {
            if compensation.stress_id == stress_id && compensation.is_active {
                compensation.is_active = false;
                compensation.ended_at = Some(Utc::now());
                compensation.end_reason = Some("stress_resolved".to_string());
            }
        }
    }

    /// Initiate a compensation against an active stress.
    /// Returns None when the stress id is unknown.
    pub fn initiate_compensation(
        &mut self,
        stress_id: Uuid,
        spec: CompensationSpec,
    ) -> Option<CompensationResponse> {
        if !self.stresses.contains_key(&stress_id) {
            return None;
        }

        let compensation = CompensationResponse {
            id: Uuid::new_v4(),
            stress_id,
            compensation_type: spec.compensation_type,
            description: spec.description,
            initiated_at: Utc::now(),
            compensation_magnitude: spec.magnitude,
            effectiveness: spec.effectiveness,
            immediate_cost: spec.immediate_cost,
            hidden_cost: spec.hidden_cost,
            sustainability_days: spec.sustainability_days,
            is_active: true,
            ended_at: None,
            end_reason: None,
        };

        self.compensation_debt += compensation.hidden_cost;
        self.compensations.insert(compensation.id, compensation.clone());
        Some(compensation)
    }

    /// End a compensation with a reason
    pub fn end_compensation(&mut self, compensation_id: Uuid, reason: &str) {
        if let Some(compensation) = self.compensations.get_mut(&compensation_id) {
            compensation.is_active = false;
            compensation.ended_at = Some(Utc::now());
            compensation.end_reason = Some(reason.to_string());
        }
    }

    /// Compute the equilibrium shift from a baseline operating point
    pub fn calculate_equilibrium_shift(
        &mut self,
        original_capacity: f64,
        original_demand: f64,
    ) -> EquilibriumShift {
        let active_stresses: Vec<&SystemStress> =
            self.stresses.values().filter(|s| s.is_active).collect();
        let total_capacity_impact: f64 = active_stresses.iter().map(|s| s.capacity_impact).sum();
        let total_demand_impact: f64 = active_stresses.iter().map(|s| s.demand_impact).sum();

        let mut active_compensations: Vec<&CompensationResponse> =
            self.compensations.values().filter(|c| c.is_active).collect();
        active_compensations.sort_by_key(|c| c.initiated_at);

        // Each additional response on an already-compensating system delivers
        // less; the i-th is discounted by 0.15 * (i - 1), clamped at zero.
        let mut effective_compensation = 0.0;
        let mut raw_compensation = 0.0;
        for (i, compensation) in active_compensations.iter().enumerate() {
            let contribution = compensation.compensation_magnitude * compensation.effectiveness;
            raw_compensation += contribution;
            let discount = (1.0 - DIMINISHING_RETURNS_STEP * i as f64).max(0.0);
            effective_compensation += contribution * discount;
        }
        let compensation_efficiency = if raw_compensation > 0.0 {
            effective_compensation / raw_compensation
        } else {
            1.0
        };

        let sustainable_capacity = (original_capacity + total_capacity_impact).max(CAPACITY_FLOOR);
        let new_capacity = (sustainable_capacity + effective_compensation).max(CAPACITY_FLOOR);
        let new_demand = original_demand * (1.0 + total_demand_impact);
        let new_coverage_rate = coverage_rate(new_capacity, new_demand);

        let total_compensation: f64 = active_compensations
            .iter()
            .map(|c| c.compensation_magnitude)
            .sum();
        let burnout_risk =
            (self.compensation_debt / 100.0 + total_compensation * 0.3).min(1.0);
        let days_until_exhaustion = active_compensations
            .iter()
            .map(|c| c.sustainability_days)
            .min();

        let equilibrium_state = classify_state(
            new_coverage_rate,
            burnout_risk,
            !active_compensations.is_empty(),
        );

        let shift = EquilibriumShift {
            original_capacity,
            original_demand,
            total_capacity_impact,
            total_demand_impact,
            stresses: active_stresses.iter().map(|s| s.id).collect(),
            compensations: active_compensations.iter().map(|c| c.id).collect(),
            total_compensation,
            compensation_efficiency,
            sustainable_capacity,
            new_capacity,
            new_demand,
            new_coverage_rate,
            equilibrium_state,
            burnout_risk,
            days_until_exhaustion,
        };
        self.shifts.push(shift.clone());
        shift
    }

    /// Predict the response to a hypothetical stress without mutating state
    pub fn predict_stress_response(
        &self,
        stress_type: StressType,
        magnitude: f64,
        duration_days: u32,
        capacity_impact: f64,
        demand_impact: f64,
    ) -> StressResponsePrediction {
        let predicted_compensation = capacity_impact.abs() * self.base_compensation_rate;
        let raw_capacity = (self.current_capacity + capacity_impact).max(CAPACITY_FLOOR);
        let predicted_new_capacity = raw_capacity + predicted_compensation;
        let predicted_demand = self.current_demand * (1.0 + demand_impact);
        let predicted_coverage_rate = coverage_rate(predicted_new_capacity, predicted_demand);

        let predicted_daily_cost =
            predicted_compensation * self.compensation_cost_multiplier * 100.0;
        let predicted_total_cost = predicted_daily_cost * duration_days as f64;
        let additional_intervention_needed =
            (predicted_demand - predicted_new_capacity).max(0.0);

        let sustainability_assessment = if predicted_coverage_rate >= 0.95 {
            "System can absorb this stress sustainably".to_string()
        } else if predicted_coverage_rate >= 0.75 {
            "Manageable with active monitoring".to_string()
        } else if predicted_coverage_rate >= 0.6 {
            "Unsustainable beyond the short term - plan interventions now".to_string()
        } else {
            "Critical impact - immediate intervention required".to_string()
        };

        let mut recommended_actions = Vec::new();
        if predicted_coverage_rate < 0.9 {
            recommended_actions
                .push("Coverage will dip - schedule backup activation and monitoring".to_string());
        }
        if predicted_coverage_rate < 0.7 {
            recommended_actions
                .push("Critical shortfall predicted - activate fallback coverage plans".to_string());
        }
        if duration_days >= 30 {
            recommended_actions
                .push("Extended stress - plan permanent staffing adjustments".to_string());
        }

        StressResponsePrediction {
            stress_type,
            stress_magnitude: magnitude,
            stress_duration_days: duration_days,
            predicted_new_capacity,
            predicted_coverage_rate,
            predicted_compensation,
            predicted_daily_cost,
            predicted_total_cost,
            additional_intervention_needed,
            sustainability_assessment,
            recommended_actions,
        }
    }

    /// Simplified model: one stress reduction, natural compensation at the
    /// base rate, debt proportional to the compensation drawn
    pub fn calculate_new_equilibrium(
        &self,
        original_capacity: f64,
        stress_reduction: f64,
    ) -> NewEquilibrium {
        let sustainable_capacity = (original_capacity - stress_reduction).max(CAPACITY_FLOOR);
        let compensation = stress_reduction * self.base_compensation_rate;
        NewEquilibrium {
            capacity: sustainable_capacity + compensation,
            sustainable_capacity,
            compensation_debt: compensation * self.compensation_cost_multiplier,
            compensation_ratio: if stress_reduction > 0.0 {
                self.base_compensation_rate
            } else {
                0.0
            },
        }
    }

    /// Current-state report with recommendations
    pub fn get_report(&self) -> EquilibriumReport {
        let active_stresses: Vec<SystemStress> = self
            .stresses
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        let mut active_compensations: Vec<CompensationResponse> = self
            .compensations
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active_compensations.sort_by_key(|c| c.initiated_at);

        let total_stress_magnitude: f64 = active_stresses.iter().map(|s| s.magnitude).sum();
        let total_compensation_magnitude: f64 = active_compensations
            .iter()
            .map(|c| c.compensation_magnitude)
            .sum();
        let current_coverage_rate = coverage_rate(self.current_capacity, self.current_demand);
        let burnout_risk =
            (self.compensation_debt / 100.0 + total_compensation_magnitude * 0.3).min(1.0);
        let days_until_exhaustion = active_compensations
            .iter()
            .map(|c| c.sustainability_days)
            .min();

        let state = classify_state(
            current_coverage_rate,
            burnout_risk,
            !active_compensations.is_empty(),
        );
        let sustainability_score = match state {
            EquilibriumState::Stable => 1.0,
            EquilibriumState::Compensating => 0.8,
            EquilibriumState::Stressed => 0.6,
            EquilibriumState::Unsustainable => 0.4,
            EquilibriumState::Critical => 0.2,
        };

        let mut recommendations = Vec::new();
        match state {
            EquilibriumState::Critical | EquilibriumState::Unsustainable => {
                recommendations.push("Immediate: activate all backup coverage".to_string());
                recommendations
                    .push("Escalate to leadership - current posture cannot hold".to_string());
            }
            EquilibriumState::Stressed => {
                recommendations
                    .push("Coverage degraded - monitor daily and line up backups".to_string());
            }
            EquilibriumState::Compensating => {
                recommendations
                    .push("Running on compensation - plan relief before it exhausts".to_string());
            }
            EquilibriumState::Stable => {}
        }
        if let Some(days) = days_until_exhaustion {
            if days <= 14 {
                recommendations.push(format!(
                    "Compensation exhaustion within {} days - rotate responders",
                    days
                ));
            }
        }

        EquilibriumReport {
            current_equilibrium_state: state,
            current_capacity: self.current_capacity,
            current_demand: self.current_demand,
            current_coverage_rate,
            active_stresses,
            active_compensations,
            total_stress_magnitude,
            total_compensation_magnitude,
            compensation_debt: self.compensation_debt,
            days_until_exhaustion,
            sustainability_score,
            recommendations,
        }
    }

    /// Override the current operating point
    pub fn set_current_state(&mut self, capacity: f64, demand: f64) {
        self.current_capacity = capacity;
        self.current_demand = demand;
    }

    /// Clear accumulated compensation debt (e.g. after a recovery period)
    pub fn reset_compensation_debt(&mut self) {
        self.compensation_debt = 0.0;
    }
}

fn coverage_rate(capacity: f64, demand: f64) -> f64 {
    if demand <= 0.0 {
        1.0
    } else {
        (capacity / demand).min(1.0)
    }
}

fn classify_state(coverage: f64, burnout_risk: f64, compensating: bool) -> EquilibriumState {
    if coverage < 0.6 {
        EquilibriumState::Critical
    } else if coverage < 0.75 || burnout_risk > 0.6 {
        EquilibriumState::Unsustainable
    } else if coverage < 0.9 {
        EquilibriumState::Stressed
    } else if coverage >= 0.95 && !compensating {
        EquilibriumState::Stable
    } else {
        EquilibriumState::Compensating
    }
}
