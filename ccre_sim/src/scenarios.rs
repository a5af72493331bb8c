//! Simulation scenarios.

use crate::error::SimError;
use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: random request toggles over a ladder of behaviors
    PriorityLadder,

    /// SIM-002: arbitrated float following per-behavior overrides
    OverrideTracking,

    /// SIM-003: fixed-rate jobs that overrun their period
    OverloadSkip,

    /// SIM-004: variable-rate job with random run durations
    VariableSpacing,

    /// SIM-005: Drive / Auto / Teleop control loop
    DriveModes,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PriorityLadder,
            ScenarioId::OverrideTracking,
            ScenarioId::OverloadSkip,
            ScenarioId::VariableSpacing,
            ScenarioId::DriveModes,
        ]
    }

    /// Resolves a CLI selection: one scenario name, or `all`.
    pub fn select(selection: &str) -> Result<Vec<ScenarioId>, SimError> {
        if selection == "all" {
            Ok(Self::all())
        } else {
            Ok(vec![selection.parse()?])
        }
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PriorityLadder => "priority_ladder",
            ScenarioId::OverrideTracking => "override_tracking",
            ScenarioId::OverloadSkip => "overload_skip",
            ScenarioId::VariableSpacing => "variable_spacing",
            ScenarioId::DriveModes => "drive_modes",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PriorityLadder => {
                "Random request toggles; the highest requester is always active"
            }
            ScenarioId::OverrideTracking => {
                "Arbitrated float reads always match the authoritative source"
            }
            ScenarioId::OverloadSkip => {
                "Overrunning fixed-rate jobs: skippable jumps ahead, strict falls behind"
            }
            ScenarioId::VariableSpacing => {
                "Variable-rate gaps equal the period regardless of run time"
            }
            ScenarioId::DriveModes => "Drive / Auto / Teleop speed routing under a 20ms loop",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority_ladder" | "priorityladder" | "sim-001" => Ok(ScenarioId::PriorityLadder),
            "override_tracking" | "overridetracking" | "sim-002" => {
                Ok(ScenarioId::OverrideTracking)
            }
            "overload_skip" | "overloadskip" | "sim-003" => Ok(ScenarioId::OverloadSkip),
            "variable_spacing" | "variablespacing" | "sim-004" => Ok(ScenarioId::VariableSpacing),
            "drive_modes" | "drivemodes" | "sim-005" => Ok(ScenarioId::DriveModes),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
