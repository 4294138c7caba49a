//! Ensemble scenarios for deterministic runs.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// ENS-001: The reference three-player board
    Triangle,
    
    /// ENS-002: Two players trading phrases
    Duet,
    
    /// ENS-003: Players on a ring, delivery order by distance
    Ring,
    
    /// ENS-004: Randomly scattered board, run twice
    Scatter,
    
    /// ENS-005: Everyone harmonizes
    Chorus,
    
    /// ENS-006: A slow responder flooded while busy
    Backlog,
    
    /// ENS-007: Players leave mid-phrase
    Vanish,
    
    /// ENS-008: Roster refreshed from session JSON mid-run
    Refresh,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Triangle,
            ScenarioId::Duet,
            ScenarioId::Ring,
            ScenarioId::Scatter,
            ScenarioId::Chorus,
            ScenarioId::Backlog,
            ScenarioId::Vanish,
            ScenarioId::Refresh,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => "triangle",
            ScenarioId::Duet => "duet",
            ScenarioId::Ring => "ring",
            ScenarioId::Scatter => "scatter",
            ScenarioId::Chorus => "chorus",
            ScenarioId::Backlog => "backlog",
            ScenarioId::Vanish => "vanish",
            ScenarioId::Refresh => "refresh",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => "A(0,0) B(3,4) C(0,0): B hears the opening 500 ms late, C on time",
            ScenarioId::Duet => "Two echo players: every answer waits for the previous phrase",
            ScenarioId::Ring => "Players on a ring: each note reaches nearer players first",
            ScenarioId::Scatter => "Normally scattered board: two runs, identical journals",
            ScenarioId::Chorus => "Harmonizing ensemble: answers stay on the fixed ratio set",
            ScenarioId::Backlog => "Responder flooded while busy: window stays bounded",
            ScenarioId::Vanish => "Players removed mid-phrase: late deliveries are dropped quietly",
            ScenarioId::Refresh => "Roster reloaded from session JSON: in-flight windows survive",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triangle" | "ens-001" => Ok(ScenarioId::Triangle),
            "duet" | "ens-002" => Ok(ScenarioId::Duet),
            "ring" | "ens-003" => Ok(ScenarioId::Ring),
            "scatter" | "ens-004" => Ok(ScenarioId::Scatter),
            "chorus" | "ens-005" => Ok(ScenarioId::Chorus),
            "backlog" | "ens-006" => Ok(ScenarioId::Backlog),
            "vanish" | "ens-007" => Ok(ScenarioId::Vanish),
            "refresh" | "ens-008" => Ok(ScenarioId::Refresh),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("ENS-003".parse::<ScenarioId>(), Ok(ScenarioId::Ring));
        assert!("swarm".parse::<ScenarioId>().is_err());
    }
}
