//! Scripted scenarios for `juice simulate`.
//!
//! A scenario is a JSON document with a list of steps. Steps either move the
//! clock, set up accounts and tokens, or run a [`ProtocolOperation`]. A step
//! may declare the error code it expects; the run stops at the first step
//! whose outcome differs from its expectation.
//!
//! ```json
//! {
//!   "name": "invest",
//!   "steps": [
//!     { "action": { "Faucet": { "to": "@alice", "amount": 5000000000000000000000 } } },
//!     { "action": { "Op": { "Invest": { "investor": "@alice", "amount": 5000000000000000000000 } } } },
//!     { "action": { "Advance": { "seconds": 259200 } } },
//!     { "action": { "Op": { "Redeem": { "holder": "@alice", "shares": 0 } } },
//!       "expect_error": 5002 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::protocol::operations::{Operation, OperationResult, ProtocolOperation};
use crate::protocol::state_machine::Protocol;
use crate::utils::address::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO
// ═══════════════════════════════════════════════════════════════════════════════

/// What a step does
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    /// Move the clock forward and open a new block
    Advance {
        /// Seconds to advance
        seconds: u64,
    },
    /// Register a collateral token; it is addressable as `$SYMBOL`
    CreateToken {
        /// Symbol
        symbol: String,
    },
    /// Mint collateral to an account
    MintCollateral {
        /// Token
        token: Address,
        /// Recipient
        to: Address,
        /// Amount
        amount: u128,
    },
    /// Mint stablecoin to an account through the bridge minter
    Faucet {
        /// Recipient
        to: Address,
        /// Amount
        amount: u128,
    },
    /// Run an engine operation
    Op(ProtocolOperation),
}

impl Action {
    /// Short label for reports
    pub fn label(&self) -> String {
        match self {
            Action::Advance { seconds } => format!("Advance({}s)", seconds),
            Action::CreateToken { symbol } => format!("CreateToken({})", symbol),
            Action::MintCollateral { .. } => "MintCollateral".into(),
            Action::Faucet { .. } => "Faucet".into(),
            Action::Op(op) => op.operation_type().into(),
        }
    }
}

/// One scripted step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Action to run
    pub action: Action,
    /// Error code the action must fail with
    #[serde(default)]
    pub expect_error: Option<u32>,
}

/// A scripted run against a fresh engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Engine time at genesis
    #[serde(default)]
    pub start_time: u64,
    /// Leading rate at genesis, overriding the simulator config
    #[serde(default)]
    pub leadrate_ppm: Option<u32>,
    /// Steps in order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Storage(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Build the genesis engine for this scenario
    pub fn genesis(&self, params: ProtocolParams, default_leadrate_ppm: u32) -> Result<Protocol> {
        let mut protocol = Protocol::new(params, self.leadrate_ppm.unwrap_or(default_leadrate_ppm))?;
        protocol.begin_block(1, self.start_time)?;
        Ok(protocol)
    }

    /// Run every step against `protocol`
    pub fn run(&self, protocol: &mut Protocol) -> ScenarioReport {
        info!(scenario = %self.name, steps = self.steps.len(), "Running scenario");
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let result = run_action(protocol, &step.action);
            let outcome = StepOutcome::judge(index, step, result);
            debug!(step = index, label = %outcome.label, passed = outcome.passed, "Step finished");
            let passed = outcome.passed;
            outcomes.push(outcome);
            if !passed {
                break;
            }
        }
        ScenarioReport {
            name: self.name.clone(),
            total_steps: self.steps.len(),
            outcomes,
        }
    }
}

fn run_action(protocol: &mut Protocol, action: &Action) -> Result<Option<OperationResult>> {
    match action {
        Action::Advance { seconds } => {
            protocol.advance_time(*seconds);
            Ok(None)
        }
        Action::CreateToken { symbol } => protocol.create_token(symbol).map(|_| None),
        Action::MintCollateral { token, to, amount } => {
            protocol.mint_collateral(*token, *to, *amount).map(|_| None)
        }
        Action::Faucet { to, amount } => protocol.faucet(*to, *amount).map(|_| None),
        Action::Op(op) => protocol.execute(op.clone()).map(Some),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Step index
    pub index: usize,
    /// Step label
    pub label: String,
    /// Whether the outcome matched the expectation
    pub passed: bool,
    /// Operation result, if any
    pub result: Option<OperationResult>,
    /// Error code, if the step failed
    pub error_code: Option<u32>,
    /// Error message, if the step failed
    pub error: Option<String>,
}

impl StepOutcome {
    fn judge(index: usize, step: &Step, result: Result<Option<OperationResult>>) -> Self {
        let label = step.action.label();
        match result {
            Ok(result) => Self {
                index,
                label,
                passed: step.expect_error.is_none(),
                result,
                error_code: None,
                error: step
                    .expect_error
                    .map(|code| format!("expected error {} but step succeeded", code)),
            },
            Err(e) => Self {
                index,
                label,
                passed: step.expect_error == Some(e.code()),
                result: None,
                error_code: Some(e.code()),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Result of a scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Steps in the script
    pub total_steps: usize,
    /// Outcomes of the steps that ran
    pub outcomes: Vec<StepOutcome>,
}

impl ScenarioReport {
    /// Whether every step ran and matched its expectation
    pub fn passed(&self) -> bool {
        self.outcomes.len() == self.total_steps && self.outcomes.iter().all(|o| o.passed)
    }

    /// First step that did not match, if any
    pub fn first_failure(&self) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| !o.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::position::PositionId;
    use crate::utils::constants::ONE;

    const SCRIPT: &str = r#"{
        "name": "open and mint",
        "steps": [
            { "action": { "CreateToken": { "symbol": "WETH" } } },
            { "action": { "MintCollateral": { "token": "$WETH", "to": "@alice", "amount": 10000000000000000000 } } },
            { "action": { "Faucet": { "to": "@alice", "amount": 2000000000000000000000 } } },
            { "action": { "Op": { "OpenPosition": { "owner": "@alice", "params": {
                "collateral_token": "$WETH",
                "min_collateral": 1000000000000000000,
                "initial_collateral": 10000000000000000000,
                "limit": 100000000000000000000000,
                "init_period": 259200,
                "duration": 15552000,
                "challenge_period": 259200,
                "risk_premium_ppm": 10000,
                "price": 2000000000000000000000,
                "reserve_ppm": 150000
            } } } } },
            { "action": { "Op": { "Mint": { "caller": "@alice", "position": 1, "target": "@alice", "amount": 1000000000000000000000 } } },
              "expect_error": 1007 },
            { "action": { "Advance": { "seconds": 259200 } } },
            { "action": { "Op": { "Mint": { "caller": "@alice", "position": 1, "target": "@alice", "amount": 1000000000000000000000 } } } }
        ]
    }"#;

    fn run(script: &str) -> (Protocol, ScenarioReport) {
        let scenario: Scenario = serde_json::from_str(script).unwrap();
        let mut protocol = scenario.genesis(ProtocolParams::default(), 50_000).unwrap();
        let report = scenario.run(&mut protocol);
        (protocol, report)
    }

    #[test]
    fn test_scenario_runs_to_completion() {
        let (protocol, report) = run(SCRIPT);
        assert!(report.passed(), "{:?}", report.first_failure());
        assert_eq!(report.outcomes.len(), 7);
        assert_eq!(
            report.outcomes[3].result,
            Some(OperationResult::Position(PositionId(1)))
        );
        let position = protocol.position(PositionId(1)).unwrap();
        assert_eq!(position.principal, 1_000 * ONE);
    }

    #[test]
    fn test_scenario_stops_at_unexpected_failure() {
        let script = SCRIPT.replace(r#""expect_error": 1007"#, r#""expect_error": 9999"#);
        let (_, report) = run(&script);
        assert!(!report.passed());
        let failure = report.first_failure().unwrap();
        assert_eq!(failure.index, 4);
        assert_eq!(failure.error_code, Some(1007));
        assert_eq!(report.outcomes.len(), 5);
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(Action::Advance { seconds: 5 }.label(), "Advance(5s)");
        let op: ProtocolOperation =
            serde_json::from_str(r#"{"AccrueInterest":{"caller":"@bob","position":1}}"#).unwrap();
        assert_eq!(Action::Op(op).label(), "AccrueInterest");
    }
}
