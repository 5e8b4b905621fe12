//! Controlled cutover between the legacy calculators and the unified
//! engine. The controller only decides which path a request takes; the
//! engine owns running the paths and reconciling results.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// Rollout posture for the unified engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    OldOnly,
    NewOnly,
    NewWithFallback,
    Comparison,
    GradualRollout,
}

/// What the engine should run for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineChoice {
    Old,
    New,
    NewWithFallback,
    Comparison,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MigrationStatus {
    pub strategy: MigrationStrategy,
    pub rollout_percentage: u8,
}

struct MigrationState {
    strategy: MigrationStrategy,
    rollout_percentage: u8,
}

pub struct MigrationController {
    state: RwLock<MigrationState>,
}

impl Default for MigrationController {
    fn default() -> Self {
        Self {
            state: RwLock::new(MigrationState {
                strategy: MigrationStrategy::NewWithFallback,
                rollout_percentage: 0,
            }),
        }
    }
}

impl MigrationController {
    pub fn new(strategy: MigrationStrategy, rollout_percentage: u8) -> Self {
        Self {
            state: RwLock::new(MigrationState {
                strategy,
                rollout_percentage: rollout_percentage.min(100),
            }),
        }
    }

    pub fn choose(&self, request_id: Option<&str>) -> EngineChoice {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.strategy {
            MigrationStrategy::OldOnly => EngineChoice::Old,
            MigrationStrategy::NewOnly => EngineChoice::New,
            MigrationStrategy::NewWithFallback => EngineChoice::NewWithFallback,
            MigrationStrategy::Comparison => EngineChoice::Comparison,
            MigrationStrategy::GradualRollout => {
                let bucket = rollout_bucket(request_id.unwrap_or("default"));
                if bucket < state.rollout_percentage {
                    EngineChoice::NewWithFallback
                } else {
                    EngineChoice::Old
                }
            }
        }
    }

    pub fn set_strategy(&self, strategy: MigrationStrategy, rollout_percentage: u8) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.strategy = strategy;
        state.rollout_percentage = rollout_percentage.min(100);
        info!(?strategy, rollout = state.rollout_percentage, "migration strategy changed");
    }

    pub fn status(&self) -> MigrationStatus {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        MigrationStatus {
            strategy: state.strategy,
            rollout_percentage: state.rollout_percentage,
        }
    }
}

/// Relative price difference between the two paths, as a warning when it
/// exceeds the agreement threshold.
pub fn comparison_warning(new_total: f64, old_total: f64) -> Option<String> {
    const AGREEMENT_THRESHOLD: f64 = 0.10;
    if old_total.abs() < f64::EPSILON {
        return None;
    }
    let relative = ((new_total - old_total) / old_total).abs();
    if relative > AGREEMENT_THRESHOLD {
        Some(format!(
            "pricing paths disagree by {:.1}% (new {new_total:.2} EGP, old {old_total:.2} EGP)",
            relative * 100.0
        ))
    } else {
        None
    }
}

fn rollout_bucket(request_id: &str) -> u8 {
    let digest = Sha256::digest(request_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategies_ignore_the_request_id() {
        let controller = MigrationController::new(MigrationStrategy::OldOnly, 0);
        assert_eq!(controller.choose(Some("r1")), EngineChoice::Old);
        assert_eq!(controller.choose(None), EngineChoice::Old);

        controller.set_strategy(MigrationStrategy::NewOnly, 0);
        assert_eq!(controller.choose(Some("r1")), EngineChoice::New);

        controller.set_strategy(MigrationStrategy::Comparison, 0);
        assert_eq!(controller.choose(Some("r1")), EngineChoice::Comparison);
    }

    #[test]
    fn gradual_rollout_edges() {
        let none = MigrationController::new(MigrationStrategy::GradualRollout, 0);
        let all = MigrationController::new(MigrationStrategy::GradualRollout, 100);
        for id in ["a", "b", "c", "d", "e"] {
            assert_eq!(none.choose(Some(id)), EngineChoice::Old);
            assert_eq!(all.choose(Some(id)), EngineChoice::NewWithFallback);
        }
    }

    #[test]
    fn gradual_rollout_is_deterministic_per_request() {
        let controller = MigrationController::new(MigrationStrategy::GradualRollout, 50);
        let first = controller.choose(Some("request-123"));
        for _ in 0..20 {
            assert_eq!(controller.choose(Some("request-123")), first);
        }
    }

    #[test]
    fn comparison_warns_only_on_large_disagreement() {
        assert!(comparison_warning(105.0, 100.0).is_none());
        let warning = comparison_warning(120.0, 100.0).unwrap();
        assert!(warning.contains("20.0%"));
        assert!(comparison_warning(1.0, 0.0).is_none());
    }

    #[test]
    fn rollout_percentage_is_clamped() {
        let controller = MigrationController::new(MigrationStrategy::GradualRollout, 200);
        assert_eq!(controller.status().rollout_percentage, 100);
    }
}
