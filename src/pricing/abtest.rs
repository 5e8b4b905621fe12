//! Deterministic experiment assignment. A caller is hashed into a bucket of
//! 100 and walks the variant weights in declaration order, so the same
//! caller always lands on the same variant for a given experiment.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PRICING_ALGORITHM_EXPERIMENT: &str = "pricing_algorithm";
pub const DISCOUNT_STRATEGY_EXPERIMENT: &str = "discount_strategy";
pub const CONTROL_VARIANT: &str = "control";

/// Which computation path a pricing variant drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingAlgorithm {
    Legacy,
    Optimized,
    MlBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub weight: u8,
    pub algorithm: PricingAlgorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub description: String,
    pub variants: Vec<Variant>,
    pub active: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Experiment {
    fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active && now >= self.start && now <= self.end
    }
}

pub struct AbTestManager {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl Default for AbTestManager {
    fn default() -> Self {
        let now = Utc::now();
        let mut experiments = HashMap::new();
        experiments.insert(
            PRICING_ALGORITHM_EXPERIMENT.to_owned(),
            Experiment {
                name: PRICING_ALGORITHM_EXPERIMENT.to_owned(),
                description: "compare legacy, optimized and ml-based pricing paths".to_owned(),
                variants: vec![
                    Variant {
                        name: CONTROL_VARIANT.to_owned(),
                        weight: 50,
                        algorithm: PricingAlgorithm::Legacy,
                    },
                    Variant {
                        name: "variant_a".to_owned(),
                        weight: 25,
                        algorithm: PricingAlgorithm::Optimized,
                    },
                    Variant {
                        name: "variant_b".to_owned(),
                        weight: 25,
                        algorithm: PricingAlgorithm::MlBased,
                    },
                ],
                active: true,
                start: now - Duration::days(1),
                end: now + Duration::days(30),
            },
        );
        experiments.insert(
            DISCOUNT_STRATEGY_EXPERIMENT.to_owned(),
            Experiment {
                name: DISCOUNT_STRATEGY_EXPERIMENT.to_owned(),
                description: "volume discount ladder trial".to_owned(),
                variants: vec![
                    Variant {
                        name: CONTROL_VARIANT.to_owned(),
                        weight: 80,
                        algorithm: PricingAlgorithm::Legacy,
                    },
                    Variant {
                        name: "steeper_ladder".to_owned(),
                        weight: 20,
                        algorithm: PricingAlgorithm::Optimized,
                    },
                ],
                active: false,
                start: now,
                end: now + Duration::days(30),
            },
        );
        Self {
            experiments: RwLock::new(experiments),
        }
    }
}

impl AbTestManager {
    /// Assign a variant. Inactive or out-of-window experiments always
    /// return the control variant.
    pub fn variant_for(
        &self,
        experiment: &str,
        user_id: Option<&str>,
        tenant_id: Option<&str>,
    ) -> String {
        let experiments = match self.experiments.read() {
            Ok(experiments) => experiments,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(exp) = experiments.get(experiment) else {
            return CONTROL_VARIANT.to_owned();
        };
        if !exp.is_running(Utc::now()) {
            return CONTROL_VARIANT.to_owned();
        }
        let identifier = user_id.or(tenant_id).unwrap_or("default");
        let bucket = stable_bucket(experiment, identifier);
        let mut cumulative = 0u32;
        for variant in &exp.variants {
            cumulative += u32::from(variant.weight);
            if u32::from(bucket) < cumulative {
                return variant.name.clone();
            }
        }
        CONTROL_VARIANT.to_owned()
    }

    /// The computation path behind a variant name. Unknown names fall back
    /// to the legacy path.
    pub fn algorithm_for(&self, experiment: &str, variant: &str) -> PricingAlgorithm {
        let experiments = match self.experiments.read() {
            Ok(experiments) => experiments,
            Err(poisoned) => poisoned.into_inner(),
        };
        experiments
            .get(experiment)
            .and_then(|exp| exp.variants.iter().find(|v| v.name == variant))
            .map(|v| v.algorithm)
            .unwrap_or(PricingAlgorithm::Legacy)
    }

    pub fn upsert(&self, experiment: Experiment) {
        let mut experiments = match self.experiments.write() {
            Ok(experiments) => experiments,
            Err(poisoned) => poisoned.into_inner(),
        };
        experiments.insert(experiment.name.clone(), experiment);
    }

    pub fn status(&self) -> Vec<Experiment> {
        let experiments = match self.experiments.read() {
            Ok(experiments) => experiments,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut all: Vec<Experiment> = experiments.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Hash-based bucket in 0..100, stable across processes and restarts.
fn stable_bucket(experiment: &str, identifier: &str) -> u8 {
    let digest = Sha256::digest(format!("{experiment}:{identifier}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_stable_across_repeated_calls() {
        let manager = AbTestManager::default();
        let first =
            manager.variant_for(PRICING_ALGORITHM_EXPERIMENT, Some("user-42"), None);
        for _ in 0..100 {
            let again =
                manager.variant_for(PRICING_ALGORITHM_EXPERIMENT, Some("user-42"), None);
            assert_eq!(again, first);
        }
    }

    #[test]
    fn user_id_takes_precedence_over_tenant() {
        let manager = AbTestManager::default();
        let with_user = manager.variant_for(
            PRICING_ALGORITHM_EXPERIMENT,
            Some("user-7"),
            Some("enterprise"),
        );
        let user_only =
            manager.variant_for(PRICING_ALGORITHM_EXPERIMENT, Some("user-7"), None);
        assert_eq!(with_user, user_only);
    }

    #[test]
    fn inactive_experiment_always_returns_control() {
        let manager = AbTestManager::default();
        for user in ["a", "b", "c", "d", "e"] {
            assert_eq!(
                manager.variant_for(DISCOUNT_STRATEGY_EXPERIMENT, Some(user), None),
                CONTROL_VARIANT
            );
        }
    }

    #[test]
    fn unknown_experiment_returns_control() {
        let manager = AbTestManager::default();
        assert_eq!(
            manager.variant_for("no_such_experiment", Some("user"), None),
            CONTROL_VARIANT
        );
    }

    #[test]
    fn buckets_cover_all_variants_over_many_identifiers() {
        let manager = AbTestManager::default();
        let mut seen = std::collections::HashSet::new();
        for i in 0..500 {
            let user = format!("user-{i}");
            seen.insert(manager.variant_for(
                PRICING_ALGORITHM_EXPERIMENT,
                Some(&user),
                None,
            ));
        }
        assert!(seen.contains("control"));
        assert!(seen.contains("variant_a"));
        assert!(seen.contains("variant_b"));
    }

    #[test]
    fn expired_window_disables_assignment() {
        let manager = AbTestManager::default();
        let now = Utc::now();
        manager.upsert(Experiment {
            name: "expired".to_owned(),
            description: String::new(),
            variants: vec![Variant {
                name: "everyone".to_owned(),
                weight: 100,
                algorithm: PricingAlgorithm::Optimized,
            }],
            active: true,
            start: now - Duration::days(10),
            end: now - Duration::days(1),
        });
        assert_eq!(
            manager.variant_for("expired", Some("user"), None),
            CONTROL_VARIANT
        );
    }

    #[test]
    fn bucket_is_derived_from_experiment_and_identifier() {
        let a = stable_bucket("pricing_algorithm", "user-1");
        let b = stable_bucket("pricing_algorithm", "user-1");
        assert_eq!(a, b);
        assert!(a < 100);
    }
}
