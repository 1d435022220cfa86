//! Epsilon-greedy action selection.

use crate::action::ActionSpace;
use crate::category::Category;
use crate::config::OptimizerConfig;
use crate::context::with_action;
use crate::error::ModelError;
use crate::models::RewardModelBank;
use rand::RngCore;
use tracing::{debug, warn};

/// Source of the uniform draws behind exploration.
pub trait RandomSource: Send {
    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f64;

    /// Uniform in `0..len`. `len` is never 0.
    fn index(&mut self, len: usize) -> usize;
}

impl<R: RngCore + Send> RandomSource for R {
    fn uniform(&mut self) -> f64 {
        rand::Rng::gen::<f64>(self)
    }

    fn index(&mut self, len: usize) -> usize {
        rand::Rng::gen_range(self, 0..len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Explore,
    Exploit,
}

/// The grid index picked for one category and how sure we are about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Choice {
    pub mode: Mode,
    pub index: usize,
    pub confidence: f64,
    /// True when the model was unavailable and the no-change action was used.
    pub fallback: bool,
}

/// Predicted reward for every action in the grid.
pub fn score_actions(
    bank: &RewardModelBank,
    category: Category,
    context_features: &[f64],
    current_amount: f64,
    space: &ActionSpace,
    config: &OptimizerConfig,
) -> Result<Vec<f64>, ModelError> {
    space
        .deltas()
        .iter()
        .map(|&delta| {
            let features = with_action(context_features, delta, current_amount, config.budget_scale);
            bank.predict(category, &features)
        })
        .collect()
}

/// Arg-max over the model's scores; the no-change action at fallback
/// confidence when the model cannot score.
pub fn exploit(
    bank: &RewardModelBank,
    category: Category,
    context_features: &[f64],
    current_amount: f64,
    space: &ActionSpace,
    config: &OptimizerConfig,
) -> Choice {
    match score_actions(bank, category, context_features, current_amount, space, config) {
        Ok(scores) => {
            // first maximum wins on ties
            let (index, best) = scores
                .iter()
                .copied()
                .enumerate()
                .fold((ActionSpace::NO_CHANGE, f64::NEG_INFINITY), |(bi, bv), (i, v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                });
            let confidence = best.clamp(config.exploit_confidence_min, config.exploit_confidence_max);
            debug!(category = %category, index, predicted = best, "exploiting reward model");
            Choice {
                mode: Mode::Exploit,
                index,
                confidence,
                fallback: false,
            }
        }
        Err(e) => {
            match e {
                ModelError::NotReady => debug!(category = %category, "reward model not trained, keeping budget"),
                other => warn!(category = %category, error = %other, "reward model failed, keeping budget"),
            }
            Choice {
                mode: Mode::Exploit,
                index: ActionSpace::NO_CHANGE,
                confidence: config.fallback_confidence,
                fallback: true,
            }
        }
    }
}

/// One epsilon-greedy decision. With `explore` off the draw is skipped.
#[allow(clippy::too_many_arguments)]
pub fn choose(
    rng: &mut dyn RandomSource,
    exploration_rate: f64,
    explore: bool,
    bank: &RewardModelBank,
    category: Category,
    context_features: &[f64],
    current_amount: f64,
    space: &ActionSpace,
    config: &OptimizerConfig,
) -> Choice {
    if explore && rng.uniform() < exploration_rate {
        let index = rng.index(space.len());
        debug!(category = %category, index, "exploring random action");
        return Choice {
            mode: Mode::Explore,
            index,
            confidence: config.explore_confidence,
            fallback: false,
        };
    }
    exploit(bank, category, context_features, current_amount, space, config)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::RandomSource;
    use std::collections::VecDeque;

    /// Replays fixed draws; panics when exhausted.
    pub struct Scripted {
        pub uniforms: VecDeque<f64>,
        pub indices: VecDeque<usize>,
    }

    impl Scripted {
        pub fn new(uniforms: &[f64], indices: &[usize]) -> Self {
            Scripted {
                uniforms: uniforms.iter().copied().collect(),
                indices: indices.iter().copied().collect(),
            }
        }
    }

    impl RandomSource for Scripted {
        fn uniform(&mut self) -> f64 {
            self.uniforms.pop_front().expect("script ran out of uniforms")
        }

        fn index(&mut self, len: usize) -> usize {
            self.indices.pop_front().expect("script ran out of indices") % len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Scripted;
    use super::*;
    use crate::context::{extract_features, RiskTolerance, UserContext};

    fn setup() -> (RewardModelBank, Vec<f64>, OptimizerConfig) {
        let config = OptimizerConfig::default();
        let bank = RewardModelBank::new(&config);
        let ctx = UserContext::new(1, 50_000.0, 100_000.0, RiskTolerance::Moderate);
        (bank, extract_features(&ctx, &config), config)
    }

    #[test]
    fn draw_below_rate_explores() {
        let (bank, features, config) = setup();
        let mut rng = Scripted::new(&[0.05], &[6]);
        let space = ActionSpace::default();
        let choice = choose(&mut rng, 0.1, true, &bank, Category::Food, &features, 1_000.0, &space, &config);
        assert_eq!(choice.mode, Mode::Explore);
        assert_eq!(choice.index, 6);
        assert_eq!(choice.confidence, 0.3);
    }

    #[test]
    fn untrained_model_falls_back_to_no_change() {
        let (bank, features, config) = setup();
        let mut rng = Scripted::new(&[0.5], &[]);
        let space = ActionSpace::default();
        let choice = choose(&mut rng, 0.1, true, &bank, Category::Food, &features, 1_000.0, &space, &config);
        assert_eq!(choice.mode, Mode::Exploit);
        assert!(choice.fallback);
        assert_eq!(choice.index, ActionSpace::NO_CHANGE);
        assert_eq!(choice.confidence, 0.3);
    }

    #[test]
    fn disabled_exploration_never_draws() {
        let (bank, features, config) = setup();
        let mut rng = Scripted::new(&[], &[]);
        let space = ActionSpace::default();
        let choice = choose(&mut rng, 1.0, false, &bank, Category::Savings, &features, 1_000.0, &space, &config);
        assert_eq!(choice.mode, Mode::Exploit);
    }

    #[test]
    fn exploit_picks_highest_scoring_delta() {
        let (mut bank, features, config) = setup();
        let space = ActionSpace::default();
        // teach the linear savings model that larger increases pay more
        for _ in 0..50 {
            for &delta in space.deltas() {
                let f = with_action(&features, delta, 5_000.0, config.budget_scale);
                bank.update(Category::Savings, &f, 0.5 + delta).unwrap();
            }
        }
        let choice = exploit(&bank, Category::Savings, &features, 5_000.0, &space, &config);
        assert!(!choice.fallback);
        assert_eq!(choice.index, 6);
        assert!((0.1..=0.9).contains(&choice.confidence));
    }

    #[test]
    fn seeded_rng_is_a_random_source() {
        use rand::SeedableRng;
        let mut a = rand::rngs::StdRng::seed_from_u64(9);
        let mut b = rand::rngs::StdRng::seed_from_u64(9);
        assert_eq!(RandomSource::uniform(&mut a), RandomSource::uniform(&mut b));
        assert!(RandomSource::index(&mut a, 7) < 7);
    }
}
