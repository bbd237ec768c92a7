//! BPR gradient step
//!
//! One stochastic step on the log-sigmoid pairwise loss for a triple
//! `(u, i, j)`. The step is generic over [`FactorParameters`], so the same code
//! drives the owning model and the lock-free parallel view.

use crate::config::BprConfig;
use crate::model::FactorParameters;
use crate::sampler::Triple;
use latent_rank_core::math::sigmoid;

/// Which parameter groups a step may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateMask {
    /// User row
    pub user: bool,
    /// Positive item row and bias
    pub positive: bool,
    /// Negative item row and bias
    pub negative: bool,
}

impl UpdateMask {
    pub const ALL: UpdateMask = UpdateMask {
        user: true,
        positive: true,
        negative: true,
    };

    pub const USER: UpdateMask = UpdateMask {
        user: true,
        positive: false,
        negative: false,
    };

    pub const POSITIVE: UpdateMask = UpdateMask {
        user: false,
        positive: true,
        negative: false,
    };

    pub const NEGATIVE: UpdateMask = UpdateMask {
        user: false,
        positive: false,
        negative: true,
    };
}

impl Default for UpdateMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Step size and regularisation constants of a BPR step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BprUpdate {
    pub learn_rate: f32,
    pub reg_u: f32,
    pub reg_i: f32,
    pub reg_j: f32,
    pub bias_reg: f32,
}

impl BprUpdate {
    pub fn from_config(config: &BprConfig) -> Self {
        Self {
            learn_rate: config.learn_rate,
            reg_u: config.reg_u,
            reg_i: config.reg_i,
            reg_j: config.reg_j,
            bias_reg: config.bias_reg,
        }
    }

    /// Score difference `x_uij = x_ui - x_uj`
    pub fn score_difference<P: FactorParameters + ?Sized>(params: &P, triple: Triple) -> f64 {
        let Triple {
            user,
            positive,
            negative,
        } = triple;

        let mut x = params.bias(positive) - params.bias(negative);
        for f in 0..params.num_factors() {
            let w_uf = params.user_weight(user, f);
            x += w_uf * (params.item_weight(positive, f) - params.item_weight(negative, f));
        }

        x as f64
    }

    /// Apply one step to `params`, returning `x_uij` as it was before the step
    pub fn apply<P: FactorParameters + ?Sized>(
        &self,
        params: &mut P,
        triple: Triple,
        mask: UpdateMask,
    ) -> f64 {
        let Triple {
            user,
            positive,
            negative,
        } = triple;
        let lr = self.learn_rate;

        let x = Self::score_difference(params, triple);
        // d/dx ln σ(x) = σ(-x)
        let sigmoid_term = sigmoid(-x) as f32;

        if mask.positive {
            let b_i = params.bias(positive);
            params.set_bias(positive, b_i + lr * (sigmoid_term - self.bias_reg * b_i));
        }
        if mask.negative {
            let b_j = params.bias(negative);
            params.set_bias(negative, b_j + lr * (-sigmoid_term - self.bias_reg * b_j));
        }

        for f in 0..params.num_factors() {
            let w_uf = params.user_weight(user, f);
            let h_if = params.item_weight(positive, f);
            let h_jf = params.item_weight(negative, f);

            if mask.user {
                let delta = (h_if - h_jf) * sigmoid_term - self.reg_u * w_uf;
                params.set_user_weight(user, f, w_uf + lr * delta);
            }
            if mask.positive {
                let delta = w_uf * sigmoid_term - self.reg_i * h_if;
                params.set_item_weight(positive, f, h_if + lr * delta);
            }
            if mask.negative {
                let delta = -w_uf * sigmoid_term - self.reg_j * h_jf;
                params.set_item_weight(negative, f, h_jf + lr * delta);
            }
        }

        x
    }
}
