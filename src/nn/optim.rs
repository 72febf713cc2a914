//! AdamW optimizer

use serde::{Deserialize, Serialize};

use super::parameter::ParamMut;
use crate::error::{Result, TabFrameError};

/// AdamW hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

impl AdamWConfig {
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

/// Adam with decoupled weight decay.
///
/// Moment buffers are created on the first step and matched to parameters by
/// position in the list passed to [`AdamW::step`].
#[derive(Debug, Clone)]
pub struct AdamW {
    config: AdamWConfig,
    t: u64,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl AdamW {
    pub fn new(config: AdamWConfig) -> Result<Self> {
        if !(config.lr > 0.0) {
            return Err(TabFrameError::InvalidParameter {
                name: "lr".to_string(),
                value: config.lr.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&config.beta1) || !(0.0..1.0).contains(&config.beta2) {
            return Err(TabFrameError::InvalidParameter {
                name: "betas".to_string(),
                value: format!("({}, {})", config.beta1, config.beta2),
                reason: "must lie in [0, 1)".to_string(),
            });
        }
        Ok(Self {
            config,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        })
    }

    pub fn config(&self) -> &AdamWConfig {
        &self.config
    }

    pub fn steps_taken(&self) -> u64 {
        self.t
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.config.lr = lr;
    }

    /// Apply one update using the gradients currently stored in `params`.
    pub fn step(&mut self, mut params: Vec<ParamMut<'_>>) -> Result<()> {
        if self.m.is_empty() {
            self.m = params.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = self.m.clone();
        }
        if self.m.len() != params.len() || self.m.iter().zip(&params).any(|(m, p)| m.len() != p.len()) {
            return Err(TabFrameError::ValidationError(
                "parameter layout changed since the first optimizer step".to_string(),
            ));
        }

        self.t += 1;
        let AdamWConfig {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.config;
        let bias1 = 1.0 - beta1.powi(self.t as i32);
        let bias2 = 1.0 - beta2.powi(self.t as i32);

        for ((param, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            param.update(|i, value, grad| {
                *value *= 1.0 - lr * weight_decay;
                m[i] = beta1 * m[i] + (1.0 - beta1) * grad;
                v[i] = beta2 * v[i] + (1.0 - beta2) * grad * grad;
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                *value -= lr * m_hat / (v_hat.sqrt() + eps);
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::parameter::Param1;

    #[test]
    fn test_minimizes_quadratic() {
        // f(w) = sum (w - 3)^2
        let mut w = Param1::zeros(4);
        let mut opt = AdamW::new(AdamWConfig::default().with_lr(0.1).with_weight_decay(0.0)).unwrap();
        for _ in 0..500 {
            w.grad = w.value.mapv(|v| 2.0 * (v - 3.0));
            opt.step(vec![ParamMut::from(&mut w)]).unwrap();
        }
        assert!(w.value.iter().all(|v| (v - 3.0).abs() < 1e-2), "{:?}", w.value);
        assert_eq!(opt.steps_taken(), 500);
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut w = Param1::zeros(1);
        w.grad.fill(5.0);
        let mut opt = AdamW::new(AdamWConfig::default().with_lr(0.01)).unwrap();
        opt.step(vec![ParamMut::from(&mut w)]).unwrap();
        assert!((w.value[0] + 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_layout_change_rejected() {
        let mut a = Param1::zeros(2);
        let mut b = Param1::zeros(3);
        let mut opt = AdamW::new(AdamWConfig::default()).unwrap();
        opt.step(vec![ParamMut::from(&mut a)]).unwrap();
        assert!(opt.step(vec![ParamMut::from(&mut b)]).is_err());
    }

    #[test]
    fn test_invalid_config() {
        assert!(AdamW::new(AdamWConfig::default().with_lr(0.0)).is_err());
        assert!(AdamW::new(AdamWConfig::default().with_betas(1.0, 0.9)).is_err());
    }
}
