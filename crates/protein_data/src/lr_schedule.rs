//! Step-based learning-rate schedules.
//!
//! Each schedule is a pure function from the optimizer step to a learning
//! rate; [`LrSchedule`] wraps them in one serializable enum so a training
//! config can pick the schedule by name.

use serde::{Deserialize, Serialize};

/// Linear warmup from `warmup_init_lr` to `lr`, then decay proportional to
/// `1 / sqrt(step)` so the rate is continuous at the end of warmup.
///
/// Step 0 is treated as step 1.
pub fn inverse_sqrt_lr(step: usize, warmup_steps: usize, warmup_init_lr: f64, lr: f64) -> f64 {
    let step = step.max(1) as f64;
    let warmup = warmup_steps as f64;
    if step < warmup {
        warmup_init_lr + (lr - warmup_init_lr) / warmup * step
    } else {
        lr * warmup.sqrt() / step.sqrt()
    }
}

/// The transformer schedule: `factor * model_size^-0.5 * min(step^-0.5,
/// step * warmup_steps^-1.5)`, which rises linearly through warmup and then
/// decays as `1 / sqrt(step)`.
///
/// Step 0 is treated as step 1.
pub fn noam_lr(step: usize, warmup_steps: usize, factor: f64, model_size: usize) -> f64 {
    let step = step.max(1) as f64;
    let warmup = warmup_steps as f64;
    factor * (model_size as f64).powf(-0.5) * (step.powf(-0.5)).min(step * warmup.powf(-1.5))
}

/// Linear warmup from `warmup_init_lr` to `lr`, then polynomial decay to
/// `lr_end` over the remaining steps. Past `total_steps` the rate stays at
/// `lr_end`.
#[allow(clippy::too_many_arguments)]
pub fn polynomial_lr(
    step: usize,
    total_steps: usize,
    warmup_steps: usize,
    warmup_init_lr: f64,
    lr: f64,
    lr_end: f64,
    power: f64,
) -> f64 {
    if step < warmup_steps {
        warmup_init_lr + (lr - warmup_init_lr) * step as f64 / warmup_steps as f64
    } else if step > total_steps {
        lr_end
    } else {
        let remaining =
            1.0 - (step - warmup_steps) as f64 / (total_steps - warmup_steps) as f64;
        lr_end + (lr - lr_end) * remaining.powf(power)
    }
}

/// A named learning-rate schedule with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrSchedule {
    InverseSqrt {
        warmup_steps: usize,
        warmup_init_lr: f64,
        lr: f64,
    },
    Noam {
        warmup_steps: usize,
        factor: f64,
        model_size: usize,
    },
    Polynomial {
        total_steps: usize,
        warmup_steps: usize,
        warmup_init_lr: f64,
        lr: f64,
        lr_end: f64,
        power: f64,
    },
}

impl LrSchedule {
    /// The learning rate at the given optimizer step.
    pub fn at(&self, step: usize) -> f64 {
        match *self {
            LrSchedule::InverseSqrt {
                warmup_steps,
                warmup_init_lr,
                lr,
            } => inverse_sqrt_lr(step, warmup_steps, warmup_init_lr, lr),
            LrSchedule::Noam {
                warmup_steps,
                factor,
                model_size,
            } => noam_lr(step, warmup_steps, factor, model_size),
            LrSchedule::Polynomial {
                total_steps,
                warmup_steps,
                warmup_init_lr,
                lr,
                lr_end,
                power,
            } => polynomial_lr(
                step,
                total_steps,
                warmup_steps,
                warmup_init_lr,
                lr,
                lr_end,
                power,
            ),
        }
    }
}
