//! Trainable parameters and the module trait

use ndarray::{Array, Dimension, Ix1, Ix2, Ix3, ShapeBuilder};
use rand::Rng;

/// A value with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param<D: Dimension> {
    pub value: Array<f64, D>,
    pub grad: Array<f64, D>,
}

pub type Param1 = Param<Ix1>;
pub type Param2 = Param<Ix2>;
pub type Param3 = Param<Ix3>;

impl<D: Dimension> Param<D> {
    pub fn new(value: Array<f64, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Self { value, grad }
    }

    pub fn zeros<Sh: ShapeBuilder<Dim = D>>(shape: Sh) -> Self {
        Self::new(Array::zeros(shape))
    }

    /// Uniform initialization in `[-bound, bound)`.
    pub fn uniform<Sh, R>(shape: Sh, bound: f64, rng: &mut R) -> Self
    where
        Sh: ShapeBuilder<Dim = D>,
        R: Rng + ?Sized,
    {
        let value = if bound > 0.0 {
            Array::from_shape_simple_fn(shape, || rng.gen_range(-bound..bound))
        } else {
            Array::zeros(shape)
        };
        Self::new(value)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Visit `(flat index, value, grad)` in logical order.
    pub fn update(&mut self, mut f: impl FnMut(usize, &mut f64, f64)) {
        for (i, (v, g)) in self.value.iter_mut().zip(self.grad.iter()).enumerate() {
            f(i, v, *g);
        }
    }
}

/// Glorot-style bound for a `fan_in -> fan_out` map.
pub fn glorot_bound(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out).max(1) as f64).sqrt()
}

/// Mutable handle to a parameter of any rank.
#[derive(Debug)]
pub enum ParamMut<'a> {
    D1(&'a mut Param1),
    D2(&'a mut Param2),
    D3(&'a mut Param3),
}

impl ParamMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            ParamMut::D1(p) => p.len(),
            ParamMut::D2(p) => p.len(),
            ParamMut::D3(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zero_grad(&mut self) {
        match self {
            ParamMut::D1(p) => p.zero_grad(),
            ParamMut::D2(p) => p.zero_grad(),
            ParamMut::D3(p) => p.zero_grad(),
        }
    }

    pub fn update(&mut self, f: impl FnMut(usize, &mut f64, f64)) {
        match self {
            ParamMut::D1(p) => p.update(f),
            ParamMut::D2(p) => p.update(f),
            ParamMut::D3(p) => p.update(f),
        }
    }

    /// Squared L2 norm of the gradient.
    pub fn grad_sq_norm(&self) -> f64 {
        match self {
            ParamMut::D1(p) => p.grad.iter().map(|g| g * g).sum(),
            ParamMut::D2(p) => p.grad.iter().map(|g| g * g).sum(),
            ParamMut::D3(p) => p.grad.iter().map(|g| g * g).sum(),
        }
    }
}

impl<'a> From<&'a mut Param1> for ParamMut<'a> {
    fn from(p: &'a mut Param1) -> Self {
        ParamMut::D1(p)
    }
}

impl<'a> From<&'a mut Param2> for ParamMut<'a> {
    fn from(p: &'a mut Param2) -> Self {
        ParamMut::D2(p)
    }
}

impl<'a> From<&'a mut Param3> for ParamMut<'a> {
    fn from(p: &'a mut Param3) -> Self {
        ParamMut::D3(p)
    }
}

/// Anything holding trainable parameters.
///
/// `parameters_mut` must always yield parameters in the same order; the
/// optimizer matches its state to them by position.
pub trait Module {
    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>>;

    fn zero_grad(&mut self) {
        for mut p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    fn num_parameters(&mut self) -> usize {
        self.parameters_mut().iter().map(ParamMut::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_uniform_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let p = Param2::uniform((8, 4), 0.5, &mut rng);
        assert_eq!(p.grad.shape(), &[8, 4]);
        assert!(p.value.iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_update_and_zero_grad() {
        let mut p = Param1::zeros(3);
        p.grad.fill(2.0);
        let mut handle = ParamMut::from(&mut p);
        assert_eq!(handle.grad_sq_norm(), 12.0);
        handle.update(|i, v, g| *v = g * i as f64);
        handle.zero_grad();
        assert_eq!(p.value.to_vec(), vec![0.0, 2.0, 4.0]);
        assert!(p.grad.iter().all(|&g| g == 0.0));
    }
}
