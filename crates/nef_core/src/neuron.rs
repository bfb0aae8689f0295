use alloc::vec::Vec;
use core::fmt;

use crate::config::EnsembleConfig;
use crate::error::{checked_size, try_alloc, EnsembleError};
use crate::numeric::Fixed;

/// Persistent per-neuron state.
///
/// A neuron with a non-zero countdown is refractory: it neither integrates
/// nor spikes until the countdown reaches zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeuronState {
    pub refractory: u32,
    pub voltage: Fixed,
}

impl NeuronState {
    #[inline]
    pub fn is_refractory(&self) -> bool {
        self.refractory != 0
    }
}

impl fmt::Display for NeuronState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Neuron[v={}, ref={}]", self.voltage, self.refractory)
    }
}

/// Bias, encoders, decoders and state of N neurons.
///
/// Matrices are row-major by neuron: `encoders[n * D_in + d]` and
/// `decoders[n * D_out + d]`.
#[derive(Clone, Debug)]
pub struct NeuronBank {
    n_input_dimensions: usize,
    n_output_dimensions: usize,
    bias: Vec<Fixed>,
    encoders: Vec<Fixed>,
    decoders: Vec<Fixed>,
    state: Vec<NeuronState>,
}

impl NeuronBank {
    /// Copy the matrices out of a validated configuration.
    pub fn new(cfg: &EnsembleConfig) -> Result<Self, EnsembleError> {
        let p = &cfg.params;
        let n = p.n_neurons;
        let n_enc = checked_size("encoders", n, p.n_input_dimensions)?;
        let n_dec = checked_size("decoders", n, p.n_output_dimensions)?;

        let mut bias = try_alloc("bias", n, Fixed::ZERO)?;
        bias.copy_from_slice(&cfg.bias);
        let mut encoders = try_alloc("encoders", n_enc, Fixed::ZERO)?;
        encoders.copy_from_slice(&cfg.encoders);
        let mut decoders = try_alloc("decoders", n_dec, Fixed::ZERO)?;
        decoders.copy_from_slice(&cfg.decoders);

        Ok(Self {
            n_input_dimensions: p.n_input_dimensions,
            n_output_dimensions: p.n_output_dimensions,
            bias,
            encoders,
            decoders,
            state: try_alloc("neuron state", n, NeuronState::default())?,
        })
    }

    pub fn n_neurons(&self) -> usize {
        self.state.len()
    }

    pub fn n_input_dimensions(&self) -> usize {
        self.n_input_dimensions
    }

    pub fn n_output_dimensions(&self) -> usize {
        self.n_output_dimensions
    }

    #[inline]
    pub fn bias(&self, n: usize) -> Fixed {
        self.bias[n]
    }

    #[inline]
    pub fn encoder(&self, n: usize, d: usize) -> Fixed {
        self.encoders[n * self.n_input_dimensions + d]
    }

    #[inline]
    pub fn encoder_row(&self, n: usize) -> &[Fixed] {
        let start = n * self.n_input_dimensions;
        &self.encoders[start..start + self.n_input_dimensions]
    }

    #[inline]
    pub fn decoder(&self, n: usize, d: usize) -> Fixed {
        self.decoders[n * self.n_output_dimensions + d]
    }

    #[inline]
    pub fn decoder_row(&self, n: usize) -> &[Fixed] {
        let start = n * self.n_output_dimensions;
        &self.decoders[start..start + self.n_output_dimensions]
    }

    #[inline]
    pub fn decoder_row_mut(&mut self, n: usize) -> &mut [Fixed] {
        let start = n * self.n_output_dimensions;
        &mut self.decoders[start..start + self.n_output_dimensions]
    }

    pub fn decoders(&self) -> &[Fixed] {
        &self.decoders
    }

    pub fn decoders_mut(&mut self) -> &mut [Fixed] {
        &mut self.decoders
    }

    #[inline]
    pub fn state(&self, n: usize) -> NeuronState {
        self.state[n]
    }

    #[inline]
    pub fn state_mut(&mut self, n: usize) -> &mut NeuronState {
        &mut self.state[n]
    }

    pub fn states(&self) -> &[NeuronState] {
        &self.state
    }

    /// Membrane current from the bias and the encoded input vector.
    #[inline]
    pub fn encode(&self, n: usize, input: &[Fixed]) -> Fixed {
        self.encoder_row(n)
            .iter()
            .zip(input)
            .fold(self.bias[n], |acc, (e, x)| acc.saturating_add(e.saturating_mul(*x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleParameters;
    use alloc::vec;

    fn bank() -> NeuronBank {
        let params = EnsembleParameters::new(2, 2, 3, 2, Fixed::from_num(0.1));
        let f = |x: f64| Fixed::from_num(x);
        let cfg = EnsembleConfig::new(
            params,
            vec![f(0.5), f(-0.5)],
            vec![f(1.0), f(0.0), f(0.0), f(-1.0)],
            vec![f(0.1), f(0.2), f(0.3), f(0.4), f(0.5), f(0.6)],
            vec![1, 2, 3],
        );
        NeuronBank::new(&cfg).unwrap()
    }

    #[test]
    fn test_row_major_access() {
        let bank = bank();
        assert_eq!(bank.encoder(1, 1), Fixed::from_num(-1));
        assert_eq!(bank.decoder(1, 0), Fixed::from_num(0.4));
        assert_eq!(bank.decoder_row(0).len(), 3);
        assert_eq!(bank.decoder_row(1)[2], Fixed::from_num(0.6));
    }

    #[test]
    fn test_encode_adds_bias() {
        let bank = bank();
        let input = [Fixed::from_num(0.25), Fixed::from_num(0.5)];
        assert_eq!(bank.encode(0, &input), Fixed::from_num(0.75));
        assert_eq!(bank.encode(1, &input), Fixed::from_num(-1));
    }

    #[test]
    fn test_initial_state_is_active_at_rest() {
        let bank = bank();
        assert!(bank.states().iter().all(|s| !s.is_refractory() && s.voltage == Fixed::ZERO));
    }
}
