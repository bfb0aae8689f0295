//! PES (Prescribed Error Sensitivity) decoder learning.
//!
//! The error vector is the filtered output of one modulatory filter. It is
//! applied to decoder columns `offset..offset + width` in one of two modes:
//!
//! - **Spike**: whenever neuron `n` spikes,
//!   `decoder[n][d + offset] += learning_rate * error[d]`.
//! - **Filtered activity**: each neuron keeps an activity trace
//!   `a[n] = a[n] * decay + (spiked ? 1 - decay : 0)`; after the neuron
//!   loop every row gets `decoder[n][d + offset] += learning_rate * a[n] * error[d]`.
//!
//! Both run inside the tick, after the spike's decoder row has been added to
//! the output, so the decoder matrix never needs extra synchronisation.

use alloc::vec::Vec;

use crate::config::PesConfig;
use crate::error::{try_alloc, EnsembleError};
use crate::numeric::Fixed;

#[derive(Clone, Debug)]
struct ActivityTrace {
    decay: Fixed,
    one_minus_decay: Fixed,
    values: Vec<Fixed>,
}

#[derive(Clone, Debug)]
pub struct Pes {
    learning_rate: Fixed,
    error_filter_index: usize,
    decoder_output_offset: usize,
    activity: Option<ActivityTrace>,
}

impl Pes {
    pub fn new(cfg: &PesConfig, n_neurons: usize) -> Result<Self, EnsembleError> {
        let activity = match cfg.activity_decay {
            Some(decay) => {
                if decay < Fixed::ZERO || decay > Fixed::ONE {
                    return Err(EnsembleError::CoefficientOutOfRange {
                        field: "pes activity_decay",
                    });
                }
                Some(ActivityTrace {
                    decay,
                    one_minus_decay: Fixed::ONE - decay,
                    values: try_alloc("pes filtered activity", n_neurons, Fixed::ZERO)?,
                })
            }
            None => None,
        };

        log::info!(
            "[PES] learning rate: {}, error filter: {}, decoder offset: {}, activity trace: {}",
            cfg.learning_rate,
            cfg.error_filter_index,
            cfg.decoder_output_offset,
            activity.is_some()
        );

        Ok(Self {
            learning_rate: cfg.learning_rate,
            error_filter_index: cfg.error_filter_index,
            decoder_output_offset: cfg.decoder_output_offset,
            activity,
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.learning_rate > Fixed::ZERO
    }

    pub fn error_filter_index(&self) -> usize {
        self.error_filter_index
    }

    pub fn learning_rate(&self) -> Fixed {
        self.learning_rate
    }

    pub fn filtered_activity(&self) -> Option<&[Fixed]> {
        self.activity.as_ref().map(|a| a.values.as_slice())
    }

    /// Per-neuron hook, run after the neuron's output has been accumulated.
    #[inline]
    pub fn neuron_updated(
        &mut self,
        n: usize,
        spiked: bool,
        error: &[Fixed],
        decoder_row: &mut [Fixed],
    ) {
        if !self.is_enabled() {
            return;
        }
        match &mut self.activity {
            Some(trace) => {
                let a = &mut trace.values[n];
                *a = a.saturating_mul(trace.decay);
                if spiked {
                    *a = a.saturating_add(trace.one_minus_decay);
                }
            }
            None if spiked => {
                apply(
                    self.learning_rate,
                    self.decoder_output_offset,
                    error,
                    decoder_row,
                );
            }
            None => {}
        }
    }

    /// End-of-tick update for the filtered-activity mode.
    pub fn end_tick(&self, error: &[Fixed], decoders: &mut [Fixed], n_output_dimensions: usize) {
        if !self.is_enabled() {
            return;
        }
        let Some(trace) = &self.activity else {
            return;
        };
        for (row, activity) in decoders
            .chunks_exact_mut(n_output_dimensions)
            .zip(&trace.values)
        {
            let rate = self.learning_rate.saturating_mul(*activity);
            apply(rate, self.decoder_output_offset, error, row);
        }
    }
}

#[inline]
fn apply(rate: Fixed, offset: usize, error: &[Fixed], decoder_row: &mut [Fixed]) {
    for (decoder, e) in decoder_row[offset..].iter_mut().zip(error) {
        *decoder = decoder.saturating_add(rate.saturating_mul(*e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn cfg(rate: f64, offset: usize, activity_decay: Option<f64>) -> PesConfig {
        PesConfig {
            learning_rate: Fixed::from_num(rate),
            error_filter_index: 0,
            decoder_output_offset: offset,
            activity_decay: activity_decay.map(Fixed::from_num),
        }
    }

    #[test]
    fn test_spike_mode_updates_offset_columns() {
        let mut pes = Pes::new(&cfg(0.5, 1, None), 1).unwrap();
        let error = [Fixed::from_num(0.5), Fixed::from_num(-1)];
        let mut row = vec![Fixed::ZERO; 3];

        pes.neuron_updated(0, false, &error, &mut row);
        assert_eq!(row, vec![Fixed::ZERO; 3]);

        pes.neuron_updated(0, true, &error, &mut row);
        assert_eq!(
            row,
            vec![Fixed::ZERO, Fixed::from_num(0.25), Fixed::from_num(-0.5)]
        );
    }

    #[test]
    fn test_zero_rate_disables_learning() {
        let mut pes = Pes::new(&cfg(0.0, 0, None), 1).unwrap();
        let mut row = vec![Fixed::ONE];
        pes.neuron_updated(0, true, &[Fixed::ONE], &mut row);
        assert_eq!(row, vec![Fixed::ONE]);
    }

    #[test]
    fn test_activity_trace_mode() {
        let mut pes = Pes::new(&cfg(1.0, 0, Some(0.5)), 2).unwrap();
        let error = [Fixed::ONE];
        let mut decoders = vec![Fixed::ZERO; 2];

        // Neuron 0 spikes, neuron 1 does not
        pes.neuron_updated(0, true, &error, &mut decoders[0..1]);
        pes.neuron_updated(1, false, &error, &mut decoders[1..2]);
        // Spikes alone do not touch decoders in this mode
        assert_eq!(decoders, vec![Fixed::ZERO; 2]);
        assert_eq!(
            pes.filtered_activity().unwrap(),
            &[Fixed::from_num(0.5), Fixed::ZERO]
        );

        pes.end_tick(&error, &mut decoders, 1);
        assert_eq!(decoders, vec![Fixed::from_num(0.5), Fixed::ZERO]);
    }
}
