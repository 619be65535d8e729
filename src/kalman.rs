//! Scalar Kalman filter and the noisy sine-wave simulation used to
//! visualise it.
//!
//! The signal is `sin(0.1 t)`. Each measurement adds uniform noise in
//! `[-measurement_noise, measurement_noise)` and the filter tracks it with a
//! constant-state model. The simulation stops on its own after
//! [`MAX_STEPS`] samples.

use std::time::Duration;

use rand::rngs::ThreadRng;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::RealtimeError;

/// Samples produced before the simulation stops.
pub const MAX_STEPS: u32 = 200;
pub const DEFAULT_PROCESS_NOISE: f64 = 0.01;
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 0.1;

/// Tick period at speed 1.0.
const BASE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KalmanParams {
    /// Q: variance added to the estimate on every prediction.
    pub process_noise: f64,
    /// R: variance of a single measurement.
    pub measurement_noise: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: DEFAULT_PROCESS_NOISE,
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
        }
    }
}

impl KalmanParams {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Result<Self, RealtimeError> {
        if !process_noise.is_finite() || process_noise < 0.0 {
            return Err(RealtimeError::Validation(format!(
                "process noise must be a non-negative number, got {process_noise}"
            )));
        }
        // R > 0 keeps the gain denominator away from zero.
        if !measurement_noise.is_finite() || measurement_noise <= 0.0 {
            return Err(RealtimeError::Validation(format!(
                "measurement noise must be positive, got {measurement_noise}"
            )));
        }
        Ok(Self {
            process_noise,
            measurement_noise,
        })
    }

    /// One predict/update cycle from `prev` given a new `measurement`.
    pub fn step(&self, measurement: f64, prev: &KalmanState) -> KalmanState {
        let prediction = prev.x;
        let prediction_error = prev.p + self.process_noise;

        let k = prediction_error / (prediction_error + self.measurement_noise);
        KalmanState {
            x: prediction + k * (measurement - prediction),
            p: (1.0 - k) * prediction_error,
            k,
            prediction,
            prediction_error,
        }
    }
}

/// Filter state after a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KalmanState {
    /// Estimate.
    pub x: f64,
    /// Estimate variance.
    pub p: f64,
    /// Gain used for the last update.
    pub k: f64,
    pub prediction: f64,
    pub prediction_error: f64,
}

impl Default for KalmanState {
    fn default() -> Self {
        Self {
            x: 0.0,
            p: 1.0,
            k: 0.0,
            prediction: 0.0,
            prediction_error: 1.0,
        }
    }
}

/// The noiseless signal at time step `t`.
pub fn true_value(t: u32) -> f64 {
    (f64::from(t) * 0.1).sin()
}

/// One simulated time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time_step: u32,
    pub true_value: f64,
    pub measurement: f64,
    pub filtered: f64,
    pub gain: f64,
}

impl Sample {
    pub fn measurement_error(&self) -> f64 {
        (self.measurement - self.true_value).abs()
    }

    pub fn filter_error(&self) -> f64 {
        (self.filtered - self.true_value).abs()
    }
}

/// Column-oriented history, one entry per sample, ready for charting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationData {
    pub labels: Vec<u32>,
    pub true_values: Vec<f64>,
    pub measurements: Vec<f64>,
    pub filtered_values: Vec<f64>,
    pub kalman_gains: Vec<f64>,
}

impl SimulationData {
    fn push(&mut self, sample: &Sample) {
        self.labels.push(sample.time_step);
        self.true_values.push(sample.true_value);
        self.measurements.push(sample.measurement);
        self.filtered_values.push(sample.filtered);
        self.kalman_gains.push(sample.gain);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn latest(&self) -> Option<Sample> {
        let idx = self.len().checked_sub(1)?;
        Some(Sample {
            time_step: self.labels[idx],
            true_value: self.true_values[idx],
            measurement: self.measurements[idx],
            filtered: self.filtered_values[idx],
            gain: self.kalman_gains[idx],
        })
    }
}

/// Noisy sine-wave simulation feeding a [`KalmanParams`] filter.
///
/// `params` may change between steps; the next step picks them up.
#[derive(Debug)]
pub struct Simulation<R = ThreadRng> {
    pub params: KalmanParams,
    state: KalmanState,
    time_step: u32,
    running: bool,
    speed: f64,
    data: SimulationData,
    rng: R,
}

impl Simulation<ThreadRng> {
    pub fn new(params: KalmanParams) -> Self {
        Self::with_rng(params, rand::rng())
    }
}

impl<R: Rng> Simulation<R> {
    pub fn with_rng(params: KalmanParams, rng: R) -> Self {
        Self {
            params,
            state: KalmanState::default(),
            time_step: 0,
            running: false,
            speed: 1.0,
            data: SimulationData::default(),
            rng,
        }
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }

    pub fn data(&self) -> &SimulationData {
        &self.data
    }

    pub fn time_step(&self) -> u32 {
        self.time_step
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_finished(&self) -> bool {
        self.time_step >= MAX_STEPS
    }

    pub fn start(&mut self) {
        self.running = !self.is_finished();
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Playback multiplier; 2.0 ticks twice as often.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), RealtimeError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(RealtimeError::Validation(format!(
                "speed must be positive, got {speed}"
            )));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        BASE_TICK.div_f64(self.speed)
    }

    /// True value and noisy measurement at `t`.
    pub fn measure(&mut self, t: u32) -> (f64, f64) {
        let truth = true_value(t);
        let noise = (self.rng.random::<f64>() - 0.5) * 2.0 * self.params.measurement_noise;
        (truth, truth + noise)
    }

    /// Advance one time step. Returns `None`, and stops, once
    /// [`MAX_STEPS`] samples exist.
    pub fn step(&mut self) -> Option<Sample> {
        if self.is_finished() {
            if self.running {
                debug!(steps = self.time_step, "Kalman simulation finished");
            }
            self.running = false;
            return None;
        }

        let t = self.time_step;
        let (truth, measurement) = self.measure(t);
        self.state = self.params.step(measurement, &self.state);
        let sample = Sample {
            time_step: t,
            true_value: truth,
            measurement,
            filtered: self.state.x,
            gain: self.state.k,
        };
        self.data.push(&sample);
        self.time_step += 1;
        Some(sample)
    }

    /// Clear history and filter state and stop. Params and speed are kept.
    pub fn reset(&mut self) {
        self.time_step = 0;
        self.data = SimulationData::default();
        self.state = KalmanState::default();
        self.running = false;
    }

    /// Step once per [`tick_interval`](Self::tick_interval) until the
    /// simulation finishes or `on_sample` returns `false`.
    ///
    /// Returns the number of samples produced.
    pub async fn run<F>(&mut self, mut on_sample: F) -> usize
    where
        F: FnMut(&Sample) -> bool,
    {
        self.start();
        let mut ticker = tokio::time::interval(self.tick_interval());
        let mut produced = 0;
        while self.running {
            ticker.tick().await;
            let Some(sample) = self.step() else { break };
            produced += 1;
            if !on_sample(&sample) {
                self.stop();
            }
        }
        produced
    }
}
