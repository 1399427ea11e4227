//! Seedable resampling for bootstrap, permutation and Monte-Carlo loops
//!
//! A `Resampler` is passed explicitly into every module that draws random
//! numbers; there is no global random source. Draws are split into fixed-size
//! chunks, each seeded from the parent generator in chunk order before any
//! worker starts, so the output is identical for a given seed regardless of
//! how many worker threads run the chunks.

use crate::error::{ImpactError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Draws per independently seeded chunk
const CHUNK_SIZE: usize = 1024;

/// Shared cancellation signal for long resampling loops
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Execution controls for resampling loops
#[derive(Debug, Clone)]
pub struct ResampleControl {
    pub cancel: CancelFlag,
    /// Yield the current thread every N draws (0 disables yielding)
    pub yield_every: usize,
    /// Worker threads used for chunked draws
    pub threads: usize,
}

impl Default for ResampleControl {
    fn default() -> Self {
        Self {
            cancel: CancelFlag::new(),
            yield_every: 1024,
            threads: 1,
        }
    }
}

/// Injectable random source for all resampling
#[derive(Debug, Clone)]
pub struct Resampler {
    rng: StdRng,
    seed: Option<u64>,
    control: ResampleControl,
}

impl Resampler {
    /// Deterministic resampler for reproducible analyses and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
            control: ResampleControl::default(),
        }
    }

    /// Resampler seeded from system entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
            control: ResampleControl::default(),
        }
    }

    pub fn from_seed_or_entropy(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn with_control(mut self, control: ResampleControl) -> Self {
        self.control = control;
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn control(&self) -> &ResampleControl {
        &self.control
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Derive an independent child resampler (same controls, fresh stream)
    pub fn fork(&mut self) -> Self {
        let seed: u64 = self.rng.gen();
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
            control: self.control.clone(),
        }
    }

    /// Run `iterations` independent draws, possibly across worker threads
    ///
    /// Returns `ImpactError::Cancelled` if the cancel flag is raised while
    /// drawing.
    pub fn run<F>(&mut self, iterations: usize, draw: F) -> Result<Vec<f64>>
    where
        F: Fn(&mut StdRng) -> f64 + Sync,
    {
        if iterations == 0 {
            return Ok(Vec::new());
        }

        let n_chunks = iterations.div_ceil(CHUNK_SIZE);
        let seeds: Vec<u64> = (0..n_chunks).map(|_| self.rng.gen()).collect();
        let threads = self.control.threads.clamp(1, n_chunks);

        if threads == 1 {
            let mut out = Vec::with_capacity(iterations);
            for (idx, &seed) in seeds.iter().enumerate() {
                let len = chunk_len(idx, iterations);
                out.extend(draw_chunk(seed, len, &draw, &self.control, iterations)?);
            }
            return Ok(out);
        }

        tracing::debug!(iterations, threads, n_chunks, "parallel resampling");

        let draw = &draw;
        let seeds = &seeds;
        let control = &self.control;

        let worker_results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    scope.spawn(move |_| -> Result<Vec<(usize, Vec<f64>)>> {
                        let mut produced = Vec::new();
                        for idx in (worker..n_chunks).step_by(threads) {
                            let len = chunk_len(idx, iterations);
                            let values = draw_chunk(seeds[idx], len, draw, control, iterations)?;
                            produced.push((idx, values));
                        }
                        Ok(produced)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(ImpactError::Computation(
                            "resampling worker panicked".to_string(),
                        ))
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| ImpactError::Computation("resampling scope panicked".to_string()))?;

        let mut chunks: Vec<Option<Vec<f64>>> = vec![None; n_chunks];
        for result in worker_results {
            for (idx, values) in result? {
                chunks[idx] = Some(values);
            }
        }

        let mut out = Vec::with_capacity(iterations);
        for chunk in chunks.into_iter().flatten() {
            out.extend(chunk);
        }
        Ok(out)
    }
}

fn chunk_len(idx: usize, iterations: usize) -> usize {
    let start = idx * CHUNK_SIZE;
    CHUNK_SIZE.min(iterations - start)
}

fn draw_chunk<F>(
    seed: u64,
    len: usize,
    draw: &F,
    control: &ResampleControl,
    requested: usize,
) -> Result<Vec<f64>>
where
    F: Fn(&mut StdRng) -> f64,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        if control.cancel.is_cancelled() {
            return Err(ImpactError::Cancelled { requested });
        }
        if control.yield_every > 0 && i > 0 && i % control.yield_every == 0 {
            std::thread::yield_now();
        }
        values.push(draw(&mut rng));
    }
    Ok(values)
}

/// Sample `data.len()` values with replacement
pub fn resample_with<R: Rng + ?Sized>(rng: &mut R, data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    (0..data.len())
        .map(|_| data[rng.gen_range(0..data.len())])
        .collect()
}

/// Mean of a bootstrap resample without materializing it
pub fn resampled_mean<R: Rng + ?Sized>(rng: &mut R, data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: f64 = (0..data.len())
        .map(|_| data[rng.gen_range(0..data.len())])
        .sum();
    sum / data.len() as f64
}

/// Shuffle in place
pub fn shuffle_with<R: Rng + ?Sized>(rng: &mut R, data: &mut [f64]) {
    data.shuffle(rng);
}

/// Standard normal variate (Box-Muller)
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
