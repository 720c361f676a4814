//! FFT helpers shared by the filters and the crossover bank.
//!
//! All spectral work runs in `f64`. Buffers enter and leave as `f32`.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Smallest power of two that is `>= n` (and at least 1).
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Full-length spectrum of a zero-padded real buffer.
///
/// The buffer is padded to at least twice its length so that zero-phase
/// gain curves only wrap into the padding.
#[derive(Debug, Clone)]
pub struct Spectrum {
    bins: Vec<Complex<f64>>,
    len: usize,
    sample_rate: u32,
}

impl Spectrum {
    /// Transforms `samples` into the frequency domain.
    pub fn forward(samples: &[f32], sample_rate: u32) -> Self {
        let len = samples.len();
        let fft_len = next_power_of_two(len * 2);
        let mut bins: Vec<Complex<f64>> = samples
            .iter()
            .map(|&s| Complex::new(s as f64, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_len)
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(fft_len).process(&mut bins);

        Self {
            bins,
            len,
            sample_rate,
        }
    }

    /// Number of FFT bins (the padded transform length).
    pub fn fft_len(&self) -> usize {
        self.bins.len()
    }

    /// Absolute frequency in Hz represented by `bin`.
    ///
    /// Bins above the Nyquist bin map to their mirrored positive frequency.
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        let n = self.bins.len();
        let folded = bin.min(n - bin);
        folded as f64 * self.sample_rate as f64 / n as f64
    }

    /// Applies a real gain curve (function of frequency in Hz) and returns
    /// the time-domain result truncated to the original length.
    pub fn filtered<F>(&self, gain: F) -> Vec<f32>
    where
        F: Fn(f64) -> f64,
    {
        let mut bins: Vec<Complex<f64>> = self
            .bins
            .iter()
            .enumerate()
            .map(|(k, &b)| b * gain(self.bin_frequency(k)))
            .collect();
        inverse_real(&mut bins, self.len)
    }
}

/// Applies a zero-phase gain curve to `samples`.
pub fn apply_zero_phase<F>(samples: &[f32], sample_rate: u32, gain: F) -> Vec<f32>
where
    F: Fn(f64) -> f64,
{
    Spectrum::forward(samples, sample_rate).filtered(gain)
}

/// Inverse FFT in place and return the first `len` real parts as `f32`.
fn inverse_real(bins: &mut [Complex<f64>], len: usize) -> Vec<f32> {
    let n = bins.len();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(bins);
    let scale = 1.0 / n as f64;
    bins.iter().take(len).map(|c| (c.re * scale) as f32).collect()
}

/// Linear convolution of `a` and `b` (length `a.len() + b.len() - 1`).
pub fn convolve_full(a: &[f32], b: &[f32]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let out_len = a.len() + b.len() - 1;
    let fft_len = next_power_of_two(out_len);

    let pad = |x: &[f32]| -> Vec<Complex<f64>> {
        x.iter()
            .map(|&s| Complex::new(s as f64, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_len)
            .collect()
    };
    let mut fa = pad(a);
    let mut fb = pad(b);

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    forward.process(&mut fa);
    forward.process(&mut fb);

    for (x, y) in fa.iter_mut().zip(fb.iter()) {
        *x *= *y;
    }
    planner.plan_fft_inverse(fft_len).process(&mut fa);

    let scale = 1.0 / fft_len as f64;
    fa.iter().take(out_len).map(|c| c.re * scale).collect()
}

/// Centered convolution whose output has the length of the longer input.
///
/// The output window starts `(min_len - 1) / 2` samples into the full
/// convolution, so a kernel with its peak at that index does not shift the
/// signal.
pub fn convolve_same(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    let full = convolve_full(signal, kernel);
    if full.is_empty() {
        return Vec::new();
    }
    let out_len = signal.len().max(kernel.len());
    let start = (signal.len().min(kernel.len()) - 1) / 2;
    full[start..start + out_len]
        .iter()
        .map(|&v| v as f32)
        .collect()
}
