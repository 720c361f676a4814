//! The boundary to the acoustic propagation engine.
//!
//! [`RirSimulator`] is the only thing the rest of the workspace knows about
//! the engine: one blocking call per coefficient set, deterministic for
//! identical inputs. [`ImageSourceSimulator`] is the built-in engine.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rir_dsp::SPEED_OF_SOUND;

use crate::error::{Result, RoomError};
use crate::geometry::Vec3;
use crate::scene::{sabine_t60, RoomScene, SurfaceAbsorption};

/// A raw room impulse response engine.
pub trait RirSimulator: Send + Sync {
    /// Simulates `scene` with the given surface coefficients in place of
    /// `scene.absorption`.
    ///
    /// Returns one buffer of `scene.sample_count()` samples per receiver,
    /// with every source superposed.
    fn simulate(&self, scene: &RoomScene, absorption: &SurfaceAbsorption) -> Result<Vec<Vec<f32>>>;
}

/// Image-source engine with a diffuse noise tail.
///
/// Early reflections are traced as mirror images up to the diffuse onset.
/// After the onset, an exponentially decaying seeded noise tail continues
/// the response. The decay follows Sabine's T60 for the given coefficients
/// and the tail starts at the RMS level of the last 10 ms of images.
#[derive(Debug, Clone)]
pub struct ImageSourceSimulator {
    seed: u64,
    speed_of_sound: f64,
}

impl Default for ImageSourceSimulator {
    fn default() -> Self {
        Self {
            seed: 0x5EED_0F_A1E,
            speed_of_sound: SPEED_OF_SOUND,
        }
    }
}

impl ImageSourceSimulator {
    /// Creates an engine with the default seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different seed for the diffuse tail.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Overrides the speed of sound in m/s.
    pub fn with_speed_of_sound(mut self, speed_of_sound: f64) -> Self {
        self.speed_of_sound = speed_of_sound;
        self
    }

    fn trace_images(
        &self,
        scene: &RoomScene,
        beta: &[f64; 6],
        source: Vec3,
        receiver: Vec3,
        out: &mut [f64],
        diffuse_start: usize,
    ) -> usize {
        let fs = scene.sample_rate as f64;
        let cts = self.speed_of_sound / fs;
        // Half-width of the interpolation kernel: 4 ms either side.
        let tw = (2.0 * (0.004 * fs).round()) as usize;
        let room = scene.dimensions * (1.0 / cts);
        let src = source * (1.0 / cts);
        let rcv = receiver * (1.0 / cts);
        let receiver_axis = scene.receiver_orientation.normalized().unwrap_or_default();
        let source_axis = scene.source_orientation.normalized().unwrap_or_default();
        let horizon = diffuse_start as f64;

        let n1 = (horizon / (2.0 * room.x)).ceil() as i64;
        let n2 = (horizon / (2.0 * room.y)).ceil() as i64;
        let n3 = (horizon / (2.0 * room.z)).ceil() as i64;

        let mut kernel = vec![0.0f64; tw];
        let mut count = 0usize;
        for mx in -n1..=n1 {
            for my in -n2..=n2 {
                for mz in -n3..=n3 {
                    for q in 0..=1i64 {
                        for j in 0..=1i64 {
                            for k in 0..=1i64 {
                                let offset = Vec3::new(
                                    (1 - 2 * q) as f64 * src.x + 2.0 * mx as f64 * room.x,
                                    (1 - 2 * j) as f64 * src.y + 2.0 * my as f64 * room.y,
                                    (1 - 2 * k) as f64 * src.z + 2.0 * mz as f64 * room.z,
                                ) - rcv;
                                let dist = offset.norm();
                                if dist >= horizon {
                                    continue;
                                }

                                let refl = beta[0].powi((mx - q).abs() as i32)
                                    * beta[1].powi(mx.abs() as i32)
                                    * beta[2].powi((my - j).abs() as i32)
                                    * beta[3].powi(my.abs() as i32)
                                    * beta[4].powi((mz - k).abs() as i32)
                                    * beta[5].powi(mz.abs() as i32);

                                let arrival = offset * (1.0 / dist);
                                // Each reflection flips the source axis along the mirrored dimension.
                                let mirrored_axis = Vec3::new(
                                    (1 - 2 * q) as f64 * source_axis.x,
                                    (1 - 2 * j) as f64 * source_axis.y,
                                    (1 - 2 * k) as f64 * source_axis.z,
                                );
                                let directivity = scene.receiver_pattern.gain(receiver_axis.dot(&arrival))
                                    * scene.source_pattern.gain(mirrored_axis.dot(&-arrival));
                                let gain = directivity * refl / (4.0 * PI * dist * cts);
                                if gain == 0.0 {
                                    continue;
                                }

                                let whole = dist.floor();
                                let frac = dist - whole;
                                for (n, tap) in kernel.iter_mut().enumerate() {
                                    let t = (n as f64 - 0.5 * tw as f64 + 1.0) - frac;
                                    let window = 0.5 * (1.0 + (2.0 * PI * t / tw as f64).cos());
                                    *tap = window * sinc(PI * t);
                                }
                                let start = whole as i64 - (tw / 2) as i64 + 1;
                                for (n, tap) in kernel.iter().enumerate() {
                                    let index = start + n as i64;
                                    if index >= 0 && (index as usize) < out.len() {
                                        out[index as usize] += gain * tap;
                                    }
                                }
                                count += 1;
                            }
                        }
                    }
                }
            }
        }
        count
    }

    fn add_diffuse_tail(
        &self,
        scene: &RoomScene,
        absorption: &SurfaceAbsorption,
        out: &mut [f64],
        diffuse_start: usize,
        stream: u64,
    ) {
        if diffuse_start == 0 || diffuse_start >= out.len() {
            return;
        }
        let fs = scene.sample_rate as f64;
        let window = ((0.01 * fs).round() as usize).clamp(1, diffuse_start);
        let tail = &out[diffuse_start - window..diffuse_start];
        let level = (tail.iter().map(|s| s * s).sum::<f64>() / window as f64).sqrt();
        if level == 0.0 {
            return;
        }
        // Amplitude falls by 60 dB over T60.
        let decay = sabine_t60(&scene.dimensions, absorption)
            .map(|t60| 3.0 * std::f64::consts::LN_10 / t60)
            .unwrap_or(0.0);

        let mut rng = StdRng::seed_from_u64(self.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let amplitude = 3f64.sqrt();
        for (n, sample) in out.iter_mut().enumerate().skip(diffuse_start) {
            let t = (n - diffuse_start) as f64 / fs;
            let noise: f64 = rng.gen_range(-amplitude..amplitude);
            *sample += level * (-decay * t).exp() * noise;
        }
    }
}

impl RirSimulator for ImageSourceSimulator {
    fn simulate(&self, scene: &RoomScene, absorption: &SurfaceAbsorption) -> Result<Vec<Vec<f32>>> {
        scene.validate()?;
        if !(self.speed_of_sound.is_finite() && self.speed_of_sound > 0.0) {
            return Err(RoomError::invalid(
                "speed_of_sound",
                format!("{} m/s must be positive", self.speed_of_sound),
            ));
        }

        let fs = scene.sample_rate as f64;
        let n_samples = scene.sample_count();
        let diffuse_start = ((scene.diffuse_onset() * fs).ceil() as usize).min(n_samples);
        let beta = absorption.reflection();

        let mut channels = Vec::with_capacity(scene.receivers.len());
        for (r, &receiver) in scene.receivers.iter().enumerate() {
            let mut response = vec![0.0f64; n_samples];
            for (s, &source) in scene.sources.iter().enumerate() {
                let mut contribution = vec![0.0f64; n_samples];
                let images =
                    self.trace_images(scene, &beta, source, receiver, &mut contribution, diffuse_start);
                let stream = (r * scene.sources.len() + s) as u64 + 1;
                self.add_diffuse_tail(scene, absorption, &mut contribution, diffuse_start, stream);
                for (acc, c) in response.iter_mut().zip(&contribution) {
                    *acc += c;
                }
                tracing::debug!(receiver = r, source = s, images, "Image sources traced");
            }
            channels.push(response.into_iter().map(|s| s as f32).collect());
        }

        tracing::debug!(
            receivers = channels.len(),
            samples = n_samples,
            diffuse_start,
            "Room simulated"
        );
        Ok(channels)
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        x.sin() / x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Directivity;

    /// Small, short room that simulates quickly.
    fn small_scene() -> RoomScene {
        let absorption = SurfaceAbsorption::uniform(0.3).unwrap();
        RoomScene::new(Vec3::new(3.0, 2.5, 2.2), absorption)
            .with_source(Vec3::new(2.0, 1.5, 1.2))
            .with_receiver(Vec3::new(1.0, 1.0, 1.1))
            .with_timing(0.2, 15.0, 30.0)
            .with_sample_rate(8000)
    }

    fn peak_index(samples: &[f32]) -> usize {
        samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_output_shape() {
        let scene = small_scene().with_receiver(Vec3::new(2.5, 2.0, 1.0));
        let out = ImageSourceSimulator::new().simulate(&scene, &scene.absorption).unwrap();
        assert_eq!(out.len(), 2);
        for channel in &out {
            assert_eq!(channel.len(), scene.sample_count());
            assert!(channel.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn test_direct_path_arrival() {
        let scene = small_scene();
        let out = ImageSourceSimulator::new().simulate(&scene, &scene.absorption).unwrap();
        let distance = scene.sources[0].distance(&scene.receivers[0]);
        let expected = distance / SPEED_OF_SOUND * scene.sample_rate as f64;
        let peak = peak_index(&out[0]) as f64;
        assert!((peak - expected).abs() <= 1.0, "peak {peak}, expected {expected}");
        assert!(out[0][peak as usize] > 0.0);
    }

    #[test]
    fn test_deterministic() {
        let scene = small_scene();
        let sim = ImageSourceSimulator::new();
        let a = sim.simulate(&scene, &scene.absorption).unwrap();
        let b = sim.simulate(&scene, &scene.absorption).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_changes_only_tail() {
        let scene = small_scene();
        let a = ImageSourceSimulator::new().simulate(&scene, &scene.absorption).unwrap();
        let b = ImageSourceSimulator::new()
            .with_seed(7)
            .simulate(&scene, &scene.absorption)
            .unwrap();
        let onset = (scene.diffuse_onset() * scene.sample_rate as f64).ceil() as usize;
        assert_eq!(a[0][..onset], b[0][..onset]);
        assert_ne!(a[0][onset..], b[0][onset..]);
    }

    #[test]
    fn test_more_absorption_less_energy() {
        let scene = small_scene();
        let sim = ImageSourceSimulator::new();
        let live = sim.simulate(&scene, &SurfaceAbsorption::uniform(0.1).unwrap()).unwrap();
        let dead = sim.simulate(&scene, &SurfaceAbsorption::uniform(0.8).unwrap()).unwrap();
        let energy = |s: &[f32]| s.iter().map(|&x| (x as f64).powi(2)).sum::<f64>();
        assert!(energy(&dead[0]) < energy(&live[0]));
    }

    #[test]
    fn test_sources_superpose() {
        let base = small_scene();
        let second = Vec3::new(0.5, 2.0, 1.5);
        let sim = ImageSourceSimulator::new();
        let both = base.clone().with_source(second);
        let only_second = {
            let mut s = base.clone();
            s.sources = vec![second];
            s
        };
        let a = sim.simulate(&base, &base.absorption).unwrap();
        let b = sim.simulate(&only_second, &base.absorption).unwrap();
        let ab = sim.simulate(&both, &base.absorption).unwrap();
        // The image-source part is linear; compare before the diffuse onset.
        let onset = (base.diffuse_onset() * base.sample_rate as f64) as usize - 40;
        for i in 0..onset {
            assert!((ab[0][i] - (a[0][i] + b[0][i])).abs() < 1e-5, "sample {i}");
        }
    }

    #[test]
    fn test_half_omni_receiver_facing_away_drops_direct_path() {
        let scene = small_scene();
        let facing = Vec3::new(1.0, 0.5, 0.1);
        let toward = scene
            .clone()
            .with_receiver_pattern(Directivity::Homni, facing);
        let away = scene
            .clone()
            .with_receiver_pattern(Directivity::Homni, -facing);
        let sim = ImageSourceSimulator::new();
        let a = sim.simulate(&toward, &scene.absorption).unwrap();
        let b = sim.simulate(&away, &scene.absorption).unwrap();
        let distance = scene.sources[0].distance(&scene.receivers[0]);
        let direct = (distance / SPEED_OF_SOUND * scene.sample_rate as f64).round() as usize;
        assert!(a[0][direct].abs() > 10.0 * b[0][direct].abs());
    }

    #[test]
    fn test_invalid_scene_rejected() {
        let scene = small_scene().with_receivers(vec![]);
        let err = ImageSourceSimulator::new()
            .simulate(&scene, &scene.absorption)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
