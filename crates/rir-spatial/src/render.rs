//! End-to-end rendering: simulation, filtering, spatialization, output.

use std::sync::Arc;

use rir_dsp::{
    ChainOutput, CompositorConfig, Filter, FilterChain, FilterTiming, OutputBuffer,
    StereoCompositor,
};
use rir_room::{
    BandingConfig, Directivity, FrequencyBandSplitter, MaterialLookup, RirSimulator, RoomScene,
};

use crate::dataset::HrirLookup;
use crate::error::{Result, SpatialError};
use crate::head::{Ear, HeadPose};
use crate::hrtf::HrtfFilter;

/// How wall absorption enters the simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AbsorptionModel {
    /// One simulation with the scene's broadband coefficients.
    #[default]
    Broadband,
    /// One simulation per band with coefficients from the scene's materials.
    FrequencyDependent(BandingConfig),
}

/// Diagnostic toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Report per-filter execution times at info level.
    pub verbose: bool,
}

/// A finished impulse response.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedIr {
    /// Integer PCM ready to be written.
    pub output: OutputBuffer,
    /// Filter names joined by `_`.
    pub tag: String,
    /// Filter execution times of every processed channel, in channel order.
    pub timings: Vec<FilterTiming>,
}

/// Drives a scene through simulation, the filter chain and the compositor.
pub struct Renderer<'a> {
    simulator: &'a dyn RirSimulator,
    lookup: &'a dyn MaterialLookup,
    absorption: AbsorptionModel,
    compositor: CompositorConfig,
    options: RenderOptions,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer with broadband absorption and default output
    /// settings.
    pub fn new(simulator: &'a dyn RirSimulator, lookup: &'a dyn MaterialLookup) -> Self {
        Self {
            simulator,
            lookup,
            absorption: AbsorptionModel::default(),
            compositor: CompositorConfig::default(),
            options: RenderOptions::default(),
        }
    }

    /// Selects the absorption model.
    pub fn with_absorption(mut self, absorption: AbsorptionModel) -> Self {
        self.absorption = absorption;
        self
    }

    /// Sets the output settings. The bit depth is taken from each scene.
    pub fn with_compositor(mut self, config: CompositorConfig) -> Self {
        self.compositor = config;
        self
    }

    /// Sets the diagnostic toggles.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Renders one output per receiver of `scene`.
    ///
    /// # Errors
    ///
    /// Configuration errors (scene, bands, materials, compositor) surface
    /// before the first simulation. Filter and compositor failures are
    /// wrapped in [`SpatialError::Channel`] naming the receiver.
    pub fn render_mono(&self, scene: &RoomScene, chain: &FilterChain) -> Result<Vec<RenderedIr>> {
        scene.validate()?;
        let compositor = self.compositor_for(scene)?;
        self.check_banding(scene)?;

        let channels = self.simulate(scene)?;
        let mut rendered = Vec::with_capacity(channels.len());
        for (receiver, raw) in channels.iter().enumerate() {
            let channel = format!("receiver {receiver}");
            let processed = chain
                .apply(raw)
                .map_err(|e| SpatialError::in_channel(channel.as_str(), e))?;
            self.report(&channel, &processed.timings);
            let output = compositor
                .compose(&[processed.samples], scene.sample_rate)
                .map_err(|e| SpatialError::in_channel(channel.as_str(), e))?;
            rendered.push(RenderedIr {
                output,
                tag: processed.tag,
                timings: processed.timings,
            });
        }
        Ok(rendered)
    }

    /// Renders a two-channel binaural response for the single source of
    /// `scene` as heard by a listener at `head`.
    ///
    /// Each ear is simulated as its own receiver with `pattern`, facing
    /// outwards. The ear's HRTF filter is appended to a copy of `chain`, and
    /// both ears share one output gain.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidParameter`] unless the scene has
    /// exactly one source and the dataset matches its sample rate, and
    /// [`SpatialError::DegenerateGeometry`] when no direction exists. All
    /// of these are checked before any simulation. Per-ear simulation and
    /// filter failures are wrapped in [`SpatialError::Channel`].
    pub fn render_binaural(
        &self,
        scene: &RoomScene,
        head: &HeadPose,
        pattern: Directivity,
        chain: &FilterChain,
        dataset: Arc<dyn HrirLookup>,
    ) -> Result<RenderedIr> {
        scene.validate()?;
        let source = match scene.sources.as_slice() {
            [source] => *source,
            other => {
                return Err(SpatialError::invalid(
                    "sources",
                    format!("binaural rendering needs exactly one source, got {}", other.len()),
                ))
            }
        };
        if dataset.sample_rate() != scene.sample_rate {
            return Err(SpatialError::invalid(
                "hrtf_sample_rate",
                format!(
                    "dataset is sampled at {} Hz but the scene at {} Hz",
                    dataset.sample_rate(),
                    scene.sample_rate
                ),
            ));
        }
        let compositor = self.compositor_for(scene)?;

        let prepare = |ear: Ear| -> Result<(RoomScene, FilterChain)> {
            let ear_scene = head.ear_scene(scene, ear, pattern);
            ear_scene.validate()?;
            self.check_banding(&ear_scene)?;
            let hrtf: Arc<dyn Filter> =
                Arc::new(HrtfFilter::new(dataset.clone(), ear, source, head)?);
            Ok((ear_scene, chain.clone().with_shared(hrtf)))
        };
        let (left_scene, left_chain) = prepare(Ear::Left)?;
        let (right_scene, right_chain) = prepare(Ear::Right)?;

        let (left, right) = rayon::join(
            || self.render_ear(Ear::Left, &left_scene, &left_chain),
            || self.render_ear(Ear::Right, &right_scene, &right_chain),
        );
        let (left, right) = (left?, right?);
        self.report(Ear::Left.name(), &left.timings);
        self.report(Ear::Right.name(), &right.timings);

        let output = compositor
            .compose(&[left.samples, right.samples], scene.sample_rate)
            .map_err(|e| SpatialError::in_channel("binaural pair", e))?;
        let mut timings = left.timings;
        timings.extend(right.timings);
        Ok(RenderedIr {
            output,
            tag: left.tag,
            timings,
        })
    }

    fn render_ear(
        &self,
        ear: Ear,
        ear_scene: &RoomScene,
        chain: &FilterChain,
    ) -> Result<ChainOutput> {
        let wrap = |e: SpatialError| SpatialError::in_channel(format!("{} ear", ear.name()), e);
        let raw = self.simulate(ear_scene).map_err(wrap)?;
        let channel = raw.into_iter().next().ok_or_else(|| {
            wrap(SpatialError::invalid(
                "simulation",
                "returned no channel for the ear receiver",
            ))
        })?;
        chain.apply(&channel).map_err(|e| wrap(e.into()))
    }

    fn simulate(&self, scene: &RoomScene) -> Result<Vec<Vec<f32>>> {
        let channels = match &self.absorption {
            AbsorptionModel::Broadband => self.simulator.simulate(scene, &scene.absorption)?,
            AbsorptionModel::FrequencyDependent(config) => {
                FrequencyBandSplitter::new(self.simulator, self.lookup, config.clone())
                    .render(scene)?
            }
        };
        tracing::debug!(
            channels = channels.len(),
            samples = channels.first().map_or(0, Vec::len),
            "Raw response ready"
        );
        Ok(channels)
    }

    fn check_banding(&self, scene: &RoomScene) -> Result<()> {
        if let AbsorptionModel::FrequencyDependent(config) = &self.absorption {
            FrequencyBandSplitter::new(self.simulator, self.lookup, config.clone()).plan(scene)?;
        }
        Ok(())
    }

    fn compositor_for(&self, scene: &RoomScene) -> Result<StereoCompositor> {
        Ok(StereoCompositor::new(CompositorConfig {
            bit_depth: scene.bit_depth,
            ..self.compositor
        })?)
    }

    fn report(&self, channel: &str, timings: &[FilterTiming]) {
        for timing in timings {
            let elapsed_ms = timing.elapsed.as_secs_f64() * 1000.0;
            if self.options.verbose {
                tracing::info!(channel, filter = %timing.name, elapsed_ms, "Filter timing");
            } else {
                tracing::debug!(channel, filter = %timing.name, elapsed_ms, "Filter timing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rir_dsp::BitDepth;
    use rir_room::{
        BandLayout, ImageSourceSimulator, MaterialTable, RoomError, SurfaceAbsorption, Vec3,
    };

    use super::*;
    use crate::dataset::{HrtfDataset, HrtfGrid};

    const FS: u32 = 8000;

    /// Counts calls and returns a fixed decaying impulse per receiver.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl RirSimulator for Counting {
        fn simulate(
            &self,
            scene: &RoomScene,
            absorption: &SurfaceAbsorption,
        ) -> rir_room::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let decay = 1.0 - absorption.get(rir_room::Surface::Floor) as f32 * 0.5;
            Ok(scene
                .receivers
                .iter()
                .enumerate()
                .map(|(r, _)| {
                    (0..scene.sample_count())
                        .map(|i| if i < 20 + r { 0.0 } else { decay.powi((i - 20 - r) as i32) * 0.01 })
                        .collect()
                })
                .collect())
        }
    }

    /// Like [`Counting`], but receiver `bad` carries a NaN.
    struct Poisoned {
        bad: usize,
    }

    impl RirSimulator for Poisoned {
        fn simulate(
            &self,
            scene: &RoomScene,
            absorption: &SurfaceAbsorption,
        ) -> rir_room::Result<Vec<Vec<f32>>> {
            let mut channels = Counting::default().simulate(scene, absorption)?;
            if let Some(channel) = channels.get_mut(self.bad) {
                channel[5] = f32::NAN;
            }
            Ok(channels)
        }
    }

    /// Checks its input without changing it.
    struct Pass;

    impl Filter for Pass {
        fn apply(&self, samples: &[f32]) -> rir_dsp::Result<Vec<f32>> {
            rir_dsp::validate_buffer(self.name(), samples)?;
            Ok(samples.to_vec())
        }

        fn name(&self) -> &str {
            "Pass"
        }
    }

    struct Broken;

    impl RirSimulator for Broken {
        fn simulate(&self, _: &RoomScene, _: &SurfaceAbsorption) -> rir_room::Result<Vec<Vec<f32>>> {
            Err(RoomError::Simulation("engine offline".into()))
        }
    }

    fn scene() -> RoomScene {
        RoomScene::demo()
            .unwrap()
            .with_timing(0.15, 15.0, 30.0)
            .with_sample_rate(FS)
            .with_bit_depth(BitDepth::Int16)
    }

    fn head() -> HeadPose {
        HeadPose::new(Vec3::new(1.5, 1.5, 1.6), Vec3::new(0.0, -1.0, 0.0)).unwrap()
    }

    fn dataset() -> Arc<dyn HrirLookup> {
        Arc::new(HrtfDataset::spherical_head(HrtfGrid::cipic(), FS, 32).unwrap())
    }

    #[test]
    fn test_mono_one_output_per_receiver() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let scene = scene().with_receiver(Vec3::new(2.5, 1.0, 1.2));
        let out = Renderer::new(&sim, &table)
            .render_mono(&scene, &FilterChain::new())
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(sim.calls.load(Ordering::SeqCst), 1);
        for ir in &out {
            assert_eq!(ir.output.channels, 1);
            assert_eq!(ir.output.frames(), scene.sample_count());
            assert!(ir.tag.is_empty());
            // 3 dB ceiling on 16 bits.
            let target = (i16::MAX as f64 * 10f64.powf(-0.3)).round() as i64;
            assert!((ir.output.peak() - target).abs() <= 1);
        }
    }

    #[test]
    fn test_mono_dual_mono() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let out = Renderer::new(&sim, &table)
            .with_compositor(CompositorConfig {
                dual_mono: true,
                ..CompositorConfig::default()
            })
            .render_mono(&scene(), &FilterChain::new())
            .unwrap();
        let ir = &out[0].output;
        assert_eq!(ir.channels, 2);
        assert_eq!(ir.channel(0), ir.channel(1));
        assert_eq!(ir.bit_depth, BitDepth::Int16);
    }

    #[test]
    fn test_frequency_dependent_simulates_per_band() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let config = BandingConfig {
            layout: BandLayout::EqualWidth { count: 3 },
            order: 8,
            parallel: false,
        };
        let out = Renderer::new(&sim, &table)
            .with_absorption(AbsorptionModel::FrequencyDependent(config))
            .render_mono(&scene(), &FilterChain::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(sim.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_binaural_two_channels_with_hrtf_tag() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let ir = Renderer::new(&sim, &table)
            .render_binaural(&scene(), &head(), Directivity::Homni, &FilterChain::new(), dataset())
            .unwrap();
        assert_eq!(ir.output.channels, 2);
        assert_eq!(ir.tag, "HRTF");
        assert_eq!(ir.timings.len(), 2);
        assert_eq!(sim.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_binaural_source_on_left_is_louder_left() {
        let sim = ImageSourceSimulator::new();
        let table = MaterialTable::builtin();
        // Listener faces -y, so +x is to the left.
        let mut scene = scene();
        scene.sources = vec![Vec3::new(4.0, 1.5, 1.6)];
        let ir = Renderer::new(&sim, &table)
            .render_binaural(&scene, &head(), Directivity::Omni, &FilterChain::new(), dataset())
            .unwrap();
        let energy = |c: Vec<i32>| c.iter().map(|&s| (s as f64).powi(2)).sum::<f64>();
        assert!(energy(ir.output.channel(0)) > energy(ir.output.channel(1)));
    }

    #[test]
    fn test_binaural_rejects_before_simulating() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let renderer = Renderer::new(&sim, &table);
        let chain = FilterChain::new();

        let two_sources = scene().with_source(Vec3::new(4.0, 3.0, 1.0));
        let err = renderer
            .render_binaural(&two_sources, &head(), Directivity::Homni, &chain, dataset())
            .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidParameter { ref parameter, .. } if parameter == "sources"));

        let other_rate = Arc::new(HrtfDataset::spherical_head(HrtfGrid::cipic(), 16000, 64).unwrap());
        let err = renderer
            .render_binaural(&scene(), &head(), Directivity::Homni, &chain, other_rate)
            .unwrap_err();
        assert!(err.is_configuration());

        // Ears outside the room.
        let near_wall = HeadPose::new(Vec3::new(0.05, 2.0, 1.6), Vec3::new(0.0, 1.0, 0.0)).unwrap();
        let err = renderer
            .render_binaural(&scene(), &near_wall, Directivity::Homni, &chain, dataset())
            .unwrap_err();
        assert!(matches!(err, SpatialError::Room(_)));

        // Source at the head centre.
        let on_head = HeadPose::new(Vec3::new(3.0, 3.0, 1.8), Vec3::new(0.0, 1.0, 0.0)).unwrap();
        let err = renderer
            .render_binaural(&scene(), &on_head, Directivity::Homni, &chain, dataset())
            .unwrap_err();
        assert!(matches!(err, SpatialError::DegenerateGeometry { .. }));

        assert_eq!(sim.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_frequency_dependent_needs_materials_before_simulating() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let mut scene = scene();
        scene.materials = None;
        let err = Renderer::new(&sim, &table)
            .with_absorption(AbsorptionModel::FrequencyDependent(BandingConfig::default()))
            .render_binaural(&scene, &head(), Directivity::Homni, &FilterChain::new(), dataset())
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(sim.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_simulation_failure_propagates() {
        let table = MaterialTable::builtin();
        let err = Renderer::new(&Broken, &table)
            .render_mono(&scene(), &FilterChain::new())
            .unwrap_err();
        assert!(matches!(err, SpatialError::Room(RoomError::Simulation(_))));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_mono_failure_names_receiver() {
        let table = MaterialTable::builtin();
        let scene = scene().with_receiver(Vec3::new(2.5, 1.0, 1.2));
        let chain = FilterChain::new().with_filter(Pass);
        let err = Renderer::new(&Poisoned { bad: 1 }, &table)
            .render_mono(&scene, &chain)
            .unwrap_err();
        match &err {
            SpatialError::Channel { channel, source } => {
                assert_eq!(channel, "receiver 1");
                assert!(matches!(
                    **source,
                    SpatialError::Dsp(rir_dsp::DspError::NonFinite { index: 5, .. })
                ));
            }
            other => panic!("expected a channel error, got {other:?}"),
        }
        assert!(err.to_string().contains("receiver 1"));
    }

    #[test]
    fn test_binaural_failure_names_ear() {
        let table = MaterialTable::builtin();
        let err = Renderer::new(&Broken, &table)
            .render_binaural(&scene(), &head(), Directivity::Homni, &FilterChain::new(), dataset())
            .unwrap_err();
        assert!(matches!(
            &err,
            SpatialError::Channel { channel, source }
                if channel.ends_with(" ear")
                    && matches!(**source, SpatialError::Room(RoomError::Simulation(_)))
        ));
        assert!(!err.is_configuration());

        let chain = FilterChain::new().with_filter(Pass);
        let err = Renderer::new(&Poisoned { bad: 0 }, &table)
            .render_binaural(&scene(), &head(), Directivity::Homni, &chain, dataset())
            .unwrap_err();
        assert!(err.to_string().contains(" ear failed: Pass: non-finite sample"));
    }

    #[test]
    fn test_bad_ceiling_is_configuration_error() {
        let sim = Counting::default();
        let table = MaterialTable::builtin();
        let err = Renderer::new(&sim, &table)
            .with_compositor(CompositorConfig {
                ceiling_db: -1.0,
                ..CompositorConfig::default()
            })
            .render_mono(&scene(), &FilterChain::new())
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(sim.calls.load(Ordering::SeqCst), 0);
    }
}
