use rir_room::{
    BandLayout, BandingConfig, FrequencyBandSplitter, ImageSourceSimulator, MaterialTable,
    RirSimulator, RoomScene, Vec3,
};

/// Demo room at a low rate with a short decay, every surface the same material.
fn uniform_scene() -> RoomScene {
    RoomScene::demo()
        .unwrap()
        .with_timing(0.15, 15.0, 30.0)
        .with_sample_rate(8000)
        .with_materials(std::array::from_fn(|_| "concrete".to_string()))
}

fn relative_error(actual: &[f32], expected: &[f32]) -> f64 {
    let err: f64 = actual
        .iter()
        .zip(expected)
        .map(|(a, b)| ((a - b) as f64).powi(2))
        .sum();
    let norm: f64 = expected.iter().map(|&b| (b as f64).powi(2)).sum();
    (err / norm).sqrt()
}

#[test]
fn test_flat_material_reconstructs_single_pass() {
    let mut scene = uniform_scene();
    let table = MaterialTable::builtin();
    let simulator = ImageSourceSimulator::new();

    // Concrete is flat above 1 kHz; keep every band centre there.
    let config = BandingConfig {
        layout: BandLayout::Explicit {
            edges_hz: vec![2500.0, 3000.0, 3500.0],
        },
        order: 12,
        parallel: true,
    };
    let bands = FrequencyBandSplitter::new(&simulator, &table, config.clone())
        .plan(&scene)
        .unwrap();
    let absorption = bands[0].absorption;
    assert!(bands.iter().all(|b| b.absorption == absorption));

    scene = scene.with_absorption(absorption);
    let single = simulator.simulate(&scene, &absorption).unwrap();
    let split = FrequencyBandSplitter::new(&simulator, &table, config)
        .render(&scene)
        .unwrap();

    assert_eq!(split.len(), single.len());
    assert_eq!(split[0].len(), single[0].len());
    assert!(relative_error(&split[0], &single[0]) < 1e-3);
}

#[test]
fn test_multiple_receivers_each_reconstructed() {
    let scene = uniform_scene().with_receiver(Vec3::new(4.0, 1.0, 1.2));
    let table = MaterialTable::builtin();
    let simulator = ImageSourceSimulator::new();
    let config = BandingConfig {
        layout: BandLayout::Explicit {
            edges_hz: vec![2500.0, 3000.0],
        },
        order: 8,
        parallel: false,
    };
    let absorption = FrequencyBandSplitter::new(&simulator, &table, config.clone())
        .plan(&scene)
        .unwrap()[0]
        .absorption;
    let scene = scene.with_absorption(absorption);

    let single = simulator.simulate(&scene, &absorption).unwrap();
    let split = FrequencyBandSplitter::new(&simulator, &table, config)
        .render(&scene)
        .unwrap();
    assert_eq!(split.len(), 2);
    for (a, b) in split.iter().zip(&single) {
        assert!(relative_error(a, b) < 1e-3);
    }
}

#[test]
fn test_frequency_dependent_walls_change_response() {
    let scene = RoomScene::demo()
        .unwrap()
        .with_timing(0.15, 15.0, 30.0)
        .with_sample_rate(8000)
        .with_materials(std::array::from_fn(|_| "carpet_on_concrete".to_string()));
    let table = MaterialTable::builtin();
    let simulator = ImageSourceSimulator::new();
    let config = BandingConfig {
        layout: BandLayout::EqualWidth { count: 4 },
        order: 8,
        parallel: true,
    };
    let bands = FrequencyBandSplitter::new(&simulator, &table, config.clone())
        .plan(&scene)
        .unwrap();
    // Carpet absorbs far more at the top than at the bottom.
    let low = bands[0].absorption.get(rir_room::Surface::Left);
    let high = bands[3].absorption.get(rir_room::Surface::Left);
    assert!(high > 2.0 * low);

    let out = FrequencyBandSplitter::new(&simulator, &table, config)
        .render(&scene)
        .unwrap();
    assert_eq!(out[0].len(), scene.sample_count());
    assert!(out[0].iter().all(|s| s.is_finite()));
    assert!(out[0].iter().any(|s| *s != 0.0));
}
