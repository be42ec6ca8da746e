//! End-to-end behavior of [`Simulation`] on the software device.
//!
//! Run with: `cargo test --package forcetex-engine --test simulation_behavior`

use forcetex_core::{InputLink, InputNode, SimulationConfig, ALPHA_MIN};
use forcetex_engine::{
    link_weights, DeviceLimits, EngineError, Simulation, SimulationEvent, SoftwareDevice, Viewport,
    ZoomTransform,
};

fn config() -> SimulationConfig {
    SimulationConfig {
        space_size: 256,
        decay: 100.0,
        seed: Some(3),
        ..Default::default()
    }
}

/// Route engine logs through the test harness; `RUST_LOG=debug` shows ticks.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn simulation(config: SimulationConfig) -> Simulation {
    init_tracing();
    Simulation::new(SoftwareDevice::new(), config).unwrap()
}

/// Two linked nodes far apart, with repulsion off.
fn spring_pair() -> (Vec<InputNode>, Vec<InputLink>) {
    (
        vec![InputNode::new("a").at(100.0, 128.0), InputNode::new("b").at(140.0, 128.0)],
        vec![InputLink::new("a", "b")],
    )
}

fn run_to_end(sim: &mut Simulation, max_frames: usize) {
    for _ in 0..max_frames {
        if !sim.is_running() {
            return;
        }
        sim.frame().unwrap();
    }
    panic!("simulation still running after {max_frames} frames");
}

fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn pairwise_spread(positions: &[[f32; 2]]) -> f32 {
    let mut total = 0.0;
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            total += distance(*a, *b).powi(2);
        }
    }
    total
}

// =============================================================================
// Cooling
// =============================================================================

#[test]
fn test_alpha_follows_closed_form() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();

    let rate = 1.0 - ALPHA_MIN.powf(1.0 / 100.0);
    for _ in 0..10 {
        sim.frame().unwrap();
    }
    let expected = (1.0 - rate).powi(10);
    assert!((sim.alpha() - expected).abs() < 1e-4, "alpha {} vs {expected}", sim.alpha());
    assert!(sim.progress() > 0.0 && sim.progress() < 1.0);
}

#[test]
fn test_run_ends_with_single_end_event() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    run_to_end(&mut sim, 500);

    let events = sim.drain_events();
    assert_eq!(events.first(), Some(&SimulationEvent::Start));
    assert_eq!(events.last(), Some(&SimulationEvent::End));
    let ends = events.iter().filter(|e| **e == SimulationEvent::End).count();
    assert_eq!(ends, 1);
    assert!(sim.alpha() < ALPHA_MIN);
    assert_eq!(sim.progress(), 1.0);
}

#[test]
fn test_pause_is_idempotent_and_restart_keeps_alpha() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    sim.frame().unwrap();
    sim.drain_events();

    sim.pause();
    sim.pause();
    assert_eq!(sim.drain_events(), vec![SimulationEvent::Pause]);
    assert!(!sim.is_running());

    let alpha = sim.alpha();
    sim.restart();
    assert!(sim.is_running());
    assert_eq!(sim.alpha(), alpha);
    assert_eq!(sim.drain_events(), vec![SimulationEvent::Restart]);
}

#[test]
fn test_step_moves_nodes_without_cooling() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    sim.frame().unwrap();
    sim.drain_events();
    let alpha = sim.alpha();
    let before = sim.positions().unwrap();

    sim.step().unwrap();

    assert!(!sim.is_running());
    assert_eq!(sim.alpha(), alpha);
    let after = sim.positions().unwrap();
    assert!(distance(after[0], after[1]) < distance(before[0], before[1]));
    assert!(!sim.drain_events().iter().any(|e| matches!(e, SimulationEvent::Tick { .. })));
}

#[test]
fn test_drag_keeps_alpha_floor() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    run_to_end(&mut sim, 500);
    sim.drain_events();

    sim.set_pointer(Some([120.0, 128.0]));
    sim.set_dragging(true);
    for _ in 0..20 {
        sim.frame().unwrap();
    }

    assert!(sim.is_running());
    assert!(sim.alpha() >= 0.1 - 1e-6, "alpha {}", sim.alpha());
    assert_eq!(sim.drain_events().first(), Some(&SimulationEvent::Start));
}

// =============================================================================
// Forces
// =============================================================================

#[test]
fn test_spring_settles_at_link_distance() {
    let mut sim = simulation(SimulationConfig {
        repulsion: 0.0,
        link_distance: 10.0,
        link_dist_random_variation_range: [1.0, 1.0],
        ..config()
    });
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    run_to_end(&mut sim, 500);

    let positions = sim.positions().unwrap();
    let gap = distance(positions[0], positions[1]);
    assert!((gap - 10.0).abs() < 0.05, "gap {gap}");

    // Equal degrees pull both ends equally, so the midpoint holds.
    let mid = [
        (positions[0][0] + positions[1][0]) / 2.0,
        (positions[0][1] + positions[1][1]) / 2.0,
    ];
    assert!(distance(mid, [120.0, 128.0]) < 0.01, "midpoint {mid:?}");
}

#[test]
fn test_complete_graph_weights() {
    // Every node of K4 has degree 3.
    let (bias, strength) = link_weights(3, 3);
    assert_eq!(bias, 0.5);
    assert!((strength - (1.0f32 / 3.0).sqrt()).abs() < 1e-6);
}

#[test]
fn test_repulsion_spreads_cluster_with_either_strategy() {
    use forcetex_core::ManyBodyStrategy;

    for strategy in [ManyBodyStrategy::BoxWalk, ManyBodyStrategy::Quadtree] {
        let mut sim = simulation(SimulationConfig {
            many_body: strategy,
            link_spring: 0.0,
            ..config()
        });
        let nodes = (0..12).map(|i| InputNode::new(format!("n{i}"))).collect();
        sim.set_data(nodes, Vec::new()).unwrap();
        let before = pairwise_spread(&sim.positions().unwrap());

        for _ in 0..30 {
            sim.frame().unwrap();
        }

        let after = sim.positions().unwrap();
        assert!(after
            .iter()
            .all(|p| p.iter().all(|c| c.is_finite() && (0.0..=256.0).contains(c))));
        assert!(
            pairwise_spread(&after) > before,
            "{} did not spread the cluster",
            strategy.label()
        );
    }
}

// =============================================================================
// Data lifecycle
// =============================================================================

#[test]
fn test_same_seed_same_layout() {
    let nodes: Vec<InputNode> = (0..6).map(|i| InputNode::new(format!("n{i}"))).collect();
    let links = vec![InputLink::new("n0", "n1"), InputLink::new("n1", "n2")];

    let layout = |seed| {
        let mut sim = simulation(SimulationConfig {
            seed: Some(seed),
            ..config()
        });
        sim.set_data(nodes.clone(), links.clone()).unwrap();
        for _ in 0..5 {
            sim.frame().unwrap();
        }
        sim.positions().unwrap()
    };

    assert_eq!(layout(9), layout(9));
    assert_ne!(layout(9), layout(10));
}

#[test]
fn test_readbacks_empty_without_data() {
    let mut sim = simulation(config());
    let viewport = Viewport::new(256.0, 256.0);
    assert!(sim.positions().unwrap().is_empty());
    assert!(sim.pick(&viewport, [128.0, 128.0]).unwrap().is_none());
    assert!(sim.topology().is_none());

    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    assert_eq!(sim.positions().unwrap().len(), 2);

    sim.set_data(Vec::new(), Vec::new()).unwrap();
    assert!(sim.positions().unwrap().is_empty());
    assert!(!sim.is_running());
    assert_eq!(sim.device().live_images(), 0);

    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    sim.destroy();
    assert!(sim.positions().unwrap().is_empty());
    assert!(sim.tracked_positions().unwrap().is_empty());
}

#[test]
fn test_positions_follow_input_order() {
    let mut sim = simulation(config());
    // "hub" sorts last by degree but is first in the input.
    let nodes = vec![
        InputNode::new("hub").at(10.0, 20.0),
        InputNode::new("x").at(30.0, 40.0),
        InputNode::new("y").at(50.0, 60.0),
    ];
    let links = vec![InputLink::new("hub", "x"), InputLink::new("hub", "y")];
    sim.set_data_paused(nodes, links).unwrap();

    assert!(!sim.is_running());
    assert_eq!(
        sim.positions().unwrap(),
        vec![[10.0, 20.0], [30.0, 40.0], [50.0, 60.0]]
    );
    assert_eq!(sim.position_of("y").unwrap(), Some([50.0, 60.0]));
    assert_eq!(sim.position_of("missing").unwrap(), None);

    let mut adjacent = sim.adjacent_ids("hub");
    adjacent.sort();
    assert_eq!(adjacent, ["x", "y"]);
    assert!(sim.adjacent_ids("missing").is_empty());
}

#[test]
fn test_capacity_error_for_small_device() {
    let limits = DeviceLimits {
        max_texture_side: 4,
        ..Default::default()
    };
    init_tracing();
    let mut sim = Simulation::new(SoftwareDevice::with_limits(limits), config()).unwrap();
    let nodes = (0..17).map(|i| InputNode::new(format!("n{i}"))).collect();

    let err = sim.set_data(nodes, Vec::new()).unwrap_err();
    assert!(matches!(err, EngineError::Capacity { what: "points", side: 5, max: 4 }));
    assert!(sim.positions().unwrap().is_empty());
}

#[test]
fn test_config_rebuild_keeps_tracking() {
    let mut sim = simulation(config());
    let (nodes, links) = spring_pair();
    sim.set_data(nodes, links).unwrap();
    sim.track_nodes(&["a", "unknown"]).unwrap();
    sim.frame().unwrap();
    assert!(sim.tracked_positions().unwrap().contains_key("a"));

    let live = sim.device().live_images();
    sim.set_config(SimulationConfig {
        space_size: 512,
        ..config()
    })
    .unwrap();
    assert_eq!(sim.space_size(), Some(512));
    assert!(sim.device().live_images() <= live + 1);
    assert!(sim.is_running());

    sim.frame().unwrap();
    let tracked = sim.tracked_positions().unwrap();
    assert_eq!(tracked.len(), 1);
    assert!(tracked["a"].iter().all(|c| c.is_finite()));
}

// =============================================================================
// Picking
// =============================================================================

#[test]
fn test_pick_hit_and_miss() {
    let mut sim = simulation(config());
    let nodes = vec![InputNode::new("a").at(50.0, 50.0), InputNode::new("b").at(200.0, 200.0)];
    sim.set_data_paused(nodes, Vec::new()).unwrap();
    let viewport = Viewport::new(256.0, 256.0);

    // Default size 4 at pixel ratio 2 is an 8px disc.
    let hit = sim.pick(&viewport, [52.0, 51.0]).unwrap().unwrap();
    assert_eq!(hit.id, "a");
    assert_eq!(hit.input_index, 0);
    assert_eq!(hit.position, [50.0, 50.0]);
    assert_eq!(hit.size, 4.0);

    assert!(sim.pick(&viewport, [60.0, 50.0]).unwrap().is_none());
}

#[test]
fn test_select_area_ids() {
    let mut sim = simulation(config());
    let nodes = vec![
        InputNode::new("a").at(50.0, 50.0),
        InputNode::new("b").at(200.0, 200.0),
        InputNode::new("c").at(58.0, 45.0),
    ];
    sim.set_data_paused(nodes, Vec::new()).unwrap();
    let viewport = Viewport::new(256.0, 256.0);

    let mut ids = sim.select_area_ids(&viewport, [[60.0, 60.0], [40.0, 40.0]]).unwrap();
    ids.sort();
    assert_eq!(ids, ["a", "c"]);

    assert!(sim
        .select_area_ids(&viewport, [[100.0, 10.0], [120.0, 20.0]])
        .unwrap()
        .is_empty());
}

/// One node at (10, 10) seen at 10x zoom, so it sits at screen (100, 100).
fn zoomed_node(scale_nodes_on_zoom: bool) -> (Simulation, Viewport) {
    let mut sim = simulation(SimulationConfig {
        pixel_ratio: 2.0,
        scale_nodes_on_zoom,
        ..config()
    });
    let nodes = vec![InputNode::new("a").at(10.0, 10.0), InputNode::new("b").at(200.0, 200.0)];
    sim.set_data_paused(nodes, Vec::new()).unwrap();
    let viewport = Viewport::new(256.0, 256.0).with_transform(ZoomTransform {
        k: 10.0,
        x: 0.0,
        y: 0.0,
    });
    (sim, viewport)
}

#[test]
fn test_pick_clamps_to_max_point_size_at_high_zoom() {
    let (mut sim, viewport) = zoomed_node(true);
    // 4 * 2 * 10 = 80px, clamped to 64 / 2 = 32px.
    assert_eq!(sim.max_point_size(), 32.0);

    let hit = sim.pick(&viewport, [110.0, 100.0]).unwrap();
    assert_eq!(hit.map(|hit| hit.id), Some("a".to_string()));
    assert!(sim.pick(&viewport, [100.0, 115.0]).unwrap().is_some());
    assert!(sim.pick(&viewport, [120.0, 100.0]).unwrap().is_none());
    assert!(sim.pick(&viewport, [100.0, 83.0]).unwrap().is_none());
}

#[test]
fn test_select_area_clamps_to_max_point_size_at_high_zoom() {
    let (mut sim, viewport) = zoomed_node(true);

    // Rect edge 12px from the centre is inside the 16px radius.
    let ids = sim.select_area_ids(&viewport, [[112.0, 90.0], [130.0, 110.0]]).unwrap();
    assert_eq!(ids, ["a"]);

    // 20px away is outside it.
    let ids = sim.select_area_ids(&viewport, [[120.0, 90.0], [130.0, 110.0]]).unwrap();
    assert!(ids.is_empty());
}

#[test]
fn test_pick_without_scaling_on_zoom() {
    let (mut sim, viewport) = zoomed_node(false);
    // 4 * 2 * clamp(10 * 0.01, 1, 5) = 8px, radius 4.
    assert!(sim.pick(&viewport, [103.0, 100.0]).unwrap().is_some());
    assert!(sim.pick(&viewport, [106.0, 100.0]).unwrap().is_none());

    let ids = sim.select_area_ids(&viewport, [[102.0, 90.0], [130.0, 110.0]]).unwrap();
    assert_eq!(ids, ["a"]);
    let ids = sim.select_area_ids(&viewport, [[106.0, 90.0], [130.0, 110.0]]).unwrap();
    assert!(ids.is_empty());
}
