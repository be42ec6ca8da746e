//! The simulation facade tying every component to one device.

use std::collections::{HashMap, VecDeque};

use forcetex_core::{
    Accessor, InputLink, InputNode, LinkDirection, SimulationConfig, TextureLayout, Topology,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cooling::{CoolingSchedule, SimulationEvent};
use crate::device::{ImageId, RasterDevice};
use crate::forces::{CenterForce, GravityForce, PointerForce};
use crate::link::LinkForce;
use crate::many_body::ManyBodyForce;
use crate::picking::{Hit, Picker, Projection, Viewport};
use crate::pyramid::SpatialPyramid;
use crate::store::PositionStore;
use crate::tracking::Tracker;
use crate::{EngineError, Result, SoftwareDevice, Texel};

/// Alpha used when a drag wakes an idle simulation, and the floor held while
/// dragging.
const DRAG_ALPHA: f32 = 0.1;

/// Every image belonging to one loaded dataset.
#[derive(Debug)]
struct Loaded {
    topology: Topology,
    space_size: u32,
    points: TextureLayout,
    store: PositionStore,
    sizes: ImageId,
    pyramid: SpatialPyramid,
    many_body: ManyBodyForce,
    links: Vec<LinkForce>,
    center: CenterForce,
    picker: Picker,
    tracker: Option<Tracker>,
}

impl Loaded {
    fn destroy<D: RasterDevice>(self, device: &mut D) -> Topology {
        self.store.destroy(device);
        device.destroy_image(self.sizes);
        self.pyramid.destroy(device);
        self.many_body.destroy(device);
        for link in self.links {
            link.destroy(device);
        }
        self.center.destroy(device);
        self.picker.destroy(device);
        if let Some(tracker) = self.tracker {
            tracker.destroy(device);
        }
        self.topology
    }
}

/// A force-directed layout running on a raster device.
///
/// Call [`frame`](Self::frame) once per animation callback. Readbacks
/// (`positions`, `pick`, `select_area`, `tracked_positions`) block until the
/// device is done and return empty results when nothing is loaded.
#[derive(Debug)]
pub struct Simulation<D: RasterDevice = SoftwareDevice> {
    device: D,
    config: SimulationConfig,
    cooling: CoolingSchedule,
    events: VecDeque<SimulationEvent>,
    size_accessor: Option<Accessor<f32>>,
    pointer: Option<[f32; 2]>,
    dragging: bool,
    tracked_ids: Vec<String>,
    state: Option<Loaded>,
}

impl<D: RasterDevice> Simulation<D> {
    pub fn new(device: D, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let limits = device.limits();
        tracing::info!(
            max_texture_side = limits.max_texture_side,
            max_point_size = limits.max_point_size,
            strategy = config.many_body.label(),
            "Created simulation"
        );
        Ok(Self {
            device,
            config,
            cooling: CoolingSchedule::new(),
            events: VecDeque::new(),
            size_accessor: None,
            pointer: None,
            dragging: false,
            tracked_ids: Vec::new(),
            state: None,
        })
    }

    // =========================================================================
    // Data
    // =========================================================================

    /// Replace the graph and start at alpha 1.
    ///
    /// An empty node and link list tears everything down instead.
    pub fn set_data(&mut self, nodes: Vec<InputNode>, links: Vec<InputLink>) -> Result<()> {
        self.load(nodes, links, true)
    }

    /// Replace the graph without starting.
    pub fn set_data_paused(&mut self, nodes: Vec<InputNode>, links: Vec<InputLink>) -> Result<()> {
        self.load(nodes, links, false)
    }

    fn load(&mut self, nodes: Vec<InputNode>, links: Vec<InputLink>, start: bool) -> Result<()> {
        self.teardown();
        self.tracked_ids.clear();

        if nodes.is_empty() && links.is_empty() {
            tracing::info!("Empty data, simulation torn down");
            return Ok(());
        }

        let topology = Topology::build(nodes, links);
        let loaded = self.build(topology)?;
        tracing::info!(
            nodes = loaded.topology.node_count(),
            links = loaded.topology.complete_link_count(),
            points_side = loaded.points.side(),
            space_size = loaded.space_size,
            "Loaded graph"
        );
        self.state = Some(loaded);

        if start {
            self.start(1.0);
        }
        Ok(())
    }

    /// Allocate every image for `topology` under the current config.
    fn build(&mut self, topology: Topology) -> Result<Loaded> {
        let limits = self.device.limits();
        let points = TextureLayout::for_points(topology.node_count());
        let link_layout = TextureLayout::for_links(topology.complete_link_count());
        for (what, layout) in [("points", points), ("links", link_layout)] {
            if !layout.fits(limits.max_texture_side) {
                return Err(EngineError::Capacity {
                    what,
                    side: layout.side(),
                    max: limits.max_texture_side,
                });
            }
        }

        let config = &self.config;
        let device = &mut self.device;
        let space_size = config.effective_space_size(limits.max_texture_side);
        let levels = space_size.trailing_zeros();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Random draws happen in this order: positions, jitter, link rests.
        let store = PositionStore::create(device, &topology, points, space_size, &mut rng)?;
        let many_body = ManyBodyForce::create(device, config, space_size, points, &mut rng)?;
        let links = LinkDirection::ALL
            .iter()
            .map(|&direction| {
                LinkForce::create(device, &topology, direction, points, link_layout, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let first_level =
            ManyBodyForce::first_level(config.many_body, levels, config.repulsion_quadtree_levels);
        let pyramid = SpatialPyramid::create(device, space_size, first_level)?;
        let center = CenterForce::create(device, space_size)?;
        let sizes = device.create_image(
            points.alloc_side(),
            Some(&size_texels(&topology, points, config, self.size_accessor)),
            "sizes",
        )?;
        let picker = Picker::create(device, points, topology.node_count())?;

        let tracker = if self.tracked_ids.is_empty() {
            None
        } else {
            Some(Tracker::create(device, &topology, points, &self.tracked_ids)?)
        };

        Ok(Loaded {
            topology,
            space_size,
            points,
            store,
            sizes,
            pyramid,
            many_body,
            links,
            center,
            picker,
            tracker,
        })
    }

    fn teardown(&mut self) -> Option<Topology> {
        let state = self.state.take()?;
        self.cooling.pause();
        Some(state.destroy(&mut self.device))
    }

    /// Release every image. Readbacks return empty results afterwards.
    pub fn destroy(&mut self) {
        if self.teardown().is_some() {
            tracing::info!("Simulation destroyed");
        }
        self.tracked_ids.clear();
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// One full force and integration pass, then one cooling step.
    pub fn tick(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        let alpha = self.cooling.alpha();
        run_forces(&mut self.device, state, &self.config, alpha)?;

        self.cooling.advance(self.config.alpha_target, self.config.decay);
        let (alpha, progress) = (self.cooling.alpha(), self.cooling.progress());
        tracing::debug!(alpha, progress, "Tick");
        self.events.push_back(SimulationEvent::Tick { alpha, progress });
        Ok(())
    }

    /// The per-animation-frame callback.
    pub fn frame(&mut self) -> Result<()> {
        if self.state.is_none() {
            return Ok(());
        }

        if self.cooling.should_end() {
            self.cooling.end();
            tracing::info!(alpha = self.cooling.alpha(), "Simulation converged");
            self.events.push_back(SimulationEvent::End);
        }

        if let (true, Some(pointer)) = (self.dragging, self.pointer) {
            if !self.cooling.is_running() {
                self.start(DRAG_ALPHA);
            }
            if let Some(state) = self.state.as_mut() {
                state.store.clear_velocity(&mut self.device)?;
                PointerForce.run(
                    &mut self.device,
                    state.store.current(),
                    state.store.velocity(),
                    pointer,
                    &self.config,
                )?;
                state.store.integrate(&mut self.device, self.config.friction)?;
            }
        }

        if self.cooling.is_running() {
            self.tick()?;
            if self.dragging {
                self.cooling.hold_at_least(DRAG_ALPHA);
            }
        }

        if let Some(state) = self.state.as_ref() {
            if let Some(tracker) = &state.tracker {
                tracker.update(&mut self.device, state.store.current())?;
            }
        }
        Ok(())
    }

    /// Begin running from `alpha`. Ignored when nothing is loaded.
    pub fn start(&mut self, alpha: f32) {
        if self.state.is_none() {
            tracing::warn!("Start requested with no data loaded");
            return;
        }
        self.cooling.start(alpha);
        tracing::info!(alpha, "Simulation started");
        self.events.push_back(SimulationEvent::Start);
    }

    pub fn pause(&mut self) {
        if self.cooling.pause() {
            tracing::info!(alpha = self.cooling.alpha(), "Simulation paused");
            self.events.push_back(SimulationEvent::Pause);
        }
    }

    /// Resume without resetting alpha.
    pub fn restart(&mut self) {
        if self.state.is_none() {
            tracing::warn!("Restart requested with no data loaded");
            return;
        }
        self.cooling.restart();
        tracing::info!(alpha = self.cooling.alpha(), "Simulation restarted");
        self.events.push_back(SimulationEvent::Restart);
    }

    /// Stop running and advance positions once at the current alpha.
    pub fn step(&mut self) -> Result<()> {
        self.cooling.pause();
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        run_forces(&mut self.device, state, &self.config, self.cooling.alpha())
    }

    // =========================================================================
    // Readback
    // =========================================================================

    /// Positions in input order.
    pub fn positions(&mut self) -> Result<Vec<[f32; 2]>> {
        let Some(state) = self.state.as_ref() else {
            return Ok(Vec::new());
        };
        let sorted = state.store.read(&mut self.device)?;
        let topology = &state.topology;
        Ok((0..topology.node_count())
            .map(|input| {
                topology
                    .sorted_index_of(input)
                    .and_then(|sorted_index| sorted.get(sorted_index))
                    .copied()
                    .unwrap_or_default()
            })
            .collect())
    }

    /// Positions keyed by id; a duplicated id reports its last node.
    pub fn positions_by_id(&mut self) -> Result<HashMap<String, [f32; 2]>> {
        let positions = self.positions()?;
        let Some(state) = self.state.as_ref() else {
            return Ok(HashMap::new());
        };
        Ok(state
            .topology
            .nodes()
            .iter()
            .zip(positions)
            .map(|(node, position)| (node.id.clone(), position))
            .collect())
    }

    pub fn position_of(&mut self, id: &str) -> Result<Option<[f32; 2]>> {
        let Some(input) = self
            .state
            .as_ref()
            .and_then(|state| state.topology.input_index_by_id(id))
        else {
            return Ok(None);
        };
        Ok(self.positions()?.get(input).copied())
    }

    /// The topmost node under a screen-space pointer.
    pub fn pick(&mut self, viewport: &Viewport, pointer: [f32; 2]) -> Result<Option<Hit>> {
        let projection = self.projection(viewport);
        let Some(state) = self.state.as_ref() else {
            return Ok(None);
        };
        let Some(projection) = projection else {
            return Ok(None);
        };
        let found = state.picker.hover(
            &mut self.device,
            state.store.current(),
            state.sizes,
            projection,
            pointer,
        )?;

        Ok(found.and_then(|(sorted_index, size, position)| {
            let input_index = state.topology.input_index_of(sorted_index)?;
            let node = state.topology.node_by_sorted(sorted_index)?;
            Some(Hit {
                sorted_index,
                input_index,
                id: node.id.clone(),
                size,
                position,
            })
        }))
    }

    /// Sorted indices of nodes inside the screen rectangle spanned by two corners.
    pub fn select_area(&mut self, viewport: &Viewport, corners: [[f32; 2]; 2]) -> Result<Vec<usize>> {
        let projection = self.projection(viewport);
        let (Some(state), Some(projection)) = (self.state.as_ref(), projection) else {
            return Ok(Vec::new());
        };
        state.picker.select_area(
            &mut self.device,
            state.store.current(),
            state.sizes,
            projection,
            corners,
        )
    }

    /// Like [`select_area`](Self::select_area), mapped to ids.
    pub fn select_area_ids(&mut self, viewport: &Viewport, corners: [[f32; 2]; 2]) -> Result<Vec<String>> {
        let selected = self.select_area(viewport, corners)?;
        let Some(state) = self.state.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(selected
            .into_iter()
            .filter_map(|sorted| state.topology.node_by_sorted(sorted))
            .map(|node| node.id.clone())
            .collect())
    }

    fn projection(&self, viewport: &Viewport) -> Option<Projection> {
        let state = self.state.as_ref()?;
        Some(Projection::new(
            viewport,
            &self.config,
            state.space_size,
            self.max_point_size(),
        ))
    }

    /// Follow these nodes' positions every frame. Replaces earlier ids.
    pub fn track_nodes<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        self.tracked_ids = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        if let Some(old) = state.tracker.take() {
            old.destroy(&mut self.device);
        }
        let tracker = Tracker::create(&mut self.device, &state.topology, state.points, &self.tracked_ids)?;
        tracker.update(&mut self.device, state.store.current())?;
        state.tracker = Some(tracker);
        Ok(())
    }

    /// Positions gathered for tracked nodes at the last frame.
    pub fn tracked_positions(&mut self) -> Result<HashMap<String, [f32; 2]>> {
        let Some(tracker) = self.state.as_ref().and_then(|state| state.tracker.as_ref()) else {
            return Ok(HashMap::new());
        };
        Ok(tracker.read(&mut self.device)?.into_iter().collect())
    }

    /// Ids linked to `id` in either direction.
    pub fn adjacent_ids(&self, id: &str) -> Vec<String> {
        self.state
            .as_ref()
            .and_then(|state| state.topology.adjacent_ids(id))
            .map(|ids| ids.into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Interaction and configuration
    // =========================================================================

    /// Pointer position in simulation space, `None` when it left the canvas.
    pub fn set_pointer(&mut self, pointer: Option<[f32; 2]>) {
        self.pointer = pointer;
    }

    /// Whether a repelling drag is in progress.
    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    /// Apply a new config, rebuilding images only when the layout changes.
    pub fn set_config(&mut self, next: SimulationConfig) -> Result<()> {
        next.validate()?;
        let rebuild = self.config.requires_rebuild(&next);
        let refresh_sizes = self.config.requires_size_refresh(&next);
        self.config = next;

        if rebuild {
            let was_running = self.cooling.is_running();
            if let Some(topology) = self.teardown() {
                tracing::debug!("Config changed image layout, rebuilding");
                let loaded = self.build(topology)?;
                self.state = Some(loaded);
                if was_running {
                    self.start(1.0);
                }
            }
        } else if refresh_sizes {
            self.refresh_sizes()?;
        }
        Ok(())
    }

    /// Size every node with `accessor`, or with its own size when `None`.
    pub fn set_point_size(&mut self, accessor: Option<Accessor<f32>>) -> Result<()> {
        self.size_accessor = accessor;
        self.refresh_sizes()
    }

    fn refresh_sizes(&mut self) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        let texels = size_texels(&state.topology, state.points, &self.config, self.size_accessor);
        self.device.write_image(state.sizes, &texels)
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn alpha(&self) -> f32 {
        self.cooling.alpha()
    }

    pub fn progress(&self) -> f32 {
        self.cooling.progress()
    }

    pub fn is_running(&self) -> bool {
        self.cooling.is_running()
    }

    /// Take every event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        self.events.drain(..).collect()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.state.as_ref().map(|state| &state.topology)
    }

    /// Space size in effect after clamping to the device.
    pub fn space_size(&self) -> Option<u32> {
        self.state.as_ref().map(|state| state.space_size)
    }

    /// Largest on-screen node diameter in screen pixels.
    pub fn max_point_size(&self) -> f32 {
        self.device.limits().max_point_size / self.config.pixel_ratio
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

/// Clear velocity, add every enabled force, integrate.
fn run_forces<D: RasterDevice>(
    device: &mut D,
    state: &mut Loaded,
    config: &SimulationConfig,
    alpha: f32,
) -> Result<()> {
    let positions = state.store.current();
    let velocity = state.store.velocity();
    let count = state.store.count();

    state.store.clear_velocity(device)?;
    if config.repulsion != 0.0 {
        state.pyramid.rebuild(device, positions, count)?;
        state
            .many_body
            .run(device, &state.pyramid, positions, velocity, alpha, config)?;
    }
    if config.link_spring != 0.0 {
        for link in &state.links {
            link.run(device, positions, velocity, alpha, config)?;
        }
    }
    if config.gravity != 0.0 {
        GravityForce.run(device, positions, velocity, alpha, config, state.space_size)?;
    }
    if config.center != 0.0 {
        state
            .center
            .run(device, positions, count, velocity, alpha, config)?;
    }
    state.store.integrate(device, config.friction)
}

/// Node sizes in sorted order: accessor, then the node's own size, then the default.
fn size_texels(
    topology: &Topology,
    points: TextureLayout,
    config: &SimulationConfig,
    accessor: Option<Accessor<f32>>,
) -> Vec<Texel> {
    let side = points.alloc_side() as usize;
    let mut texels = vec![Texel::ZERO; side * side];
    for (input, node) in topology.nodes().iter().enumerate() {
        let size = match accessor {
            Some(accessor) => accessor.resolve(node, input),
            None => node.size.unwrap_or(config.node_size),
        };
        if let Some(sorted) = topology.sorted_index_of(input) {
            texels[sorted] = Texel::new(size, 0.0, 0.0, 0.0);
        }
    }
    texels
}
