//! Alpha decay and the run/idle state machine.

use forcetex_core::ALPHA_MIN;

/// Whether ticks are being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoolingState {
    Running,
    #[default]
    Idle,
}

/// Lifecycle notifications, drained by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    Start,
    Tick { alpha: f32, progress: f32 },
    End,
    Pause,
    Restart,
}

/// Simulation temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingSchedule {
    alpha: f32,
    progress: f32,
    state: CoolingState,
}

impl Default for CoolingSchedule {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            progress: 0.0,
            state: CoolingState::Idle,
        }
    }
}

impl CoolingSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset alpha and begin running.
    pub fn start(&mut self, alpha: f32) {
        self.alpha = alpha;
        self.progress = 0.0;
        self.state = CoolingState::Running;
    }

    /// Move alpha one tick toward `alpha_target`.
    pub fn advance(&mut self, alpha_target: f32, decay: f32) {
        let rate = 1.0 - ALPHA_MIN.powf(1.0 / decay);
        self.alpha += (alpha_target - self.alpha) * rate;
        self.progress = (ALPHA_MIN / self.alpha).min(1.0).sqrt();
    }

    /// Running and cooled below [`ALPHA_MIN`].
    pub fn should_end(&self) -> bool {
        self.state == CoolingState::Running && self.alpha < ALPHA_MIN
    }

    /// Settle: stop running with progress complete.
    pub fn end(&mut self) {
        self.state = CoolingState::Idle;
        self.progress = 1.0;
    }

    /// Stop running without touching alpha. Returns whether it was running.
    pub fn pause(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = CoolingState::Idle;
        was_running
    }

    /// Resume running without resetting alpha.
    pub fn restart(&mut self) {
        self.state = CoolingState::Running;
    }

    /// Keep alpha at or above `floor`, e.g. while dragging.
    pub fn hold_at_least(&mut self, floor: f32) {
        self.alpha = self.alpha.max(floor);
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        self.state == CoolingState::Running
    }

    pub fn state(&self) -> CoolingState {
        self.state
    }
}
