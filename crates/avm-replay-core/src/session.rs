//! Debug session: stepping and breakpoints on top of the replay engine.
//!
//! A [`DebugSession`] owns one [`TraceReplayEngine`] and turns single engine
//! steps into the usual debugger operations. Each operation returns the
//! [`StopReason`] and also queues a [`DebugEvent`] for a protocol layer to
//! forward.
//!
//! ## Usage
//!
//! ```ignore
//! let mut session = DebugSession::load(trace, &registry, ReplayConfig::from_env())?;
//! session.set_breakpoints("contracts/approval.teal", &[BreakpointRequest::line(12)]);
//! session.launch()?;
//! while session.continue_(false)? != StopReason::End {
//!     println!("{:?}", session.engine().call_stack());
//! }
//! ```

use tracing::info;

use avm_replay_types::SimulateTrace;

use crate::breakpoints::{reachable_locations, Breakpoint, BreakpointRequest, BreakpointTable};
use crate::config::ReplayConfig;
use crate::engine::{StepResult, TraceReplayEngine};
use crate::errors::ReplayResult;
use crate::source::SourceRegistry;

/// Why the session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint(u64),
    Exception(String),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Stopped(StopReason),
    BreakpointVerified(Breakpoint),
}

pub struct DebugSession {
    engine: TraceReplayEngine,
    config: ReplayConfig,
    breakpoints: BreakpointTable,
    events: Vec<DebugEvent>,
}

impl DebugSession {
    pub fn new(engine: TraceReplayEngine, config: ReplayConfig) -> Self {
        Self {
            engine,
            config,
            breakpoints: BreakpointTable::new(),
            events: Vec::new(),
        }
    }

    /// Load `trace` and wrap it in a session.
    pub fn load(
        trace: SimulateTrace,
        registry: &dyn SourceRegistry,
        config: ReplayConfig,
    ) -> ReplayResult<Self> {
        let engine = TraceReplayEngine::load_resources(trace, registry)?;
        Ok(Self::new(engine, config))
    }

    pub fn engine(&self) -> &TraceReplayEngine {
        &self.engine
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<DebugEvent> {
        std::mem::take(&mut self.events)
    }

    /// Report the entry stop, or run to the first breakpoint when
    /// `stop_on_entry` is off.
    pub fn launch(&mut self) -> ReplayResult<StopReason> {
        if self.config.stop_on_entry {
            Ok(self.stop(StopReason::Entry))
        } else {
            self.continue_(false)
        }
    }

    /// Replace the breakpoints of `source` and verify them.
    pub fn set_breakpoints(&mut self, source: &str, requests: &[BreakpointRequest]) -> Vec<Breakpoint> {
        let source = self.config.resolve_source(source);
        self.breakpoints.set(&source, requests);
        self.verify_source(&source);
        self.breakpoints.breakpoints(&source).to_vec()
    }

    /// Verify every pending breakpoint, returning the newly verified ones.
    pub fn verify_breakpoints(&mut self) -> Vec<Breakpoint> {
        let mut verified = Vec::new();
        for source in self.breakpoints.sources() {
            verified.extend(self.verify_source(&source));
        }
        verified
    }

    pub fn breakpoints(&self, source: &str) -> Vec<Breakpoint> {
        self.breakpoints
            .breakpoints(&self.config.resolve_source(source))
            .to_vec()
    }

    fn verify_source(&mut self, source: &str) -> Vec<Breakpoint> {
        let config = &self.config;
        let reachable =
            reachable_locations(self.engine.programs(), source, |file| config.resolve_source(file));
        let verified = self.breakpoints.verify(source, &reachable);
        for bp in &verified {
            self.events.push(DebugEvent::BreakpointVerified(bp.clone()));
        }
        verified
    }

    pub fn continue_(&mut self, reverse: bool) -> ReplayResult<StopReason> {
        self.run(reverse, |_| false)
    }

    /// Step until the call stack is back at (or above) the current depth.
    pub fn step_over(&mut self, reverse: bool) -> ReplayResult<StopReason> {
        let start = self.engine.depth();
        self.run(reverse, move |depth| depth <= start)
    }

    /// Exactly one engine step.
    pub fn step_in(&mut self, reverse: bool) -> ReplayResult<StopReason> {
        self.run(reverse, |_| true)
    }

    /// Step until the enclosing program frame is left.
    pub fn step_out(&mut self, reverse: bool) -> ReplayResult<StopReason> {
        let start = self.engine.depth();
        self.run(reverse, move |depth| depth < start.saturating_sub(1))
    }

    fn run(&mut self, reverse: bool, done: impl Fn(usize) -> bool) -> ReplayResult<StopReason> {
        loop {
            let result = if reverse {
                self.engine.backward()?
            } else {
                self.engine.forward()?
            };
            match result {
                StepResult::End if reverse => return Ok(self.stop(StopReason::Entry)),
                StepResult::End => return Ok(self.stop(StopReason::End)),
                StepResult::Exception(message) => {
                    return Ok(self.stop(StopReason::Exception(message)))
                }
                StepResult::Ok => {}
            }
            if reverse && self.engine.is_at_start() {
                return Ok(self.stop(StopReason::Entry));
            }
            if done(self.engine.depth()) {
                return Ok(self.stop(StopReason::Step));
            }
            if let Some(id) = self.breakpoint_hit() {
                return Ok(self.stop(StopReason::Breakpoint(id)));
            }
        }
    }

    fn breakpoint_hit(&self) -> Option<u64> {
        let location = self.engine.current_source_location()?;
        let source = self.config.resolve_source(&location.file);
        self.breakpoints.hit(&source, location.location)
    }

    fn stop(&mut self, reason: StopReason) -> StopReason {
        info!(reason = ?reason, depth = self.engine.depth(), "replay stopped");
        self.events.push(DebugEvent::Stopped(reason.clone()));
        reason
    }
}
