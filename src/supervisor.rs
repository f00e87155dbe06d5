//! Lifecycle supervisor: owns the bus, the stop signal and the registered
//! sources, runs each source on its own thread and surfaces crashes without
//! taking the siblings down.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::signal::StopSignal;
use crate::sources::Source;

const STOP_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Stopping,
}

type ErrorHook = Arc<dyn Fn(&str, &EngineError) + Send + Sync>;

pub struct Supervisor {
    bus: Arc<EventBus>,
    stop: StopSignal,
    sources: Vec<Box<dyn Source>>,
    handles: Vec<(String, JoinHandle<()>)>,
    state: SupervisorState,
    error_hook: Option<ErrorHook>,
}

impl Supervisor {
    /// The stop signal is shared with the bus so blocked publishers observe
    /// shutdown too.
    pub fn new(bus: Arc<EventBus>, stop: StopSignal) -> Self {
        Self {
            bus,
            stop,
            sources: Vec::new(),
            handles: Vec::new(),
            state: SupervisorState::Idle,
            error_hook: None,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Replace the default `log::error!` sink for source crashes.
    pub fn set_error_hook(&mut self, hook: impl Fn(&str, &EngineError) + Send + Sync + 'static) {
        self.error_hook = Some(Arc::new(hook));
    }

    pub fn register(&mut self, source: impl Source + 'static) {
        self.sources.push(Box::new(source));
    }

    /// Launch every registered source on its own named thread. No-op while
    /// already running.
    pub fn start(&mut self) {
        if self.state == SupervisorState::Running {
            return;
        }

        for mut source in self.sources.drain(..) {
            let name = source.name().to_string();
            let hook = self.error_hook.clone();
            let thread_name = name.clone();
            let spawned = thread::Builder::new().name(thread_name.clone()).spawn(move || {
                if let Err(err) = source.run() {
                    match &hook {
                        Some(hook) => hook(&thread_name, &err),
                        None => error!("[supervisor] source '{thread_name}' crashed: {err}"),
                    }
                }
            });
            match spawned {
                Ok(handle) => self.handles.push((name, handle)),
                Err(err) => error!("[supervisor] failed to spawn source '{name}': {err}"),
            }
        }

        self.state = SupervisorState::Running;
        info!("[supervisor] running with {} source task(s)", self.handles.len());
    }

    /// Set the stop signal, grant a short grace for loops to observe it,
    /// then join every source thread. No-op while idle.
    pub fn stop(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        self.state = SupervisorState::Stopping;
        self.stop.set();
        thread::sleep(STOP_GRACE);

        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("[supervisor] source '{name}' panicked");
            }
        }
        self.state = SupervisorState::Idle;
        info!("[supervisor] stopped");
    }
}
