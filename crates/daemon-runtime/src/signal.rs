//! # Signal Trap
//!
//! SIGINT, SIGTERM and SIGQUIT are the only external triggers into the
//! lifecycle. The first interrupt or terminate starts shutdown, the next
//! two are ignored so cleanup can finish, and the fourth forces an exit.
//! SIGQUIT exits immediately, unless `DEBUG` is set, in which case it is
//! left untrapped so the runtime's default quit behavior stays available.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interrupts tolerated before cleanup is abandoned.
const MAX_INTERRUPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl TrapSignal {
    #[must_use]
    pub fn number(self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Quit => 3,
            Self::Terminate => 15,
        }
    }
}

impl fmt::Display for TrapSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapAction {
    /// Run the shutdown callback.
    Shutdown,
    /// Shutdown is already under way.
    Ignore,
    /// Exit now with this status, abandoning cleanup.
    ForceExit(i32),
}

/// Decision state for incoming signals.
#[derive(Debug, Default)]
pub struct TrapState {
    interrupts: u32,
}

impl TrapState {
    pub fn on_signal(&mut self, signal: TrapSignal) -> TrapAction {
        match signal {
            TrapSignal::Interrupt | TrapSignal::Terminate if self.interrupts < MAX_INTERRUPTS => {
                self.interrupts += 1;
                if self.interrupts == 1 {
                    TrapAction::Shutdown
                } else {
                    TrapAction::Ignore
                }
            }
            _ => TrapAction::ForceExit(128 + signal.number()),
        }
    }
}

type Callback = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// Shutdown callback that runs at most once however often it is fired.
#[derive(Clone)]
pub struct ShutdownTrigger {
    fired: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    callback: Arc<Callback>,
}

impl ShutdownTrigger {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
            callback: Arc::new(callback),
        }
    }

    /// Run the callback if nobody has yet. Returns whether this call ran it.
    pub async fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.callback)().await;
        true
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Times the callback has been started.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("fired", &self.has_fired())
            .finish_non_exhaustive()
    }
}

/// Signals the trap listens for. Interrupt and terminate are always
/// trapped so shutdown cleanup runs; quit only outside debug mode.
#[must_use]
pub fn trapped_signals(debug: bool) -> &'static [TrapSignal] {
    if debug {
        &[TrapSignal::Interrupt, TrapSignal::Terminate]
    } else {
        &[TrapSignal::Interrupt, TrapSignal::Terminate, TrapSignal::Quit]
    }
}

/// Routes process signals into a [`ShutdownTrigger`].
pub struct SignalTrap {
    trigger: ShutdownTrigger,
    debug: bool,
}

impl SignalTrap {
    /// A trap whose debug mode follows the `DEBUG` environment variable.
    #[must_use]
    pub fn new(trigger: ShutdownTrigger) -> Self {
        Self {
            trigger,
            debug: Self::debug_from_env(),
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn debug_from_env() -> bool {
        std::env::var_os("DEBUG").is_some()
    }

    #[must_use]
    pub fn signals(&self) -> &'static [TrapSignal] {
        trapped_signals(self.debug)
    }

    /// Install the handlers and start listening.
    ///
    /// A forced exit terminates the process from inside the returned task.
    #[cfg(unix)]
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = if self.signals().contains(&TrapSignal::Quit) {
            Some(signal(SignalKind::quit())?)
        } else {
            debug!("Debug mode; SIGQUIT is not trapped");
            None
        };

        Ok(tokio::spawn(async move {
            let mut state = TrapState::default();
            loop {
                let quit_recv = async {
                    match quit.as_mut() {
                        Some(quit) => quit.recv().await,
                        None => std::future::pending().await,
                    }
                };
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => TrapSignal::Interrupt,
                    Some(()) = terminate.recv() => TrapSignal::Terminate,
                    Some(()) = quit_recv => TrapSignal::Quit,
                    else => break,
                };
                self.dispatch(&mut state, received);
            }
        }))
    }

    #[cfg(not(unix))]
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        Ok(tokio::spawn(async move {
            let mut state = TrapState::default();
            while tokio::signal::ctrl_c().await.is_ok() {
                self.dispatch(&mut state, TrapSignal::Interrupt);
            }
        }))
    }

    fn dispatch(&self, state: &mut TrapState, received: TrapSignal) {
        match state.on_signal(received) {
            TrapAction::Shutdown => {
                info!(signal = %received, "Received signal, starting shutdown");
                let trigger = self.trigger.clone();
                tokio::spawn(async move {
                    trigger.fire().await;
                });
            }
            TrapAction::Ignore => {
                debug!(signal = %received, "Shutdown already in progress");
            }
            TrapAction::ForceExit(code) => {
                warn!(signal = %received, code, "Forcing exit, interrupting cleanup");
                std::process::exit(code);
            }
        }
    }
}
