//! Shared lifecycle controller used by every component that has a
//! start/stop cycle governed by an external, possibly-slow dependency
//! (a radio adapter, a discovery session, the bridge itself).
//!
//! The machine tracks the caller's *requested* state independently of the
//! *actual* state, so a `stop()` issued while still `Starting` is honored
//! automatically once `notify_started()` arrives (and symmetrically for a
//! `start()` issued while `Stopping`). Internally mutex-serialized;
//! observer callbacks always run after the lock is released so an observer
//! is free to call back into the machine without deadlocking.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requested {
    Start,
    Stop,
}

/// Receives lifecycle notifications. Invoked with no internal lock held.
pub trait StateMachineObserver<E>: Send + Sync {
    fn on_start(&self) {}
    fn on_stop(&self, _error: Option<E>) {}
    fn on_failed_start(&self, _error: E) {}
}

enum Emission<E> {
    OnStart,
    OnStop(Option<E>),
    OnFailedStart(E),
}

enum Chain {
    Start,
    Stop,
}

struct Inner {
    state: State,
    requested: Requested,
}

/// The lifecycle engine. `E` is the error type the controlled component
/// reports on failure (adapter errors, stream errors, ...).
pub struct StateMachine<E> {
    inner: Mutex<Inner>,
    observer: Arc<dyn StateMachineObserver<E> + Send + Sync>,
}

impl<E: Send + 'static> StateMachine<E> {
    pub fn new(observer: Arc<dyn StateMachineObserver<E> + Send + Sync>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Idle,
                requested: Requested::Stop,
            }),
            observer,
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    fn set_state(&self, inner: &mut Inner, state: State) {
        log::debug!("{:?} -> {:?}", inner.state, state);
        inner.state = state;
    }

    fn fire(&self, emissions: Vec<Emission<E>>, chain: Option<Chain>) {
        for emission in emissions {
            match emission {
                Emission::OnStart => self.observer.on_start(),
                Emission::OnStop(err) => self.observer.on_stop(err),
                Emission::OnFailedStart(err) => self.observer.on_failed_start(err),
            }
        }
        match chain {
            Some(Chain::Start) => self.start(),
            Some(Chain::Stop) => self.stop(),
            None => {}
        }
    }

    /// Caller requests the component start.
    pub fn start(&self) {
        let mut emissions = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Idle => {
                    self.set_state(&mut inner, State::Starting);
                    inner.requested = Requested::Start;
                }
                State::Starting => {}
                State::Running => emissions.push(Emission::OnStart),
                State::Stopping => inner.requested = Requested::Start,
            }
        }
        self.fire(emissions, None);
    }

    /// Caller requests the component stop.
    pub fn stop(&self) {
        let mut emissions = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Idle => emissions.push(Emission::OnStop(None)),
                State::Starting => inner.requested = Requested::Stop,
                State::Running => {
                    self.set_state(&mut inner, State::Stopping);
                    inner.requested = Requested::Stop;
                }
                State::Stopping => {}
            }
        }
        self.fire(emissions, None);
    }

    /// The controlled component reports it finished starting.
    pub fn notify_started(&self) {
        let mut emissions = Vec::new();
        let mut chain = None;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Idle => {
                    self.set_state(&mut inner, State::Running);
                    if inner.requested == Requested::Start {
                        emissions.push(Emission::OnStart);
                    }
                }
                State::Starting => {
                    self.set_state(&mut inner, State::Running);
                    if inner.requested == Requested::Start {
                        emissions.push(Emission::OnStart);
                    } else {
                        chain = Some(Chain::Stop);
                    }
                }
                State::Running | State::Stopping => {}
            }
        }
        self.fire(emissions, chain);
    }

    /// The controlled component reports it finished stopping (or crashed
    /// while running, represented the same way).
    pub fn notify_stopped(&self, error: Option<E>) {
        let mut emissions = Vec::new();
        let mut chain = None;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Idle => {}
                State::Starting => {
                    if let Some(err) = error {
                        self.set_state(&mut inner, State::Idle);
                        emissions.push(Emission::OnFailedStart(err));
                    }
                }
                State::Running => {
                    self.set_state(&mut inner, State::Idle);
                    match error {
                        Some(err) => emissions.push(Emission::OnStop(Some(err))),
                        None => {
                            if inner.requested == Requested::Start {
                                emissions.push(Emission::OnStop(None));
                            }
                        }
                    }
                }
                State::Stopping => {
                    self.set_state(&mut inner, State::Idle);
                    let was_clean_stop = error.is_none();
                    emissions.push(Emission::OnStop(error));
                    if was_clean_stop && inner.requested == Requested::Start {
                        chain = Some(Chain::Start);
                    }
                }
            }
        }
        self.fire(emissions, chain);
    }

    /// The controlled component reports it failed to start.
    pub fn notify_failed_start(&self, error: E) {
        let mut emissions = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == State::Starting {
                let requested = inner.requested;
                self.set_state(&mut inner, State::Idle);
                emissions.push(if requested == Requested::Start {
                    Emission::OnFailedStart(error)
                } else {
                    Emission::OnStop(Some(error))
                });
            }
        }
        self.fire(emissions, None);
    }
}
