//! Fault-injecting pass-through operator.
//!
//! Wraps one child and delegates transparently, except that a background
//! countdown may arm a one-shot failure: after the configured delay, once
//! per second, a Bernoulli trial decides whether the *next* fetch raises
//! an injected failure instead of delegating. Each instance fires at most
//! once over its lifetime; cancellation never fires it. The point is to
//! synthesize an asynchronous, randomly-timed fault independent of the
//! pull thread's timing, so fault-recovery paths outside this core get
//! exercised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::{Fetch, Operator, OperatorConfig, OperatorState, check_open, check_transition};
use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::Schema;

pub struct FailureInjector {
    child: Vec<Box<dyn Operator>>,
    delay: Duration,
    /// Per-second probability of arming the failure once the delay passed.
    failure_probability: f64,
    /// Set by the countdown; the next fetch consumes it and fails.
    armed: Arc<AtomicBool>,
    /// Latched after the single shot; the instance never fires again.
    spent: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    countdown: Option<JoinHandle<()>>,
    state: OperatorState,
}

impl FailureInjector {
    pub fn new(delay: Duration, failure_probability: f64, child: Box<dyn Operator>) -> Self {
        Self {
            child: vec![child],
            delay,
            failure_probability,
            armed: Arc::new(AtomicBool::new(false)),
            spent: Arc::new(AtomicBool::new(false)),
            stop: None,
            countdown: None,
            state: OperatorState::Uninitialized,
        }
    }

    /// Whether this instance has already fired.
    pub fn spent(&self) -> bool {
        self.spent.load(Ordering::SeqCst)
    }

    /// Consume the armed flag, failing exactly once; otherwise delegate.
    fn intercept(&mut self) -> Option<ConvoyError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Some(ConvoyError::InjectedFailure(format!(
                "failure injected after {:?}",
                self.delay
            )));
        }
        None
    }

    /// Cancel the countdown and wait for it; the armed flag is cleared
    /// afterwards so cancellation can never fire the failure.
    fn cancel_countdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.countdown.take() {
            let _ = handle.join();
        }
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Operator for FailureInjector {
    fn schema(&self) -> &Arc<Schema> {
        self.child[0].schema()
    }

    fn children(&self) -> &[Box<dyn Operator>] {
        &self.child
    }

    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> ConvoyResult<()> {
        if children.len() != 1 {
            return Err(ConvoyError::InvalidOperation {
                message: "failure injector wraps exactly one child".to_string(),
                context: format!("got {} children", children.len()),
            });
        }
        self.child = children;
        Ok(())
    }

    fn init(&mut self, config: &OperatorConfig) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Uninitialized, "init")?;
        self.child[0].init(config)?;
        self.armed.store(false, Ordering::SeqCst);

        if !self.spent() {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let armed = Arc::clone(&self.armed);
            let spent = Arc::clone(&self.spent);
            let delay = self.delay;
            let probability = self.failure_probability;
            let handle = std::thread::spawn(move || {
                // Delay phase; any message (or a dropped sender) cancels.
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => {
                        debug!("failure countdown cancelled during delay");
                        return;
                    }
                }
                let mut rng = rand::thread_rng();
                loop {
                    match stop_rx.recv_timeout(Duration::from_secs(1)) {
                        Err(RecvTimeoutError::Timeout) => {
                            if rng.gen_range(0.0..1.0) < probability {
                                spent.store(true, Ordering::SeqCst);
                                armed.store(true, Ordering::SeqCst);
                                debug!("failure armed");
                                return;
                            }
                        }
                        _ => {
                            debug!("failure countdown cancelled");
                            return;
                        }
                    }
                }
            });
            self.stop = Some(stop_tx);
            self.countdown = Some(handle);
        }
        self.state = OperatorState::Open;
        Ok(())
    }

    fn cleanup(&mut self) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Open, "cleanup")?;
        self.cancel_countdown();
        self.child[0].cleanup()?;
        self.state = OperatorState::Closed;
        Ok(())
    }

    fn fetch_next(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        if let Some(failure) = self.intercept() {
            return Err(failure);
        }
        self.child[0].fetch_next()
    }

    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        if let Some(failure) = self.intercept() {
            return Err(failure);
        }
        self.child[0].fetch_next_ready()
    }
}

impl Drop for FailureInjector {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}
