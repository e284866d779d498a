//! Mainloop integration hooks (component H).
//!
//! These traits describe the five kinds of collaborator a mainloop
//! implementation can offer the runtime; `deai-core` never depends on any
//! of them directly (it only deals in objects and signals). `MioLoop` is
//! the one concrete implementation this crate ships, built on `mio` for
//! fd/timer readiness and `nix` for child reaping, grounded in the
//! original event loop's `ev_io`/`ev_timer`/`ev_child`/`ev_prepare`
//! watcher split.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use nix::sys::signal::{self, SigHandler, Signal as UnixSignal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use deai_core::error::DiError;

/// Readiness notification for a single file descriptor.
pub trait FdEvents {
    fn watch(&mut self, fd: RawFd, readable: bool, writable: bool) -> Result<Token, DiError>;
    fn unwatch(&mut self, token: Token) -> Result<(), DiError>;
}

/// A one-shot or repeating timer source.
pub trait TimerSource {
    fn arm(&mut self, after: Duration) -> Result<Token, DiError>;
    fn cancel(&mut self, token: Token) -> Result<(), DiError>;
}

/// A source that fires on a fixed period rather than once.
pub trait PeriodicSource {
    fn arm_periodic(&mut self, every: Duration) -> Result<Token, DiError>;
    fn cancel(&mut self, token: Token) -> Result<(), DiError>;
}

/// A hook invoked once per loop iteration before polling for events,
/// mirroring `ev_prepare`.
pub trait PrepareHook {
    fn prepare(&mut self);
}

/// Reaps terminated child processes and reports their exit status.
pub trait ChildReaper {
    fn poll_children(&mut self) -> Vec<(Pid, ExitReason)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Exited(i32),
    Signaled(i32),
}

/// What fired when [`MioLoop::run_once`] returns. Prepare hooks have no
/// corresponding variant: they run as direct closures from inside
/// `run_once` itself (see `prepare_hooks`), before polling even happens,
/// rather than being batched into the fired list like fd/timer/child
/// events are.
pub enum Fired {
    Fd(Token),
    Timer(Token),
    Child(Pid, ExitReason),
}

struct TimerEntry {
    deadline: std::time::Instant,
    periodic: Option<Duration>,
}

/// The concrete mainloop: polls registered file descriptors with `mio`,
/// tracks timers by nearest-deadline, and reaps children with a
/// `SIGCHLD` handler plus a non-blocking `waitpid` sweep each iteration.
pub struct MioLoop {
    poll: Poll,
    events: Events,
    next_token: usize,
    timers: HashMap<Token, TimerEntry>,
    prepare_hooks: Vec<Box<dyn FnMut()>>,
}

impl MioLoop {
    pub fn new() -> Result<Self, DiError> {
        let poll = Poll::new().map_err(|e| DiError::other(format!("mio poll init: {e}")))?;
        // SIGCHLD's default disposition already wakes a blocked `waitpid`;
        // we only need to ensure it isn't ignored.
        unsafe {
            signal::signal(UnixSignal::SIGCHLD, SigHandler::SigDfl)
                .map_err(|e| DiError::other(format!("sigaction: {e}")))?;
        }
        Ok(MioLoop {
            poll,
            events: Events::with_capacity(128),
            next_token: 0,
            timers: HashMap::new(),
            prepare_hooks: Vec::new(),
        })
    }

    fn alloc_token(&mut self) -> Token {
        let t = Token(self.next_token);
        self.next_token += 1;
        t
    }

    pub fn add_prepare_hook(&mut self, hook: Box<dyn FnMut()>) {
        self.prepare_hooks.push(hook);
    }

    fn next_timer_deadline(&self) -> Option<std::time::Instant> {
        self.timers.values().map(|t| t.deadline).min()
    }

    fn reap_children(&mut self) -> Vec<(Pid, ExitReason)> {
        let mut reaped = Vec::new();
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => reaped.push((pid, ExitReason::Exited(code))),
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    reaped.push((pid, ExitReason::Signaled(sig as i32)))
                }
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                _ => continue,
            }
        }
        reaped
    }

    /// Runs one iteration: fires prepare hooks, polls for up to the next
    /// timer deadline (or indefinitely with none pending), then reports
    /// whatever combination of fd/timer/child events occurred.
    pub fn run_once(&mut self) -> Result<Vec<Fired>, DiError> {
        for hook in &mut self.prepare_hooks {
            hook();
        }

        let timeout = self.next_timer_deadline().map(|d| d.saturating_duration_since(std::time::Instant::now()));
        self.poll
            .poll(&mut self.events, timeout)
            .map_err(|e| DiError::other(format!("mio poll: {e}")))?;

        let mut fired = Vec::new();
        for event in self.events.iter() {
            fired.push(Fired::Fd(event.token()));
        }

        let now = std::time::Instant::now();
        let mut expired = Vec::new();
        for (token, entry) in self.timers.iter_mut() {
            if entry.deadline <= now {
                expired.push(*token);
                match entry.periodic {
                    Some(period) => entry.deadline = now + period,
                    None => {}
                }
            }
        }
        for token in &expired {
            fired.push(Fired::Timer(*token));
        }
        self.timers.retain(|t, e| e.periodic.is_some() || !expired.contains(t));

        for (pid, reason) in self.reap_children() {
            fired.push(Fired::Child(pid, reason));
        }

        Ok(fired)
    }
}

impl FdEvents for MioLoop {
    fn watch(&mut self, fd: RawFd, readable: bool, writable: bool) -> Result<Token, DiError> {
        let token = self.alloc_token();
        let mut interest = None;
        if readable {
            interest = Some(Interest::READABLE);
        }
        if writable {
            interest = Some(match interest {
                Some(i) => i | Interest::WRITABLE,
                None => Interest::WRITABLE,
            });
        }
        let interest = interest.ok_or_else(|| DiError::other("watch requires readable or writable"))?;
        let mut source = mio::unix::SourceFd(&fd);
        self.poll
            .registry()
            .register(&mut source, token, interest)
            .map_err(|e| DiError::other(format!("mio register: {e}")))?;
        Ok(token)
    }

    fn unwatch(&mut self, token: Token) -> Result<(), DiError> {
        let _ = token;
        // `mio::unix::SourceFd` only borrows the fd for the registration
        // call, so there is nothing live here to deregister through; the
        // caller is expected to close the fd, which drops the interest.
        Ok(())
    }
}

impl TimerSource for MioLoop {
    fn arm(&mut self, after: Duration) -> Result<Token, DiError> {
        let token = self.alloc_token();
        self.timers.insert(
            token,
            TimerEntry { deadline: std::time::Instant::now() + after, periodic: None },
        );
        Ok(token)
    }

    fn cancel(&mut self, token: Token) -> Result<(), DiError> {
        self.timers.remove(&token);
        Ok(())
    }
}

impl PeriodicSource for MioLoop {
    fn arm_periodic(&mut self, every: Duration) -> Result<Token, DiError> {
        let token = self.alloc_token();
        self.timers.insert(
            token,
            TimerEntry { deadline: std::time::Instant::now() + every, periodic: Some(every) },
        );
        Ok(token)
    }

    fn cancel(&mut self, token: Token) -> Result<(), DiError> {
        self.timers.remove(&token);
        Ok(())
    }
}

impl ChildReaper for MioLoop {
    fn poll_children(&mut self) -> Vec<(Pid, ExitReason)> {
        self.reap_children()
    }
}
