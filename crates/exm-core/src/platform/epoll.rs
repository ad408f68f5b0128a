//! epoll-backed poller.
//!
//! Each registered file descriptor carries a handler that receives the ready
//! event mask. `try_poll` waits with a zero timeout, so a pass with nothing
//! ready returns immediately.

use std::collections::HashMap;
use std::ffi::c_int;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use super::Poller;

/// Upper bound of events dispatched per pass.
const MAX_EVENTS: usize = 64;

type Handler = Box<dyn FnMut(u32) + Send>;

/// Poller over a Linux epoll instance.
pub struct EpollPoller {
    epoll: OwnedFd,
    events: Vec<libc::epoll_event>,
    handlers: HashMap<RawFd, Handler>,
}

impl EpollPoller {
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall without pointer arguments.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just returned by epoll_create1 and is owned by nobody else.
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self {
            epoll,
            events: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
            handlers: HashMap::new(),
        })
    }

    /// Watch `fd` for `interest` (an `EPOLL*` mask) and call `handler` with
    /// the ready mask whenever it fires.
    ///
    /// The caller keeps ownership of `fd` and must deregister it before
    /// closing it.
    pub fn register(
        &mut self,
        fd: RawFd,
        interest: u32,
        handler: impl FnMut(u32) + Send + 'static,
    ) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest,
            u64: fd as u64,
        };
        // SAFETY: `event` is a valid, initialized epoll_event for the call's duration.
        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        self.handlers.insert(fd, Box::new(handler));
        Ok(())
    }

    /// Stop watching `fd`.
    pub fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.handlers.remove(&fd);
        // SAFETY: EPOLL_CTL_DEL ignores the event pointer.
        let rc = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Number of watched descriptors.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Poller for EpollPoller {
    fn try_poll(&mut self) {
        // SAFETY: the buffer holds `events.len()` initialized epoll_event slots.
        let ready = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as c_int,
                0,
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(error = %err, "epoll_wait failed");
            }
            return;
        }

        for event in &self.events[..ready as usize] {
            // Copy out of the (possibly packed) struct before use.
            let (token, mask) = (event.u64, event.events);
            if let Some(handler) = self.handlers.get_mut(&(token as RawFd)) {
                handler(mask);
            }
        }
    }
}

impl std::fmt::Debug for EpollPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpollPoller")
            .field("epoll", &self.epoll)
            .field("watched", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
