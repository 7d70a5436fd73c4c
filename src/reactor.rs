// SPDX-License-Identifier: MIT

//! Waiting for the stream to become readable.
//!
//! A one-shot `PollAdd` is kept armed on a small io_uring and the ring is entered with a bounded
//! wait, so an idle reader sleeps in the kernel instead of spinning. Kernels or sandboxes that
//! refuse io_uring get the plain "try a read, then sleep a millisecond" loop.

use io_uring::{IoUring, opcode, types};
use log::*;

use std::io;
use std::os::fd::RawFd;
use std::thread;
use std::time::Duration;

/// Sleep between polls when there is no ring.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(1);

const RING_ENTRIES: u32 = 4;
const POLL_TOKEN: u64 = 0x504f_4c4c;

pub struct Readiness {
    fd: RawFd,
    backend: Backend,
}

enum Backend {
    Ring { ring: IoUring, armed: bool },
    Sleep,
}

impl Readiness {
    pub fn new(fd: RawFd) -> Self {
        let backend = match IoUring::new(RING_ENTRIES) {
            Ok(ring) if ring.params().is_feature_ext_arg() => Backend::Ring { ring, armed: false },
            Ok(_) => {
                debug!("io_uring lacks bounded waits, falling back to sleep polling");
                Backend::Sleep
            }
            Err(e) => {
                debug!("io_uring unavailable ({e}), falling back to sleep polling");
                Backend::Sleep
            }
        };

        Self { fd, backend }
    }

    pub fn uses_ring(&self) -> bool {
        matches!(self.backend, Backend::Ring { .. })
    }

    /// Block until the stream is readable or `timeout` passes.
    ///
    /// Returns whether a read is worth trying. Without a ring this sleeps for at most
    /// [`IDLE_BACKOFF`] and always says yes.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let Backend::Ring { ring, armed } = &mut self.backend else {
            thread::sleep(timeout.min(IDLE_BACKOFF));
            return Ok(true);
        };

        if !*armed {
            let poll = opcode::PollAdd::new(types::Fd(self.fd), libc::POLLIN as u32)
                .build()
                .user_data(POLL_TOKEN);

            // SAFETY: the poll entry references no memory besides the fd, which outlives the ring.
            unsafe {
                ring.submission()
                    .push(&poll)
                    .map_err(|_| io::Error::other("submission queue is full"))?;
            }
            *armed = true;
        }

        let ts = types::Timespec::new()
            .sec(timeout.as_secs())
            .nsec(timeout.subsec_nanos());
        let args = types::SubmitArgs::new().timespec(&ts);

        let submitted = ring.submitter().submit_with_args(1, &args);
        match submitted {
            Ok(_) => {}
            Err(e) if matches!(e.raw_os_error(), Some(libc::ETIME | libc::EINTR)) => {}
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINVAL | libc::ENOSYS | libc::EPERM)) => {
                warn!("io_uring wait refused ({e}), falling back to sleep polling");
                self.backend = Backend::Sleep;
                return Ok(true);
            }
            Err(e) => return Err(e),
        }

        let Some(cqe) = ring.completion().next() else {
            return Ok(false);
        };
        *armed = false;

        if cqe.result() < 0 {
            debug!(
                "poll on fd {} completed with {}",
                self.fd,
                io::Error::from_raw_os_error(-cqe.result())
            );
        }

        Ok(true)
    }
}
