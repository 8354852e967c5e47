//! TCP socket tuning applied to the listener and to accepted connections.
//!
//! Every knob here goes through [`socket2::SockRef`], which borrows the raw
//! file descriptor of an existing [`tokio::net::TcpListener`] or
//! [`tokio::net::TcpStream`] without taking ownership of it, so the socket
//! keeps living inside tokio's reactor exactly as it did before tuning.
//! `TCP_DEFER_ACCEPT` and `TCP_FASTOPEN` have no `socket2` wrapper, so those
//! two go through a raw `libc::setsockopt` on the listener's file descriptor.

use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::os::fd::AsRawFd;

/// `TCP_FASTOPEN` accept queue length used whenever a profile enables it.
#[cfg(any(target_os = "linux", target_os = "android"))]
const FASTOPEN_QLEN: libc::c_int = 5;

/// Named TCP tuning profile, applied once at listener bind time and again to
/// every accepted connection.
///
/// # Profiles
///
/// | Profile | `TCP_NODELAY` | `SO_RCVBUF`/`SO_SNDBUF` | `TCP_QUICKACK` | `TCP_DEFER_ACCEPT` | `TCP_FASTOPEN` | keepalive |
/// |---|---|---|---|---|---|---|
/// | [`Default`](Self::Default) | on | 256 KiB | on (Linux) | on (Linux) | on, qlen=5 (Linux) | 60s idle / 3 probes |
/// | [`LowLatency`](Self::LowLatency) | on | 128 KiB | on (Linux) | off | on, qlen=5 (Linux) | 30s idle / 3 probes |
/// | [`HighThroughput`](Self::HighThroughput) | on | 1 MiB | off | on (Linux) | on, qlen=5 (Linux) | 120s idle / 5 probes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketProfile {
    /// Balanced defaults suitable for general-purpose APIs.
    #[default]
    Default,
    /// Favors request/response latency over bandwidth; shrinks buffers and
    /// disables Nagle-adjacent delays. Best for small, frequent requests.
    LowLatency,
    /// Favors sustained throughput for larger payloads; grows socket buffers
    /// and tolerates Nagle's algorithm batching small writes.
    HighThroughput,
}

impl SocketProfile {
    #[inline]
    const fn nodelay(self) -> bool {
        true
    }

    #[inline]
    const fn buffer_size(self) -> usize {
        match self {
            Self::Default => 256 * 1024,
            Self::LowLatency => 128 * 1024,
            Self::HighThroughput => 1024 * 1024,
        }
    }

    #[inline]
    const fn defer_accept(self) -> bool {
        !matches!(self, Self::LowLatency)
    }

    #[inline]
    const fn keepalive(self) -> (Duration, u32) {
        match self {
            Self::Default => (Duration::from_secs(60), 3),
            Self::LowLatency => (Duration::from_secs(30), 3),
            Self::HighThroughput => (Duration::from_secs(120), 5),
        }
    }

    /// Applies this profile to a not-yet-accepting listener socket.
    ///
    /// Sets the options that only make sense pre-bind-time: receive buffer
    /// size, `TCP_DEFER_ACCEPT`, and `TCP_FASTOPEN`. The rest of the profile
    /// applies per-connection via [`apply_connection`](Self::apply_connection).
    pub fn apply_listener(self, listener: &TcpListener) -> io::Result<()> {
        let sock = SockRef::from(listener);

        sock.set_recv_buffer_size(self.buffer_size())?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let fd = listener.as_raw_fd();
            let _ = set_defer_accept(fd, self.defer_accept());
            let _ = set_fastopen(fd, FASTOPEN_QLEN);
        }

        Ok(())
    }

    /// Applies this profile to a freshly accepted connection.
    pub fn apply_connection(self, stream: &TcpStream) -> io::Result<()> {
        let sock = SockRef::from(stream);

        sock.set_nodelay(self.nodelay())?;
        sock.set_recv_buffer_size(self.buffer_size())?;
        sock.set_send_buffer_size(self.buffer_size())?;

        let (idle, retries) = self.keepalive();
        let keepalive = TcpKeepalive::new()
            .with_time(idle)
            .with_retries(retries);
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let keepalive = keepalive.with_interval(idle / retries.max(1));
        sock.set_tcp_keepalive(&keepalive)?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let _ = sock.set_quickack(!matches!(self, Self::HighThroughput));
        }

        Ok(())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_defer_accept(fd: std::os::fd::RawFd, enabled: bool) -> io::Result<()> {
    const TCP_DEFER_ACCEPT: libc::c_int = 9;
    let val: libc::c_int = enabled as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            TCP_DEFER_ACCEPT,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_fastopen(fd: std::os::fd::RawFd, qlen: libc::c_int) -> io::Result<()> {
    const TCP_FASTOPEN: libc::c_int = 23;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            TCP_FASTOPEN,
            &qlen as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
