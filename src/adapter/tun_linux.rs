//! Linux TUN/TAP device implementation.

use std::ffi::CStr;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use async_trait::async_trait;
use libc::{c_char, c_short, c_void, ioctl, open, IFF_NO_PI, IFF_TAP, IFF_TUN, O_RDWR};
use tokio::io::unix::AsyncFd;
use tracing::{debug, info};

use super::{DeviceKind, DevicePort};
use crate::config::MAX_INTERFACE_NAME;

/// TUNSETIFF ioctl number.
const TUNSETIFF: libc::c_ulong = 0x400454ca;

/// Interface request structure.
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; 16],
    ifr_flags: c_short,
    _pad: [u8; 22],
}

/// Linux TUN or TAP device registered with the tokio reactor.
pub struct TunDevice {
    fd: AsyncFd<OwnedFd>,
    name: String,
    kind: DeviceKind,
}

impl TunDevice {
    /// Attach to (or create) the named TUN/TAP interface.
    ///
    /// The descriptor is switched to non-blocking mode, so this must be
    /// called from within a tokio runtime.
    pub fn open(name: &str, kind: DeviceKind) -> io::Result<Self> {
        if name.len() > MAX_INTERFACE_NAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("interface name '{name}' too long"),
            ));
        }

        let flags = match kind {
            DeviceKind::Tun => IFF_TUN,
            DeviceKind::Tap => IFF_TAP,
        } | IFF_NO_PI;

        // SAFETY: opening a fixed, NUL-terminated path.
        let raw = unsafe { open(b"/dev/net/tun\0".as_ptr() as *const c_char, O_RDWR) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly opened descriptor we exclusively own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut ifr = IfReq {
            ifr_name: [0; 16],
            ifr_flags: flags as c_short,
            _pad: [0; 22],
        };
        for (i, byte) in name.bytes().take(MAX_INTERFACE_NAME).enumerate() {
            ifr.ifr_name[i] = byte as c_char;
        }

        // SAFETY: TUNSETIFF takes a pointer to an ifreq we own for the call.
        if unsafe { ioctl(fd.as_raw_fd(), TUNSETIFF, &mut ifr as *mut _ as *mut c_void) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: the kernel NUL-terminates ifr_name.
        let name = unsafe { CStr::from_ptr(ifr.ifr_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        set_nonblocking(fd.as_raw_fd())?;
        let fd = AsyncFd::new(fd)?;

        info!(device = %name, kind = %kind, "Attached to interface");
        Ok(Self { fd, name, kind })
    }

    /// Get the raw file descriptor.
    pub fn raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a valid descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn fd_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: reading into our buffer from a valid fd.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn fd_write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: writing from our buffer to a valid fd.
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[async_trait]
impl DevicePort for TunDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| fd_read(inner.get_ref().as_raw_fd(), buf)) {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match fd_read(self.raw_fd(), buf) {
            Ok(n) => Ok(Some(n)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| fd_write(inner.get_ref().as_raw_fd(), buf)) {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

impl Drop for TunDevice {
    fn drop(&mut self) {
        debug!("Closing device: {}", self.name);
    }
}
