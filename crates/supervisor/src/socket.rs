use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use wharfd_models::WharfError;

/// Environment variable carrying the inherited listener fd to each worker.
pub const LISTEN_FD_ENV: &str = "WHARFD_FD";

/// Bind the single listening socket shared by every worker. The supervisor
/// owns the bind; workers inherit the descriptor across exec, so `FD_CLOEXEC`
/// is cleared here. The kernel arbitrates which worker gets each connection.
pub fn bind_shared(address: &str) -> Result<TcpListener, WharfError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e: std::net::AddrParseError| WharfError::InvalidBindAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    let listener = TcpListener::bind(addr).map_err(|e| WharfError::InvalidBindAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    clear_cloexec(listener.as_raw_fd())?;
    Ok(listener)
}

fn clear_cloexec(fd: RawFd) -> Result<(), WharfError> {
    // SAFETY: fcntl on a descriptor we own; both calls are checked.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_listener_is_inheritable() {
        let listener = bind_shared("127.0.0.1:0").unwrap();
        let flags = unsafe { libc::fcntl(listener.as_raw_fd(), libc::F_GETFD) };
        assert!(flags >= 0);
        assert_eq!(flags & libc::FD_CLOEXEC, 0);
    }

    #[test]
    fn rejects_unparseable_address() {
        let err = bind_shared("not-an-address").unwrap_err();
        assert!(matches!(err, WharfError::InvalidBindAddress { .. }));
    }

    #[test]
    fn rejects_address_in_use() {
        let first = bind_shared("127.0.0.1:0").unwrap();
        let taken = first.local_addr().unwrap();
        let err = bind_shared(&taken.to_string()).unwrap_err();
        assert!(matches!(err, WharfError::InvalidBindAddress { .. }));
    }
}
