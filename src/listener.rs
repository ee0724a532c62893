//! Acquires the listening socket, either handed over by systemd socket
//! activation or bound by ourselves if a bind address is configured.

use std::{
    env,
    net::{SocketAddr, TcpListener},
    os::unix::io::{FromRawFd, RawFd},
};

use thiserror::Error;

/// first file descriptor passed by systemd (`SD_LISTEN_FDS_START`)
const LISTEN_FDS_START: RawFd = 3;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("unexpected number of socket activation ({0} != 1)")]
    SocketCount(usize),
    #[error("invalid socket activation environment: {0}")]
    Environment(String),
    #[error("activated socket is not a TCP socket: {0}")]
    NotTcp(#[source] std::io::Error),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Number of sockets passed to this process according to `LISTEN_PID` and
/// `LISTEN_FDS`. Sockets meant for another process count as zero.
fn activated_sockets(
    listen_pid: Option<String>,
    listen_fds: Option<String>,
    pid: u32,
) -> Result<usize, ListenerError> {
    let (listen_pid, listen_fds) = match (listen_pid, listen_fds) {
        (Some(listen_pid), Some(listen_fds)) => (listen_pid, listen_fds),
        _ => return Ok(0),
    };

    let listen_pid: u32 = listen_pid
        .parse()
        .map_err(|_| ListenerError::Environment(format!("LISTEN_PID={listen_pid}")))?;
    if listen_pid != pid {
        return Ok(0);
    }

    listen_fds
        .parse()
        .map_err(|_| ListenerError::Environment(format!("LISTEN_FDS={listen_fds}")))
}

/// Takes the single socket passed by systemd. Zero or more than one socket
/// is an error.
pub fn from_socket_activation() -> Result<TcpListener, ListenerError> {
    let count = activated_sockets(
        env::var("LISTEN_PID").ok(),
        env::var("LISTEN_FDS").ok(),
        std::process::id(),
    )?;

    // don't pass the sockets on to child processes
    env::remove_var("LISTEN_PID");
    env::remove_var("LISTEN_FDS");
    env::remove_var("LISTEN_FDNAMES");

    if count != 1 {
        return Err(ListenerError::SocketCount(count));
    }

    // SAFETY: systemd guarantees that fd 3 is an open listening socket owned
    // by this process once LISTEN_PID and LISTEN_FDS were validated
    unsafe { tcp_listener(LISTEN_FDS_START) }
}

/// Takes ownership of `fd`. Only TCP sockets are supported; any other socket,
/// e.g. a unix socket from `ListenStream=/path`, is closed and rejected.
///
/// # Safety
///
/// `fd` must be an open socket owned by the caller.
unsafe fn tcp_listener(fd: RawFd) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::from_raw_fd(fd);
    listener.local_addr().map_err(ListenerError::NotTcp)?;

    Ok(listener)
}

/// Binds the webhook listener
///
/// * `bind_address` - bind here instead of using socket activation
pub fn acquire(bind_address: Option<SocketAddr>) -> Result<TcpListener, ListenerError> {
    match bind_address {
        Some(addr) => TcpListener::bind(addr).map_err(|source| ListenerError::Bind { addr, source }),
        None => from_socket_activation(),
    }
}
