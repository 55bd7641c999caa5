//! Linux transmit-time scheduling.
//!
//! `SO_TXTIME` tells the kernel (and an ETF qdisc, when configured) that
//! each datagram carries an `SCM_TXTIME` control message with the absolute
//! launch time in nanoseconds on the socket's clock.

use std::io;
use std::mem::MaybeUninit;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;

use nix::time::{ClockId, clock_gettime};
use pubsub_common::pubsub::config::TxClock;
use socket2::SockAddr;

// Not exported by every libc release.
mod linux_consts {
    pub const SO_TXTIME: libc::c_int = 61;
    pub const SCM_TXTIME: libc::c_int = 61;
    pub const CLOCK_TAI: libc::clockid_t = 11;

    pub const SOF_TXTIME_REPORT_ERRORS: u32 = 1 << 1;
}

#[repr(C)]
struct SockTxtime {
    clockid: libc::clockid_t,
    flags: u32,
}

#[repr(C, align(8))]
struct CmsgBuf([u8; 64]);

fn clock_id(clock: TxClock) -> libc::clockid_t {
    match clock {
        TxClock::Monotonic => libc::CLOCK_MONOTONIC,
        TxClock::Tai => linux_consts::CLOCK_TAI,
    }
}

fn now_ns(id: libc::clockid_t) -> io::Result<i128> {
    let ts = clock_gettime(ClockId::from_raw(id)).map_err(io::Error::from)?;
    Ok(i128::from(ts.tv_sec()) * 1_000_000_000 + i128::from(ts.tv_nsec()))
}

/// Offset from `CLOCK_MONOTONIC` to `clock`, in nanoseconds.
pub(crate) fn clock_offset_ns(clock: TxClock) -> io::Result<i64> {
    if clock == TxClock::Monotonic {
        return Ok(0);
    }
    let target = now_ns(clock_id(clock))?;
    let mono = now_ns(libc::CLOCK_MONOTONIC)?;
    i64::try_from(target - mono)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "clock offset out of range"))
}

/// Enable `SO_TXTIME` on `sock` for `clock`.
pub(crate) fn enable(sock: &UdpSocket, clock: TxClock) -> io::Result<()> {
    let txtime = SockTxtime {
        clockid: clock_id(clock),
        flags: linux_consts::SOF_TXTIME_REPORT_ERRORS,
    };

    // SAFETY:
    // - sock.as_raw_fd() is a valid descriptor owned by the UdpSocket
    // - SockTxtime is repr(C) and matches the kernel's struct sock_txtime
    // - the length passed is exactly size_of::<SockTxtime>()
    let ret = unsafe {
        libc::setsockopt(
            sock.as_raw_fd(),
            libc::SOL_SOCKET,
            linux_consts::SO_TXTIME,
            &txtime as *const _ as *const libc::c_void,
            std::mem::size_of::<SockTxtime>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOPROTOOPT) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "SO_TXTIME not supported (kernel < 4.19?)",
            ));
        }
        return Err(err);
    }
    Ok(())
}

/// Send `buf` to `dest` with an `SCM_TXTIME` launch time.
pub(crate) fn send_at(sock: &UdpSocket, buf: &[u8], dest: SocketAddr, txtime_ns: u64) -> io::Result<usize> {
    let addr = SockAddr::from(dest);
    let iov = libc::iovec {
        iov_base: buf.as_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    // SAFETY: CMSG_SPACE only computes a size from the payload length.
    let cmsg_space = unsafe { libc::CMSG_SPACE(std::mem::size_of::<u64>() as u32) } as usize;
    let mut cmsg_buf = CmsgBuf([0u8; 64]);
    if cmsg_space > cmsg_buf.0.len() {
        return Err(io::Error::other("control buffer too small for SCM_TXTIME"));
    }

    // SAFETY: msghdr is plain data; every pointer field is set below.
    let mut msg: libc::msghdr = unsafe { MaybeUninit::zeroed().assume_init() };
    msg.msg_name = addr.as_ptr() as *mut libc::c_void;
    msg.msg_namelen = addr.len();
    msg.msg_iov = &iov as *const _ as *mut libc::iovec;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.0.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_space as _;

    // SAFETY:
    // - msg_control points to cmsg_buf, 8-byte aligned and at least CMSG_SPACE(8) long
    // - CMSG_FIRSTHDR is non-null because msg_controllen >= size_of::<cmsghdr>()
    // - CMSG_DATA points inside cmsg_buf; write_unaligned avoids alignment assumptions
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = linux_consts::SCM_TXTIME;
        (*cmsg).cmsg_len = libc::CMSG_LEN(std::mem::size_of::<u64>() as u32) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut u64, txtime_ns);
    }

    // SAFETY:
    // - the descriptor is owned by the UdpSocket
    // - addr, iov (and buf) and cmsg_buf outlive the call
    let ret = unsafe { libc::sendmsg(sock.as_raw_fd(), &msg, 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}
