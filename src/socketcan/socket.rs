//! Low Level SocketCAN J1939 code
//! Layout follows `struct sockaddr_can` from linux/can.h with the j1939 member of the address union.
use libc::{c_int, c_void, sa_family_t, sockaddr, socklen_t, AF_CAN};
use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::time::Duration;

const CAN_J1939: c_int = 7;
const SOL_CAN_BASE: c_int = 100;
const SOL_CAN_J1939: c_int = SOL_CAN_BASE + CAN_J1939;
const SO_J1939_PROMISC: c_int = 2;

pub const J1939_NO_ADDR: u8 = 0xff;
pub const J1939_NO_NAME: u64 = 0;
pub const J1939_NO_PGN: u32 = 0x40000;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct SockAddrJ1939 {
    can_family: sa_family_t,
    can_ifindex: c_int,
    name: u64,
    pgn: u32,
    addr: u8,
}

impl SockAddrJ1939 {
    fn new(ifindex: c_int, pgn: u32, addr: u8) -> Self {
        Self {
            can_family: AF_CAN as sa_family_t,
            can_ifindex: ifindex,
            name: J1939_NO_NAME,
            pgn,
            addr,
        }
    }

    const LEN: socklen_t = std::mem::size_of::<SockAddrJ1939>() as socklen_t;
}

fn if_nametoindex(ifname: &str) -> std::io::Result<c_int> {
    let name = CString::new(ifname)
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => Err(std::io::Error::last_os_error()),
        index => Ok(index as c_int),
    }
}

/// Datagram socket of the kernel J1939 stack. Transport protocol and address claiming are handled by the kernel.
pub struct J1939Socket {
    socket: socket2::Socket,
    ifindex: c_int,
}

impl J1939Socket {
    /// Bind to `ifname`, receiving every PGN. `addr` is the local source address, [`J1939_NO_ADDR`] for receive only.
    pub fn open(ifname: &str, addr: u8) -> std::io::Result<Self> {
        let ifindex = if_nametoindex(ifname)?;

        let domain = socket2::Domain::from(AF_CAN);
        let protocol = socket2::Protocol::from(CAN_J1939);
        let socket = socket2::Socket::new_raw(domain, socket2::Type::DGRAM, Some(protocol))?;

        let local = SockAddrJ1939::new(ifindex, J1939_NO_PGN, addr);
        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &local as *const SockAddrJ1939 as *const sockaddr,
                SockAddrJ1939::LEN,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let s = Self { socket, ifindex };
        s.set_socket_option(SOL_CAN_J1939, SO_J1939_PROMISC, &c_int::from(true))?;
        s.socket.set_broadcast(true)?;
        Ok(s)
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> std::io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    /// Receive one message into `buf`, returning its length, PGN and source address.
    pub fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, u32, u8)> {
        let mut peer = SockAddrJ1939::new(0, J1939_NO_PGN, J1939_NO_ADDR);
        let mut len = SockAddrJ1939::LEN;

        let ret = unsafe {
            libc::recvfrom(
                self.socket.as_raw_fd(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                0,
                &mut peer as *mut SockAddrJ1939 as *mut sockaddr,
                &mut len,
            )
        };

        match ret {
            n if n < 0 => Err(std::io::Error::last_os_error()),
            n => Ok((n as usize, peer.pgn, peer.addr)),
        }
    }

    pub fn send_to(&self, data: &[u8], pgn: u32, destination: u8) -> std::io::Result<()> {
        let peer = SockAddrJ1939::new(self.ifindex, pgn, destination);

        let ret = unsafe {
            libc::sendto(
                self.socket.as_raw_fd(),
                data.as_ptr() as *const c_void,
                data.len(),
                0,
                &peer as *const SockAddrJ1939 as *const sockaddr,
                SockAddrJ1939::LEN,
            )
        };

        match ret {
            n if n < 0 => Err(std::io::Error::last_os_error()),
            _ => Ok(()),
        }
    }

    fn set_socket_option<T>(&self, level: c_int, name: c_int, val: &T) -> std::io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                level,
                name,
                val as *const _ as *const c_void,
                std::mem::size_of::<T>() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(std::io::Error::last_os_error()),
        }
    }
}
