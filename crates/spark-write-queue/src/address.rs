use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// 无连接传输（UDP 等）随消息携带的目的地址。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 数据报写入需要把目的地址与字节一起交给底层写原语；地址随 [`QueuedMessage`](crate::QueuedMessage)
///   入队，排空时原样传回，保证排序与背压语义与流式连接一致。
/// - 使用值类型（`Copy`）而非 `std::net::SocketAddr` 的引用，排队期间无需关心生命周期。
///
/// ## 合同（What）
/// - `V4`/`V6` 分别表示 IPv4/IPv6，端口为主机序 `u16`；
/// - 与 `std::net::SocketAddr` 双向无损转换（IPv6 的 flowinfo/scope_id 不保留）；
/// - `Display` 输出 `a.b.c.d:port` 或 `[x:x:...]:port`，适合日志字段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportSocketAddr {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
}

impl TransportSocketAddr {
    /// 返回端口号。
    pub fn port(&self) -> u16 {
        match self {
            Self::V4 { port, .. } | Self::V6 { port, .. } => *port,
        }
    }

    /// 转换为标准库地址，供套接字实现直接使用。
    pub fn to_socket_addr(&self) -> SocketAddr {
        match *self {
            Self::V4 { addr, port } => SocketAddr::new(IpAddr::V4(Ipv4Addr::from(addr)), port),
            Self::V6 { addr, port } => SocketAddr::new(IpAddr::V6(Ipv6Addr::from(addr)), port),
        }
    }
}

impl From<SocketAddr> for TransportSocketAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

impl From<TransportSocketAddr> for SocketAddr {
    fn from(addr: TransportSocketAddr) -> Self {
        addr.to_socket_addr()
    }
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_socket_addr(), f)
    }
}
