//! A known peer: one descriptor plus locally held trust state.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::keys::{PeerId, PresharedKey, TunnelKey};

/// Name shown for a peer with no enabled names.
pub const UNNAMED: &str = "<unnamed>";

/// The split default route carried by a gateway peer.
///
/// Two halves instead of `0.0.0.0/0` so the tunnel route never shadows the
/// system default route it is replacing.
#[must_use]
pub fn gateway_routes() -> [IpNet; 2] {
    [
        IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 1)),
        IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(128, 0, 0, 0), 1)),
    ]
}

/// A host route covering exactly `addr`.
#[must_use]
pub fn host_route(addr: IpAddr) -> IpNet {
    IpNet::from(addr)
}

/// A peer and everything we know about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// The most recent admitted descriptor.
    pub descriptor: Descriptor,
    /// Local display override. Empty means unset.
    #[serde(default)]
    pub petname: String,
    /// Every hostname this peer has announced, with its enabled bit.
    #[serde(default)]
    pub nicknames: BTreeMap<String, bool>,
    /// Every IPv4 address this peer has announced, with its enabled bit.
    #[serde(rename = "IPv4addrs", default)]
    pub ipv4_addrs: BTreeMap<Ipv4Addr, bool>,
    /// Every IPv6 address this peer has announced, with its enabled bit.
    #[serde(rename = "IPv6addrs", default)]
    pub ipv6_addrs: BTreeMap<Ipv6Addr, bool>,
    /// Whether the peer participates in the mesh.
    pub enabled: bool,
    /// Identity confirmed out of band.
    pub verified: bool,
    /// Manually trusted; never removed by conflict resolution.
    pub pinned: bool,
    /// Carries default-route traffic.
    pub use_as_gateway: bool,
}

impl Peer {
    /// Creates an enabled peer from a freshly admitted descriptor. Every
    /// announced address and the hostname start out enabled.
    #[must_use]
    pub fn from_descriptor(descriptor: Descriptor, pinned: bool) -> Self {
        let nicknames = BTreeMap::from([(descriptor.hostname().to_string(), true)]);
        let ipv4_addrs = descriptor.ipv4_addrs().map(|a| (a, true)).collect();
        let ipv6_addrs = descriptor.ipv6_addrs().map(|a| (a, true)).collect();
        Self {
            descriptor,
            petname: String::new(),
            nicknames,
            ipv4_addrs,
            ipv6_addrs,
            enabled: true,
            verified: false,
            pinned,
            use_as_gateway: false,
        }
    }

    /// The peer id.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.descriptor.id()
    }

    /// The tunnel public key from the current descriptor.
    #[must_use]
    pub fn tunnel_key(&self) -> &TunnelKey {
        self.descriptor.pk()
    }

    /// Display name: petname, then the current hostname if enabled, then the
    /// first enabled nickname.
    #[must_use]
    pub fn name(&self) -> &str {
        if !self.petname.is_empty() {
            return &self.petname;
        }
        let hostname = self.descriptor.hostname();
        if self.nicknames.get(hostname).copied().unwrap_or(false) {
            return hostname;
        }
        self.enabled_names().next().unwrap_or(UNNAMED)
    }

    /// `name (id)`.
    #[must_use]
    pub fn name_and_id(&self) -> String {
        format!("{} ({})", self.name(), self.id())
    }

    /// Enabled nicknames in lexicographic order.
    pub fn enabled_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.nicknames
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
    }

    /// Whether `name` is an enabled nickname, ignoring ASCII case.
    #[must_use]
    pub fn has_enabled_name(&self, name: &str) -> bool {
        self.enabled_names().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Enabled nicknames other than the display name.
    #[must_use]
    pub fn other_names(&self) -> Vec<&str> {
        let name = self.name();
        self.enabled_names().filter(|n| *n != name).collect()
    }

    /// Enabled addresses, IPv4 first.
    #[must_use]
    pub fn enabled_addresses(&self) -> Vec<IpAddr> {
        self.addresses_with(true)
    }

    /// Addresses that were announced but are switched off.
    #[must_use]
    pub fn disabled_addresses(&self) -> Vec<IpAddr> {
        self.addresses_with(false)
    }

    fn addresses_with(&self, state: bool) -> Vec<IpAddr> {
        let v4 = self
            .ipv4_addrs
            .iter()
            .filter(|(_, on)| **on == state)
            .map(|(a, _)| IpAddr::V4(*a));
        let v6 = self
            .ipv6_addrs
            .iter()
            .filter(|(_, on)| **on == state)
            .map(|(a, _)| IpAddr::V6(*a));
        v4.chain(v6).collect()
    }

    /// Whether `addr` is one of this peer's enabled addresses.
    #[must_use]
    pub fn has_enabled_address(&self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(a) => self.ipv4_addrs.get(a).copied().unwrap_or(false),
            IpAddr::V6(a) => self.ipv6_addrs.get(a).copied().unwrap_or(false),
        }
    }

    /// One host route per enabled address.
    #[must_use]
    pub fn routes(&self) -> Vec<IpNet> {
        self.enabled_addresses().into_iter().map(host_route).collect()
    }

    /// Prefixes the tunnel entry may carry: the host routes, plus the split
    /// default route for the gateway peer.
    #[must_use]
    pub fn allowed_addresses(&self) -> Vec<IpNet> {
        let mut allowed = self.routes();
        if self.use_as_gateway {
            allowed.extend(gateway_routes());
        }
        allowed
    }

    /// First descriptor address at the descriptor port.
    #[must_use]
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.descriptor
            .addrs()
            .first()
            .map(|addr| SocketAddr::new(*addr, self.descriptor.port()))
    }

    /// What a tunnel collaborator needs to reconcile this peer.
    #[must_use]
    pub fn tunnel_config(&self, psk: Option<PresharedKey>) -> TunnelPeerConfig {
        TunnelPeerConfig {
            public_key: *self.tunnel_key(),
            endpoint: self.endpoint(),
            allowed_ips: self.allowed_addresses(),
            preshared_key: psk,
        }
    }

    /// Plain-text status block.
    #[must_use]
    pub fn show(&self) -> String {
        let mut out = String::new();
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let join = |items: Vec<String>| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join(", ")
            }
        };
        let _ = writeln!(out, "peer: {}", self.name());
        let _ = writeln!(out, "  id: {}", self.id());
        let others = self.other_names();
        if !others.is_empty() {
            let _ = writeln!(out, "  other names: {}", others.join(", "));
        }
        let _ = writeln!(
            out,
            "  status: enabled={} pinned={} verified={} gateway={}",
            yes_no(self.enabled),
            yes_no(self.pinned),
            yes_no(self.verified),
            yes_no(self.use_as_gateway),
        );
        let endpoint = self
            .endpoint()
            .map_or_else(|| "-".to_string(), |e| e.to_string());
        let _ = writeln!(out, "  endpoint: {endpoint}");
        let allowed = self
            .allowed_addresses()
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = writeln!(out, "  allowed address: {}", join(allowed));
        let disabled: Vec<String> = self
            .disabled_addresses()
            .iter()
            .map(ToString::to_string)
            .collect();
        if !disabled.is_empty() {
            let _ = writeln!(out, "  disabled address: {}", join(disabled));
        }
        let _ = writeln!(out, "  tunnel key: {}", self.tunnel_key());
        out
    }
}

/// Declarative tunnel peer entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPeerConfig {
    /// Tunnel public key.
    pub public_key: TunnelKey,
    /// Where to send handshakes.
    pub endpoint: Option<SocketAddr>,
    /// Prefixes routed through this peer.
    pub allowed_ips: Vec<IpNet>,
    /// Preshared key from post-quantum key agreement.
    pub preshared_key: Option<PresharedKey>,
}
