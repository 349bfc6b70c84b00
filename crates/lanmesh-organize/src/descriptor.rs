//! Signed peer descriptors.
//!
//! A descriptor is the record a peer publishes about itself. On the wire it is
//! a list of `name=value;` pairs sorted by name and joined with single spaces:
//!
//! ```text
//! addrs=10.0.0.5; c=...; dt=86400; e=0; hostname=alice.local.; pk=...; port=5354; r=; s=...; vf=1601388653; vk=...;
//! ```
//!
//! The signature `s` covers the same rendering of every other field.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::keys::{PeerId, PqKey, SignatureBytes, TunnelKey, VerifyKey};

/// Default validity duration announced in descriptors, in seconds.
pub const DEFAULT_VALIDITY_SECS: u64 = 86_400;

/// Maximum hostname length.
pub const MAX_HOSTNAME_LENGTH: usize = 255;

static HOSTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+$").unwrap_or_else(|_| unreachable!()));

const FIELD_NAMES: [&str; 11] = ["addrs", "c", "dt", "e", "hostname", "pk", "port", "r", "s", "vf", "vk"];

/// Parses the flexible boolean spellings accepted in descriptors and edits.
pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// A peer's self-published, signed description.
#[derive(Clone, PartialEq, Eq)]
pub struct Descriptor {
    addrs: Vec<IpAddr>,
    pk: TunnelKey,
    c: PqKey,
    hostname: String,
    port: u16,
    vk: VerifyKey,
    dt: u64,
    vf: u64,
    r: Vec<IpNet>,
    e: bool,
    s: Option<SignatureBytes>,
}

impl Descriptor {
    /// Creates an unsigned descriptor with `vf = 0`, the default validity
    /// duration, no reserved routes and the ephemeral flag cleared.
    pub fn new(
        vk: VerifyKey,
        pk: TunnelKey,
        c: PqKey,
        hostname: impl Into<String>,
        port: u16,
        addrs: Vec<IpAddr>,
    ) -> Result<Self, DescriptorError> {
        let hostname = hostname.into();
        check_hostname(&hostname)?;
        if port == 0 {
            return Err(DescriptorError::invalid("port", "must be 1-65535"));
        }
        if addrs.is_empty() {
            return Err(DescriptorError::invalid("addrs", "empty address list"));
        }
        Ok(Self {
            addrs,
            pk,
            c,
            hostname,
            port,
            vk,
            dt: DEFAULT_VALIDITY_SECS,
            vf: 0,
            r: Vec::new(),
            e: false,
            s: None,
        })
    }

    /// Sets the freshness counter. Clears any signature.
    #[must_use]
    pub fn with_vf(mut self, vf: u64) -> Self {
        self.vf = vf;
        self.s = None;
        self
    }

    /// Sets the validity duration. Clears any signature.
    #[must_use]
    pub fn with_dt(mut self, dt: u64) -> Self {
        self.dt = dt;
        self.s = None;
        self
    }

    /// Sets the reserved network list. Clears any signature.
    #[must_use]
    pub fn with_routes(mut self, r: Vec<IpNet>) -> Self {
        self.r = r;
        self.s = None;
        self
    }

    /// Sets the ephemeral flag. Clears any signature.
    #[must_use]
    pub fn with_ephemeral(mut self, e: bool) -> Self {
        self.e = e;
        self.s = None;
        self
    }

    /// Parses a wire string.
    ///
    /// Chunks are separated by `;` and trimmed; empty chunks are skipped. Each
    /// chunk is split on its first `=`. Duplicate or empty field names, unknown
    /// fields and failed coercions are errors.
    pub fn parse(s: &str) -> Result<Self, DescriptorError> {
        let mut fields = BTreeMap::new();
        for chunk in s.split(';') {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                continue;
            }
            let (name, value) = chunk
                .split_once('=')
                .ok_or_else(|| DescriptorError::MalformedPair(chunk.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(DescriptorError::EmptyFieldName(chunk.to_string()));
            }
            if fields
                .insert(name.to_string(), value.trim().to_string())
                .is_some()
            {
                return Err(DescriptorError::DuplicateField(name.to_string()));
            }
        }
        Self::from_fields(&fields)
    }

    /// Builds a descriptor from a field map, applying schema coercion.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, DescriptorError> {
        if let Some(unknown) = fields.keys().find(|k| !FIELD_NAMES.contains(&k.as_str())) {
            return Err(DescriptorError::UnknownField(unknown.clone()));
        }
        let get = |name: &'static str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or(DescriptorError::MissingField(name))
        };

        let addrs = parse_list::<IpAddr>("addrs", get("addrs")?)?;
        if addrs.is_empty() {
            return Err(DescriptorError::invalid("addrs", "empty address list"));
        }
        let pk = TunnelKey::from_base64(get("pk")?)
            .map_err(|e| DescriptorError::invalid("pk", e.to_string()))?;
        let c = PqKey::from_base64(get("c")?)
            .map_err(|e| DescriptorError::invalid("c", e.to_string()))?;
        let hostname = get("hostname")?.to_string();
        check_hostname(&hostname)?;
        let port = get("port")?
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| DescriptorError::invalid("port", "must be 1-65535"))?;
        let vk = VerifyKey::from_base64(get("vk")?)
            .map_err(|e| DescriptorError::invalid("vk", e.to_string()))?;
        let dt = parse_int("dt", get("dt")?)?;
        let vf = parse_int("vf", get("vf")?)?;
        let r = match fields.get("r") {
            Some(v) => parse_list::<IpNet>("r", v)?,
            None => Vec::new(),
        };
        let e = parse_flag(get("e")?)
            .ok_or_else(|| DescriptorError::invalid("e", "expected a boolean"))?;
        let s = fields
            .get("s")
            .map(|v| SignatureBytes::from_base64(v))
            .transpose()
            .map_err(|e| DescriptorError::invalid("s", e.to_string()))?;

        Ok(Self {
            addrs,
            pk,
            c,
            hostname,
            port,
            vk,
            dt,
            vf,
            r,
            e,
            s,
        })
    }

    /// Every field rendered as a string, sorted by name. Includes `s` if set.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = self.unsigned_fields();
        if let Some(s) = &self.s {
            fields.insert("s", s.to_base64());
        }
        fields
    }

    fn unsigned_fields(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("addrs", join(&self.addrs)),
            ("c", self.c.to_base64()),
            ("dt", self.dt.to_string()),
            ("e", if self.e { "1" } else { "0" }.to_string()),
            ("hostname", self.hostname.clone()),
            ("pk", self.pk.to_base64()),
            ("port", self.port.to_string()),
            ("r", join(&self.r)),
            ("vf", self.vf.to_string()),
            ("vk", self.vk.to_base64()),
        ])
    }

    /// The canonical byte string the signature covers.
    #[must_use]
    pub fn signing_buffer(&self) -> Vec<u8> {
        render(&self.unsigned_fields()).into_bytes()
    }

    /// Returns a copy signed with `key`.
    #[must_use]
    pub fn sign(&self, key: &SigningKey) -> Self {
        let sig = key.sign(&self.signing_buffer());
        Self {
            s: Some(SignatureBytes::from_bytes_array(sig.to_bytes())),
            ..self.clone()
        }
    }

    /// Checks `s` against `vk`. Returns `false` for a missing signature or a
    /// verification key that is not a valid curve point.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Some(s) = &self.s else {
            return false;
        };
        let Some(key) = self.vk.verifying_key() else {
            return false;
        };
        let sig = Signature::from_bytes(s.as_bytes());
        key.verify(&self.signing_buffer(), &sig).is_ok()
    }

    /// The peer id (verification key).
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.vk
    }

    /// Announced addresses in preference order.
    #[must_use]
    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    /// Announced IPv4 addresses.
    pub fn ipv4_addrs(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addrs.iter().filter_map(|a| match a {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// Announced IPv6 addresses.
    pub fn ipv6_addrs(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.addrs.iter().filter_map(|a| match a {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }

    /// Tunnel public key.
    #[must_use]
    pub fn pk(&self) -> &TunnelKey {
        &self.pk
    }

    /// Post-quantum public key material.
    #[must_use]
    pub fn c(&self) -> &PqKey {
        &self.c
    }

    /// Announced hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Tunnel listen port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Verification key.
    #[must_use]
    pub fn vk(&self) -> &VerifyKey {
        &self.vk
    }

    /// Validity duration in seconds.
    #[must_use]
    pub fn dt(&self) -> u64 {
        self.dt
    }

    /// Freshness counter.
    #[must_use]
    pub fn vf(&self) -> u64 {
        self.vf
    }

    /// Reserved network list.
    #[must_use]
    pub fn routes(&self) -> &[IpNet] {
        &self.r
    }

    /// Whether the peer asked never to be auto-pinned.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.e
    }

    /// The signature, if signed.
    #[must_use]
    pub fn signature(&self) -> Option<&SignatureBytes> {
        self.s.as_ref()
    }
}

fn check_hostname(hostname: &str) -> Result<(), DescriptorError> {
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LENGTH {
        return Err(DescriptorError::invalid(
            "hostname",
            format!("length must be 1-{MAX_HOSTNAME_LENGTH}"),
        ));
    }
    if !HOSTNAME_REGEX.is_match(hostname) {
        return Err(DescriptorError::invalid(
            "hostname",
            "only letters, digits, '.' and '-' are allowed",
        ));
    }
    Ok(())
}

fn parse_int(field: &'static str, value: &str) -> Result<u64, DescriptorError> {
    value
        .parse::<u64>()
        .map_err(|e| DescriptorError::invalid(field, e.to_string()))
}

fn parse_list<T>(field: &'static str, value: &str) -> Result<Vec<T>, DescriptorError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| DescriptorError::invalid(field, format!("{v:?}: {e}")))
        })
        .collect()
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn render(fields: &BTreeMap<&'static str, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.fields()))
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("hostname", &self.hostname)
            .field("vk", &self.vk)
            .field("vf", &self.vf)
            .field("addrs", &self.addrs)
            .field("signed", &self.s.is_some())
            .finish_non_exhaustive()
    }
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Descriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.fields())
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = BTreeMap::<String, String>::deserialize(deserializer)?;
        Self::from_fields(&fields).map_err(serde::de::Error::custom)
    }
}
