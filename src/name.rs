use core::{cmp::Ordering, fmt, num::NonZeroU16, str::FromStr};

use thiserror::Error;

use crate::tlv::{encode_header, parse_tlvs, Encode};

pub const TLV_TYPE_NAME: u32 = 7;

const fn component_type(v: u16) -> NonZeroU16 {
    match NonZeroU16::new(v) {
        Some(t) => t,
        None => panic!("component type must be non-zero"),
    }
}

const TYPE_IMPLICIT_SHA256: NonZeroU16 = component_type(1);
const TYPE_PARAMETER_SHA256: NonZeroU16 = component_type(2);
const TYPE_GENERIC: NonZeroU16 = component_type(8);

const DIGEST_LENGTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NameComponentType {
    Generic,
    ImplicitSha256Digest,
    ParameterSha256Digest,
    Other(NonZeroU16),
}

impl From<NonZeroU16> for NameComponentType {
    fn from(value: NonZeroU16) -> Self {
        if value == TYPE_GENERIC {
            NameComponentType::Generic
        } else if value == TYPE_IMPLICIT_SHA256 {
            NameComponentType::ImplicitSha256Digest
        } else if value == TYPE_PARAMETER_SHA256 {
            NameComponentType::ParameterSha256Digest
        } else {
            NameComponentType::Other(value)
        }
    }
}

impl From<NameComponentType> for NonZeroU16 {
    fn from(value: NameComponentType) -> Self {
        match value {
            NameComponentType::Generic => TYPE_GENERIC,
            NameComponentType::ImplicitSha256Digest => TYPE_IMPLICIT_SHA256,
            NameComponentType::ParameterSha256Digest => TYPE_PARAMETER_SHA256,
            NameComponentType::Other(v) => v,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NameComponent {
    pub typ: NonZeroU16,
    pub bytes: Box<[u8]>,
}

impl NameComponent {
    pub fn new(typ: NameComponentType, bytes: &[u8]) -> Self {
        Self {
            typ: typ.into(),
            bytes: Box::from(bytes),
        }
    }

    pub fn generic(bytes: &[u8]) -> Self {
        Self::new(NameComponentType::Generic, bytes)
    }

    pub fn implicit_digest(digest: &[u8; 32]) -> Self {
        Self::new(NameComponentType::ImplicitSha256Digest, digest)
    }

    pub fn component_type(&self) -> NameComponentType {
        self.typ.into()
    }

    pub fn is_implicit_digest(&self) -> bool {
        self.typ == TYPE_IMPLICIT_SHA256
    }

    fn encoded_length(&self) -> usize {
        let l = self.bytes.len();
        (self.typ.get() as u64).encoded_length() + (l as u64).encoded_length() + l
    }
}

// Canonical order: by type, then by length, then bytewise.
impl Ord for NameComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.typ
            .cmp(&other.typ)
            .then(self.bytes.len().cmp(&other.bytes.len()))
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl PartialOrd for NameComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An immutable hierarchical name.
///
/// Names compare component by component, so every name that has `P` as a
///  prefix sorts directly after `P` and before any sibling of `P`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: impl IntoIterator<Item = NameComponent>) -> Self {
        Self {
            components: components.into_iter().collect(),
        }
    }

    pub fn components(&self) -> core::slice::Iter<'_, NameComponent> {
        self.components.iter()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn last_component(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    /// The first `count` components (or the whole name, if it is shorter).
    pub fn get_prefix(&self, count: usize) -> Name {
        let count = count.min(self.components.len());
        Name {
            components: self.components[..count].to_vec(),
        }
    }

    pub fn dropping_last_component(&self) -> Option<Name> {
        if self.components.is_empty() {
            return None;
        }
        Some(self.get_prefix(self.components.len() - 1))
    }

    pub fn adding_component(&self, component: NameComponent) -> Name {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.extend_from_slice(&self.components);
        components.push(component);
        Name { components }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.starts_with(&self.components)
    }

    /// Whether the name falls under `/localhost`, which must never leave the node.
    pub fn is_localhost(&self) -> bool {
        match self.components.first() {
            Some(first) => first.typ == TYPE_GENERIC && &*first.bytes == b"localhost",
            None => false,
        }
    }

    /// Parses the value of a Name element.
    pub fn try_decode(component_bytes: &[u8]) -> Option<Self> {
        let mut components = Vec::new();
        for tlv in parse_tlvs(component_bytes) {
            let tlv = tlv.ok()?;
            let typ = NonZeroU16::new(u16::try_from(tlv.typ.get()).ok()?)?;
            if (typ == TYPE_IMPLICIT_SHA256 || typ == TYPE_PARAMETER_SHA256)
                && tlv.val.len() != DIGEST_LENGTH
            {
                return None;
            }
            components.push(NameComponent {
                typ,
                bytes: Box::from(tlv.val),
            });
        }
        Some(Name { components })
    }

    fn component_len(&self) -> usize {
        self.components.iter().map(|c| c.encoded_length()).sum()
    }
}

impl Encode for Name {
    fn encoded_length(&self) -> usize {
        let component_len = self.component_len();
        (TLV_TYPE_NAME as u64).encoded_length()
            + (component_len as u64).encoded_length()
            + component_len
    }

    fn encode(&self, buffer: &mut Vec<u8>) {
        encode_header(TLV_TYPE_NAME, self.component_len(), buffer);
        for component in self.components.iter() {
            encode_header(component.typ.get() as u32, component.bytes.len(), buffer);
            buffer.extend_from_slice(&component.bytes);
        }
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component_type() {
            NameComponentType::Generic => {}
            NameComponentType::ImplicitSha256Digest => {
                f.write_str("sha256digest=")?;
                return write_hex(f, &self.bytes);
            }
            NameComponentType::ParameterSha256Digest => {
                f.write_str("params-sha256=")?;
                return write_hex(f, &self.bytes);
            }
            NameComponentType::Other(typ) => write!(f, "{}=", typ)?,
        }

        // Components made of periods only get three extra, so that "." and ".." stay usable
        if self.bytes.iter().all(|b| *b == b'.') {
            f.write_str("...")?;
        }
        for b in self.bytes.iter() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", *b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in self.components.iter() {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl fmt::Debug for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameParseError {
    #[error("invalid percent-encoding in {0:?}")]
    InvalidPercentEncoding(String),
    #[error("invalid digest in {0:?}")]
    InvalidDigest(String),
    #[error("invalid component type in {0:?}")]
    InvalidComponentType(String),
    #[error("component {0:?} must contain more than two periods")]
    InvalidPeriods(String),
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.strip_prefix("ndn:").unwrap_or(uri);
        let components = uri
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(parse_component)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Name { components })
    }
}

fn parse_component(segment: &str) -> Result<NameComponent, NameParseError> {
    if let Some((prefix, value)) = segment.split_once('=') {
        match prefix {
            "sha256digest" => {
                let digest = parse_digest(value, segment)?;
                return Ok(NameComponent::new(
                    NameComponentType::ImplicitSha256Digest,
                    &digest,
                ));
            }
            "params-sha256" => {
                let digest = parse_digest(value, segment)?;
                return Ok(NameComponent::new(
                    NameComponentType::ParameterSha256Digest,
                    &digest,
                ));
            }
            _ if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {
                let typ = prefix
                    .parse::<u16>()
                    .ok()
                    .and_then(NonZeroU16::new)
                    .ok_or_else(|| NameParseError::InvalidComponentType(segment.to_string()))?;
                let bytes = parse_value(value, segment)?;
                return Ok(NameComponent {
                    typ,
                    bytes: bytes.into_boxed_slice(),
                });
            }
            _ => {}
        }
    }

    let bytes = parse_value(segment, segment)?;
    Ok(NameComponent::generic(&bytes))
}

fn parse_value(value: &str, segment: &str) -> Result<Vec<u8>, NameParseError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut iter = value.bytes();
    while let Some(b) = iter.next() {
        if b == b'%' {
            let hi = iter.next().and_then(hex_value);
            let lo = iter.next().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push(hi << 4 | lo),
                _ => return Err(NameParseError::InvalidPercentEncoding(segment.to_string())),
            }
        } else {
            bytes.push(b);
        }
    }

    if bytes.iter().all(|b| *b == b'.') {
        if bytes.len() < 3 {
            return Err(NameParseError::InvalidPeriods(segment.to_string()));
        }
        bytes.truncate(bytes.len() - 3);
    }
    Ok(bytes)
}

fn parse_digest(value: &str, segment: &str) -> Result<[u8; DIGEST_LENGTH], NameParseError> {
    let invalid = || NameParseError::InvalidDigest(segment.to_string());
    let raw = value.as_bytes();
    if raw.len() != DIGEST_LENGTH * 2 {
        return Err(invalid());
    }
    let mut digest = [0u8; DIGEST_LENGTH];
    for (i, pair) in raw.chunks(2).enumerate() {
        let hi = hex_value(pair[0]).ok_or_else(invalid)?;
        let lo = hex_value(pair[1]).ok_or_else(invalid)?;
        digest[i] = hi << 4 | lo;
    }
    Ok(digest)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
