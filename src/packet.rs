use thiserror::Error;

use crate::{
    hash::{implicit_digest, Sha256Digest},
    name::{Name, NameComponent, TLV_TYPE_NAME},
    tlv::{encode_bytes, encode_header, encode_non_negative, parse_tlvs, Encode, TlvError, TlvIter, TLV},
};

pub const TLV_TYPE_INTEREST: u32 = 5;
pub const TLV_TYPE_DATA: u32 = 6;

const TLV_TYPE_NONCE: u32 = 10;
const TLV_TYPE_INTEREST_LIFETIME: u32 = 12;
const TLV_TYPE_MUST_BE_FRESH: u32 = 18;
const TLV_TYPE_META_INFO: u32 = 20;
const TLV_TYPE_CONTENT: u32 = 21;
const TLV_TYPE_SIGNATURE_INFO: u32 = 22;
const TLV_TYPE_SIGNATURE_VALUE: u32 = 23;
const TLV_TYPE_CONTENT_TYPE: u32 = 24;
const TLV_TYPE_FRESHNESS_PERIOD: u32 = 25;
const TLV_TYPE_FINAL_BLOCK_ID: u32 = 26;
const TLV_TYPE_SIGNATURE_TYPE: u32 = 27;
const TLV_TYPE_KEY_LOCATOR: u32 = 28;
const TLV_TYPE_CAN_BE_PREFIX: u32 = 33;
const TLV_TYPE_HOP_LIMIT: u32 = 34;
const TLV_TYPE_APPLICATION_PARAMETERS: u32 = 36;

pub const SIGNATURE_TYPE_DIGEST_SHA256: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u32),
    #[error("{0} bytes left after the packet")]
    TrailingBytes(usize),
    #[error("packet does not start with a name")]
    MissingName,
    #[error("invalid name")]
    InvalidName,
    #[error("interest name must not be empty")]
    EmptyName,
    #[error("element {typ} is out of order or repeated")]
    OutOfOrder { typ: u32 },
    #[error("unrecognized critical element {typ}")]
    UnrecognizedCritical { typ: u32 },
    #[error("element {typ} has an invalid value")]
    InvalidValue { typ: u32 },
    #[error("required element {typ} is missing")]
    MissingElement { typ: u32 },
}

/// Walks the elements of a packet, enforcing the order of the known ones.
///
/// Unknown non-critical elements are kept verbatim so they can be re-encoded.
struct Elements<'a> {
    iter: TlvIter<'a>,
    order: &'static [u32],
    minimum: usize,
    unknown: Vec<u8>,
}

impl<'a> Elements<'a> {
    fn new(bytes: &'a [u8], order: &'static [u32]) -> Self {
        Self {
            iter: parse_tlvs(bytes),
            order,
            minimum: 0,
            unknown: Vec::new(),
        }
    }

    fn next_known(&mut self) -> Result<Option<TLV<'a>>, DecodeError> {
        loop {
            let tlv = match self.iter.next() {
                Some(tlv) => tlv?,
                None => return Ok(None),
            };
            let typ = tlv.typ.get();
            match self.order.iter().position(|t| *t == typ) {
                Some(idx) if idx < self.minimum => return Err(DecodeError::OutOfOrder { typ }),
                Some(idx) => {
                    self.minimum = idx + 1;
                    return Ok(Some(tlv));
                }
                None if tlv.type_is_critical() => {
                    return Err(DecodeError::UnrecognizedCritical { typ })
                }
                None => tlv.encode(&mut self.unknown),
            }
        }
    }
}

fn decode_name(tlv: Option<TLV<'_>>) -> Result<Name, DecodeError> {
    match tlv {
        Some(tlv) if tlv.typ.get() == TLV_TYPE_NAME => {
            Name::try_decode(tlv.val).ok_or(DecodeError::InvalidName)
        }
        _ => Err(DecodeError::MissingName),
    }
}

fn non_negative(tlv: &TLV<'_>) -> Result<u64, DecodeError> {
    tlv.val_as_u64().ok_or(DecodeError::InvalidValue {
        typ: tlv.typ.get(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub nonce: Option<[u8; 4]>,
    pub interest_lifetime: Option<u64>,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
    unknown_tlvs: Vec<u8>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce: None,
            interest_lifetime: None,
            hop_limit: None,
            application_parameters: None,
            unknown_tlvs: Vec::new(),
        }
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_nonce(mut self, nonce: [u8; 4]) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, ms: u64) -> Self {
        self.interest_lifetime = Some(ms);
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_application_parameters(mut self, parameters: Vec<u8>) -> Self {
        self.application_parameters = Some(parameters);
        self
    }

    /// Whether the name ends with an implicit digest, i.e. it asks for one exact Data packet.
    pub fn has_full_name(&self) -> bool {
        self.name
            .last_component()
            .map_or(false, |c| c.is_implicit_digest())
    }

    pub fn try_decode(inner_bytes: &[u8]) -> Result<Self, DecodeError> {
        const ORDER: &[u32] = &[
            TLV_TYPE_NAME,
            TLV_TYPE_CAN_BE_PREFIX,
            TLV_TYPE_MUST_BE_FRESH,
            TLV_TYPE_NONCE,
            TLV_TYPE_INTEREST_LIFETIME,
            TLV_TYPE_HOP_LIMIT,
            TLV_TYPE_APPLICATION_PARAMETERS,
        ];

        let (first, _) = TLV::try_decode(inner_bytes).map_err(|_| DecodeError::MissingName)?;
        if first.typ.get() != TLV_TYPE_NAME {
            return Err(DecodeError::MissingName); // Name must be the first element
        }

        let mut elements = Elements::new(inner_bytes, ORDER);
        let name = decode_name(elements.next_known()?)?;
        if name.is_empty() {
            return Err(DecodeError::EmptyName);
        }

        let mut interest = Interest::new(name);
        while let Some(tlv) = elements.next_known()? {
            let typ = tlv.typ.get();
            match typ {
                TLV_TYPE_CAN_BE_PREFIX => interest.can_be_prefix = true,
                TLV_TYPE_MUST_BE_FRESH => interest.must_be_fresh = true,
                TLV_TYPE_NONCE => {
                    interest.nonce = Some(
                        tlv.val
                            .try_into()
                            .map_err(|_| DecodeError::InvalidValue { typ })?,
                    )
                }
                TLV_TYPE_INTEREST_LIFETIME => {
                    interest.interest_lifetime = Some(non_negative(&tlv)?)
                }
                TLV_TYPE_HOP_LIMIT => match tlv.val {
                    [hop] => interest.hop_limit = Some(*hop),
                    _ => return Err(DecodeError::InvalidValue { typ }),
                },
                TLV_TYPE_APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(tlv.val.to_vec())
                }
                _ => return Err(DecodeError::UnrecognizedCritical { typ }),
            }
        }
        interest.unknown_tlvs = elements.unknown;

        Ok(interest)
    }

    fn encode_inner(&self, buffer: &mut Vec<u8>) {
        self.name.encode(buffer);
        if self.can_be_prefix {
            encode_header(TLV_TYPE_CAN_BE_PREFIX, 0, buffer);
        }
        if self.must_be_fresh {
            encode_header(TLV_TYPE_MUST_BE_FRESH, 0, buffer);
        }
        if let Some(nonce) = &self.nonce {
            encode_bytes(TLV_TYPE_NONCE, nonce, buffer);
        }
        if let Some(lifetime) = self.interest_lifetime {
            encode_non_negative(TLV_TYPE_INTEREST_LIFETIME, lifetime, buffer);
        }
        if let Some(hop_limit) = self.hop_limit {
            encode_bytes(TLV_TYPE_HOP_LIMIT, &[hop_limit], buffer);
        }
        if let Some(parameters) = &self.application_parameters {
            encode_bytes(TLV_TYPE_APPLICATION_PARAMETERS, parameters, buffer);
        }
        buffer.extend_from_slice(&self.unknown_tlvs);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data {
    pub name: Name,
    pub content_type: Option<u64>,
    pub freshness_period: Option<u64>,
    pub final_block_id: Option<Vec<u8>>,
    pub content: Vec<u8>,
    pub signature_type: u64,
    pub key_locator: Option<Vec<u8>>,
    pub signature_value: Vec<u8>,
    unknown_tlvs: Vec<u8>,
}

impl Data {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content_type: None,
            freshness_period: None,
            final_block_id: None,
            content,
            signature_type: SIGNATURE_TYPE_DIGEST_SHA256,
            key_locator: None,
            signature_value: Vec::new(),
            unknown_tlvs: Vec::new(),
        }
    }

    pub fn with_freshness_period(mut self, ms: u64) -> Self {
        self.freshness_period = Some(ms);
        self
    }

    /// Fills in a DigestSha256 signature over the signed portion of the packet.
    pub fn sign_with_digest(mut self) -> Self {
        self.signature_type = SIGNATURE_TYPE_DIGEST_SHA256;
        self.key_locator = None;
        let mut signed = Vec::new();
        self.encode_signed_portion(&mut signed);
        self.signature_value = implicit_digest(&signed)
            .map(|d| d.0.to_vec())
            .unwrap_or_default();
        self
    }

    pub fn implicit_digest(&self) -> Option<Sha256Digest> {
        implicit_digest(&Packet::encode_data(self))
    }

    /// The name with the implicit digest appended, if digests are available.
    pub fn full_name(&self) -> Option<Name> {
        let digest = self.implicit_digest()?;
        Some(
            self.name
                .adding_component(NameComponent::implicit_digest(&digest.0)),
        )
    }

    pub fn try_decode(inner_bytes: &[u8]) -> Result<Self, DecodeError> {
        const ORDER: &[u32] = &[
            TLV_TYPE_NAME,
            TLV_TYPE_META_INFO,
            TLV_TYPE_CONTENT,
            TLV_TYPE_SIGNATURE_INFO,
            TLV_TYPE_SIGNATURE_VALUE,
        ];

        let mut elements = Elements::new(inner_bytes, ORDER);
        let name = decode_name(elements.next_known()?)?;
        let mut data = Data::new(name, Vec::new());
        let mut signature_info = false;
        let mut signature_value = false;

        while let Some(tlv) = elements.next_known()? {
            let typ = tlv.typ.get();
            match typ {
                TLV_TYPE_META_INFO => data.decode_meta_info(tlv.val)?,
                TLV_TYPE_CONTENT => data.content = tlv.val.to_vec(),
                TLV_TYPE_SIGNATURE_INFO => {
                    data.decode_signature_info(tlv.val)?;
                    signature_info = true;
                }
                TLV_TYPE_SIGNATURE_VALUE => {
                    data.signature_value = tlv.val.to_vec();
                    signature_value = true;
                }
                _ => return Err(DecodeError::UnrecognizedCritical { typ }),
            }
        }
        data.unknown_tlvs = elements.unknown;

        if !signature_info {
            return Err(DecodeError::MissingElement {
                typ: TLV_TYPE_SIGNATURE_INFO,
            });
        }
        if !signature_value {
            return Err(DecodeError::MissingElement {
                typ: TLV_TYPE_SIGNATURE_VALUE,
            });
        }

        Ok(data)
    }

    fn decode_meta_info(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        const ORDER: &[u32] = &[
            TLV_TYPE_CONTENT_TYPE,
            TLV_TYPE_FRESHNESS_PERIOD,
            TLV_TYPE_FINAL_BLOCK_ID,
        ];
        let mut elements = Elements::new(bytes, ORDER);
        while let Some(tlv) = elements.next_known()? {
            match tlv.typ.get() {
                TLV_TYPE_CONTENT_TYPE => self.content_type = Some(non_negative(&tlv)?),
                TLV_TYPE_FRESHNESS_PERIOD => self.freshness_period = Some(non_negative(&tlv)?),
                _ => self.final_block_id = Some(tlv.val.to_vec()),
            }
        }
        Ok(())
    }

    fn decode_signature_info(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        const ORDER: &[u32] = &[TLV_TYPE_SIGNATURE_TYPE, TLV_TYPE_KEY_LOCATOR];
        let mut elements = Elements::new(bytes, ORDER);
        let mut signature_type = None;
        while let Some(tlv) = elements.next_known()? {
            match tlv.typ.get() {
                TLV_TYPE_SIGNATURE_TYPE => signature_type = Some(non_negative(&tlv)?),
                _ => self.key_locator = Some(tlv.val.to_vec()),
            }
        }
        self.signature_type = signature_type.ok_or(DecodeError::MissingElement {
            typ: TLV_TYPE_SIGNATURE_TYPE,
        })?;
        Ok(())
    }

    fn encode_signed_portion(&self, buffer: &mut Vec<u8>) {
        self.name.encode(buffer);

        let mut meta_info = Vec::new();
        if let Some(content_type) = self.content_type {
            encode_non_negative(TLV_TYPE_CONTENT_TYPE, content_type, &mut meta_info);
        }
        if let Some(freshness_period) = self.freshness_period {
            encode_non_negative(TLV_TYPE_FRESHNESS_PERIOD, freshness_period, &mut meta_info);
        }
        if let Some(final_block_id) = &self.final_block_id {
            encode_bytes(TLV_TYPE_FINAL_BLOCK_ID, final_block_id, &mut meta_info);
        }
        if !meta_info.is_empty() {
            encode_bytes(TLV_TYPE_META_INFO, &meta_info, buffer);
        }

        encode_bytes(TLV_TYPE_CONTENT, &self.content, buffer);

        let mut signature_info = Vec::new();
        encode_non_negative(TLV_TYPE_SIGNATURE_TYPE, self.signature_type, &mut signature_info);
        if let Some(key_locator) = &self.key_locator {
            encode_bytes(TLV_TYPE_KEY_LOCATOR, key_locator, &mut signature_info);
        }
        encode_bytes(TLV_TYPE_SIGNATURE_INFO, &signature_info, buffer);
    }

    fn encode_inner(&self, buffer: &mut Vec<u8>) {
        self.encode_signed_portion(buffer);
        encode_bytes(TLV_TYPE_SIGNATURE_VALUE, &self.signature_value, buffer);
        buffer.extend_from_slice(&self.unknown_tlvs);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

impl Packet {
    /// Decodes exactly one packet; anything after it is an error.
    pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
        let (tlv, len) = TLV::try_decode(bytes)?;
        if len != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - len));
        }
        match tlv.typ.get() {
            TLV_TYPE_INTEREST => Ok(Packet::Interest(Interest::try_decode(tlv.val)?)),
            TLV_TYPE_DATA => Ok(Packet::Data(Data::try_decode(tlv.val)?)),
            typ => Err(DecodeError::UnknownPacketType(typ)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Interest(interest) => Self::encode_interest(interest),
            Packet::Data(data) => Self::encode_data(data),
        }
    }

    pub fn encode_interest(interest: &Interest) -> Vec<u8> {
        let mut inner = Vec::new();
        interest.encode_inner(&mut inner);
        Self::wrap(TLV_TYPE_INTEREST, &inner)
    }

    pub fn encode_data(data: &Data) -> Vec<u8> {
        let mut inner = Vec::new();
        data.encode_inner(&mut inner);
        Self::wrap(TLV_TYPE_DATA, &inner)
    }

    fn wrap(typ: u32, inner: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(inner.len() + 8);
        encode_bytes(typ, inner, &mut buffer);
        buffer
    }

    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }
}

impl From<Interest> for Packet {
    fn from(value: Interest) -> Self {
        Packet::Interest(value)
    }
}

impl From<Data> for Packet {
    fn from(value: Data) -> Self {
        Packet::Data(value)
    }
}
