//! VSCP event line codec.
//!
//! Event lines are used by `SEND`, `RETR` and the receive loop:
//! ```text
//! head,class,type,obid,datetime,timestamp,guid,data0,data1,...
//! ```
//! Numeric fields are decimal or `0x` prefixed hexadecimal. For classes in
//! the Level I over Level II range the first 16 data fields carry the GUID
//! of the bridged interface, the real data follows.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VscpError};

/// Classes that carry a Level I event over Level II with a leading GUID
/// block in the data.
// Boundary as used by VSCP Works; still to be checked against the VSCP spec.
pub const LEVEL1_OVER_LEVEL2: Range<u16> = 512..1024;

/// GUID length in bytes.
pub const GUID_LEN: usize = 16;

/// Maximum Level II data length.
pub const MAX_DATA_LEN: usize = 512;

/// Minimum number of fields before the data section.
const HEADER_FIELDS: usize = 7;

/// 16-byte VSCP GUID, written as colon separated hex (`FF:FF:...:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Guid(pub [u8; GUID_LEN]);

impl Guid {
    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }
}

impl FromStr for Guid {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != GUID_LEN {
            return Err(VscpError::InvalidArgument(format!(
                "GUID must have {} colon separated bytes: {:?}",
                GUID_LEN, s
            )));
        }

        let mut bytes = [0u8; GUID_LEN];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part.trim(), 16).map_err(|_| {
                VscpError::InvalidArgument(format!("invalid GUID byte {:?} in {:?}", part, s))
            })?;
        }
        Ok(Guid(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// A decoded VSCP event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Header flags (priority, hard-coded, ...).
    pub head: u16,
    /// VSCP class.
    pub vscp_class: u16,
    /// VSCP type.
    pub vscp_type: u16,
    /// Object id assigned by the server.
    pub obid: u32,
    /// UTC date/time as sent by the server, if present.
    pub date_time: Option<String>,
    /// Microsecond timestamp.
    pub timestamp: u32,
    /// Originating GUID as sent on the wire. `-` means the interface GUID.
    pub guid: String,
    /// GUID of the bridged interface for Level I over Level II classes.
    pub bridged_guid: Option<Guid>,
    /// Data bytes (after the bridged GUID block, if any).
    pub data: Vec<u8>,
}

impl Event {
    /// Create an event with the given class and type, using the interface
    /// GUID and no data.
    pub fn new(vscp_class: u16, vscp_type: u16) -> Self {
        Self {
            vscp_class,
            vscp_type,
            guid: "-".to_string(),
            ..Self::default()
        }
    }

    /// Set the data bytes.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Whether this class uses the bridged GUID block.
    #[inline]
    pub fn is_level1_over_level2(&self) -> bool {
        LEVEL1_OVER_LEVEL2.contains(&self.vscp_class)
    }

    /// Parse one event line.
    ///
    /// # Example
    ///
    /// ```
    /// use vscp_client::protocol::Event;
    ///
    /// let ev = Event::parse_line("0,10,6,0,,0,GUID,1,2,3").unwrap();
    /// assert_eq!(ev.vscp_class, 10);
    /// assert_eq!(ev.vscp_type, 6);
    /// assert_eq!(ev.data, vec![1, 2, 3]);
    /// ```
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() < HEADER_FIELDS {
            return Err(VscpError::MalformedResponse(format!(
                "event line has {} fields, need at least {}: {:?}",
                fields.len(),
                HEADER_FIELDS,
                line
            )));
        }

        let head = parse_number::<u16>(fields[0], "head")?;
        let vscp_class = parse_number::<u16>(fields[1], "class")?;
        let vscp_type = parse_number::<u16>(fields[2], "type")?;
        let obid = parse_optional_number::<u32>(fields[3], "obid")?;
        let date_time = Some(fields[4].trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let timestamp = parse_optional_number::<u32>(fields[5], "timestamp")?;
        let guid = fields[6].trim().to_string();

        let mut data = fields[HEADER_FIELDS..]
            .iter()
            .filter(|f| !f.trim().is_empty())
            .map(|f| parse_number::<u8>(f, "data"))
            .collect::<Result<Vec<u8>>>()?;

        let mut bridged_guid = None;
        if LEVEL1_OVER_LEVEL2.contains(&vscp_class) && data.len() >= GUID_LEN {
            let mut bytes = [0u8; GUID_LEN];
            bytes.copy_from_slice(&data[..GUID_LEN]);
            bridged_guid = Some(Guid(bytes));
            data.drain(..GUID_LEN);
        }

        Ok(Self {
            head,
            vscp_class,
            vscp_type,
            obid,
            date_time,
            timestamp,
            guid,
            bridged_guid,
            data,
        })
    }

    /// Check that the event can be written as a single `SEND` line.
    pub fn validate(&self) -> Result<()> {
        let guid = self.guid.trim();
        if guid.is_empty() || guid.contains([',', ' ', '\r', '\n']) {
            return Err(VscpError::InvalidArgument(format!(
                "event GUID {:?} is empty or contains a separator",
                self.guid
            )));
        }
        if let Some(dt) = &self.date_time {
            if dt.contains([',', '\r', '\n']) {
                return Err(VscpError::InvalidArgument(format!(
                    "event date/time {:?} contains a separator",
                    dt
                )));
            }
        }

        let bridged_len = self.bridged_guid.map_or(0, |_| GUID_LEN);
        if self.data.len() + bridged_len > MAX_DATA_LEN {
            return Err(VscpError::InvalidArgument(format!(
                "event data too long: {} bytes, max {}",
                self.data.len() + bridged_len,
                MAX_DATA_LEN
            )));
        }
        if self.bridged_guid.is_some() && !self.is_level1_over_level2() {
            return Err(VscpError::InvalidArgument(format!(
                "bridged GUID given for class {} outside {:?}",
                self.vscp_class, LEVEL1_OVER_LEVEL2
            )));
        }
        Ok(())
    }

    /// Encode as an event line (no CRLF).
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{},{},{},{},{},{},{}",
            self.head,
            self.vscp_class,
            self.vscp_type,
            self.obid,
            self.date_time.as_deref().unwrap_or(""),
            self.timestamp,
            self.guid.trim(),
        );

        let bridged = self.bridged_guid.iter().flat_map(|g| g.0);
        for byte in bridged.chain(self.data.iter().copied()) {
            line.push(',');
            line.push_str(&byte.to_string());
        }
        line
    }
}

impl FromStr for Event {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        Event::parse_line(s)
    }
}

/// Parse a decimal or `0x` hexadecimal field into any unsigned width.
pub(crate) fn parse_number<T: TryFrom<u64>>(field: &str, what: &str) -> Result<T> {
    let field = field.trim();
    let parsed = match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse::<u64>(),
    };

    parsed
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| VscpError::MalformedResponse(format!("invalid {} field {:?}", what, field)))
}

fn parse_optional_number<T: TryFrom<u64> + Default>(field: &str, what: &str) -> Result<T> {
    if field.trim().is_empty() {
        Ok(T::default())
    } else {
        parse_number(field, what)
    }
}
