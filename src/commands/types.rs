//! Typed command results and their payload grammars.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::Base64Codec;
use crate::error::{Result, VscpError};
use crate::protocol::{parse_number, Guid};

/// Server version as reported by `VERSION` (`major,minor,release,build`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub major: u8,
    pub minor: u8,
    pub release: u8,
    pub build: u16,
}

impl FromStr for RemoteVersion {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().split(',').collect();
        if fields.len() != 4 {
            return Err(malformed("version", s));
        }
        Ok(Self {
            major: parse_number(fields[0], "version major")?,
            minor: parse_number(fields[1], "version minor")?,
            release: parse_number(fields[2], "version release")?,
            build: parse_number(fields[3], "version build")?,
        })
    }
}

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.release, self.build)
    }
}

/// One entry of `INTERFACE LIST` (`index,type,guid,name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub index: u32,
    /// Interface kind (internal, level I driver, level II driver, client...).
    pub kind: u16,
    pub guid: Guid,
    /// Free text, may itself contain commas.
    pub name: String,
}

impl FromStr for Interface {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.splitn(4, ',').collect();
        if fields.len() < 3 {
            return Err(malformed("interface", s));
        }
        Ok(Self {
            index: parse_number(fields[0], "interface index")?,
            kind: parse_number(fields[1], "interface type")?,
            guid: guid(fields[2])?,
            name: fields.get(3).map_or("", |n| n.trim()).to_string(),
        })
    }
}

/// Channel counters reported by `STAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub bus_off: u64,
    pub bus_warnings: u64,
    pub overruns: u64,
    pub received_data: u64,
    pub received_frames: u64,
    pub transmitted_data: u64,
    pub transmitted_frames: u64,
}

impl FromStr for Statistics {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let counters = s
            .trim()
            .split(',')
            .map(|f| parse_number::<u64>(f, "statistics counter"))
            .collect::<Result<Vec<u64>>>()?;
        let [bus_off, bus_warnings, overruns, received_data, received_frames, transmitted_data, transmitted_frames] =
            counters[..]
        else {
            return Err(malformed("statistics", s));
        };
        Ok(Self {
            bus_off,
            bus_warnings,
            overruns,
            received_data,
            received_frames,
            transmitted_data,
            transmitted_frames,
        })
    }
}

/// Channel status reported by `INFO` (`status,code,subcode,text`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub status: u32,
    pub error_code: u32,
    pub error_subcode: u32,
    pub error_text: String,
}

impl FromStr for ChannelInfo {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.splitn(4, ',').collect();
        if fields.len() < 3 {
            return Err(malformed("channel info", s));
        }
        Ok(Self {
            status: parse_number(fields[0], "status")?,
            error_code: parse_number(fields[1], "error code")?,
            error_subcode: parse_number(fields[2], "error subcode")?,
            error_text: fields.get(3).map_or("", |t| t.trim()).to_string(),
        })
    }
}

/// Channel filter or mask for `SETFILTER` / `SETMASK`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub priority: u8,
    pub vscp_class: u16,
    pub vscp_type: u16,
    pub guid: Guid,
}

impl Filter {
    /// Argument text: `priority,class,type,guid`.
    pub fn to_argument(&self) -> String {
        format!(
            "{:#04x},{:#06x},{:#06x},{}",
            self.priority, self.vscp_class, self.vscp_type, self.guid
        )
    }
}

/// Variable types whose value travels base64 encoded: string, blob, mime
/// and everything from html (100) upwards.
pub fn is_base64_type(var_type: u16) -> bool {
    matches!(var_type, 1 | 16 | 17) || var_type >= 100
}

/// One line of `VAR LIST`: `index;name;type;owner;rights;persistent;lastchange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub index: u32,
    pub name: String,
    pub var_type: u16,
    pub owner: u32,
    pub rights: u32,
    pub persistent: bool,
    pub last_change: String,
}

impl FromStr for VariableEntry {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(';').collect();
        if fields.len() != 7 {
            return Err(malformed("variable list entry", s));
        }
        Ok(Self {
            index: parse_number(fields[0], "variable index")?,
            name: fields[1].trim().to_string(),
            var_type: parse_number(fields[2], "variable type")?,
            owner: parse_number(fields[3], "variable owner")?,
            rights: parse_number(fields[4], "variable rights")?,
            persistent: flag(fields[5])?,
            last_change: fields[6].trim().to_string(),
        })
    }
}

/// Result of `VAR READ`:
/// `name;type;persistent;owner;rights;lastchange;value;note`.
///
/// `value` is decoded when the type is base64 transported; `note` is always
/// decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub var_type: u16,
    pub persistent: bool,
    pub owner: u32,
    pub rights: u32,
    pub last_change: String,
    pub value: String,
    pub note: String,
}

impl FromStr for Variable {
    type Err = VscpError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(';').collect();
        if fields.len() < 7 {
            return Err(malformed("variable", s));
        }
        let var_type = parse_number(fields[1], "variable type")?;
        let raw_value = fields[6].trim();
        let value = if is_base64_type(var_type) {
            Base64Codec::decode(raw_value)?
        } else {
            raw_value.to_string()
        };
        let note = match fields.get(7) {
            Some(note) => Base64Codec::decode(note)?,
            None => String::new(),
        };

        Ok(Self {
            name: fields[0].trim().to_string(),
            var_type,
            persistent: flag(fields[2])?,
            owner: parse_number(fields[3], "variable owner")?,
            rights: parse_number(fields[4], "variable rights")?,
            last_change: fields[5].trim().to_string(),
            value,
            note,
        })
    }
}

/// Argument of `VAR WRITE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableWrite {
    pub name: String,
    pub var_type: u16,
    pub persistent: bool,
    pub owner: u32,
    pub rights: u32,
    /// Plain value; encoded on the wire when the type requires it.
    pub value: String,
    pub note: String,
}

impl VariableWrite {
    /// String variable with default owner and rights.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: 1,
            persistent: false,
            owner: 0,
            rights: 0o744,
            value: value.into(),
            note: String::new(),
        }
    }

    /// Argument text: `name;type;persistent;owner;rights;value;note`.
    pub fn to_argument(&self) -> Result<String> {
        check_variable_name(&self.name)?;
        let value = if is_base64_type(self.var_type) {
            Base64Codec::encode(&self.value)
        } else if self.value.contains([';', '\r', '\n']) {
            return Err(VscpError::InvalidArgument(format!(
                "value of type {} variable {:?} contains a separator",
                self.var_type, self.name
            )));
        } else {
            self.value.clone()
        };

        Ok(format!(
            "{};{};{};{};{};{};{}",
            self.name,
            self.var_type,
            self.persistent,
            self.owner,
            self.rights,
            value,
            Base64Codec::encode(&self.note)
        ))
    }
}

/// Variable names are single tokens without separators.
pub(crate) fn check_variable_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == ';' || c.is_whitespace()) {
        return Err(VscpError::InvalidArgument(format!(
            "invalid variable name {:?}",
            name
        )));
    }
    Ok(())
}

/// Capability bytes of `WCYD` (`00-00-...-03`).
pub(crate) fn parse_capabilities(s: &str) -> Result<Vec<u8>> {
    s.trim()
        .split(['-', ','])
        .filter(|f| !f.trim().is_empty())
        .map(|f| {
            u8::from_str_radix(f.trim(), 16).map_err(|_| malformed("capability byte", f))
        })
        .collect()
}

pub(crate) fn guid(s: &str) -> Result<Guid> {
    s.trim().parse().map_err(|_| malformed("GUID", s))
}

fn flag(field: &str) -> Result<bool> {
    match field.trim() {
        "true" | "TRUE" | "1" => Ok(true),
        "false" | "FALSE" | "0" => Ok(false),
        other => Err(malformed("persistence flag", other)),
    }
}

fn malformed(what: &str, text: &str) -> VscpError {
    VscpError::MalformedResponse(format!("bad {}: {:?}", what, text))
}
