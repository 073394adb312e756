//! DNS protocol constants and display helpers
//!
//! Record types, classes, opcodes, response codes and EDNS option codes,
//! with textual names for the ones that show up in logs. Unknown values
//! round-trip untouched; only rendering falls back to a numeric form.

use std::fmt;

/// Header flag masks (16-bit flags word, QR at bit 15)
pub const FLAG_QR: u16 = 0x8000;
pub const FLAG_AA: u16 = 0x0400;
pub const FLAG_TC: u16 = 0x0200;
pub const FLAG_RD: u16 = 0x0100;
pub const FLAG_RA: u16 = 0x0080;

/// DNS operation code, a 4-bit header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Opcode(pub u8);

impl Opcode {
    pub const QUERY: Opcode = Opcode(0);
    pub const IQUERY: Opcode = Opcode(1);
    pub const STATUS: Opcode = Opcode(2);
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Opcode::QUERY => write!(f, "QUERY"),
            Opcode::IQUERY => write!(f, "IQUERY"),
            Opcode::STATUS => write!(f, "STATUS"),
            Opcode(v) => write!(f, "OPCODE{}", v),
        }
    }
}

/// DNS response code, a 4-bit header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rcode(pub u8);

impl Rcode {
    pub const NO_ERROR: Rcode = Rcode(0);
    pub const FORM_ERR: Rcode = Rcode(1);
    pub const SERV_FAIL: Rcode = Rcode(2);
    pub const NX_DOMAIN: Rcode = Rcode(3);
    pub const NOT_IMP: Rcode = Rcode(4);
    pub const REFUSED: Rcode = Rcode(5);
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Rcode::NO_ERROR => "No Error",
            Rcode::FORM_ERR => "Format Error",
            Rcode::SERV_FAIL => "Server Failure",
            Rcode::NX_DOMAIN => "Non-Existent Domain",
            Rcode::NOT_IMP => "Not Implemented",
            Rcode::REFUSED => "Query Refused",
            Rcode(v) => return write!(f, "RCODE{}", v),
        };
        write!(f, "{}", name)
    }
}

/// Resource record types
pub mod rtype {
    pub const A: u16 = 1;
    pub const NS: u16 = 2;
    pub const CNAME: u16 = 5;
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    pub const MX: u16 = 15;
    pub const TXT: u16 = 16;
    pub const AAAA: u16 = 28;
    pub const SRV: u16 = 33;
    pub const OPT: u16 = 41;
    pub const HTTPS: u16 = 65;
    pub const ANY: u16 = 255;

    /// Textual name of a record type
    pub fn name(t: u16) -> String {
        match t {
            A => "A".into(),
            NS => "NS".into(),
            CNAME => "CNAME".into(),
            SOA => "SOA".into(),
            PTR => "PTR".into(),
            MX => "MX".into(),
            TXT => "TXT".into(),
            AAAA => "AAAA".into(),
            SRV => "SRV".into(),
            OPT => "OPT".into(),
            HTTPS => "HTTPS".into(),
            ANY => "ANY".into(),
            other => format!("TYPE{}", other),
        }
    }
}

/// Record classes
pub mod class {
    pub const IN: u16 = 1;
    pub const CH: u16 = 3;
    pub const HS: u16 = 4;
    pub const NONE: u16 = 254;
    pub const ANY: u16 = 255;

    /// Textual name of a record class
    pub fn name(c: u16) -> String {
        match c {
            IN => "IN".into(),
            CH => "CH".into(),
            HS => "HS".into(),
            NONE => "NONE".into(),
            ANY => "ANY".into(),
            other => format!("CLASS{}", other),
        }
    }
}

/// EDNS(0) option codes carried in OPT RDATA
pub mod opt_code {
    pub const NSID: u16 = 3;
    pub const CLIENT_SUBNET: u16 = 8;
    pub const COOKIE: u16 = 10;
    pub const PADDING: u16 = 12;
}

/// Render a TTL in a compact human-readable form, e.g. `90` -> `1m30s`.
pub fn format_ttl(ttl: u32) -> String {
    if ttl <= 60 {
        format!("{}s", ttl)
    } else if ttl <= 60 * 60 {
        format!("{}m{}s", ttl / 60, ttl % 60)
    } else {
        format!("{}h{}m{}s", ttl / 3600, (ttl % 3600) / 60, (ttl % 3600) % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rcode_names() {
        assert_eq!(Rcode::NX_DOMAIN.to_string(), "Non-Existent Domain");
        assert_eq!(Rcode(13).to_string(), "RCODE13");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(rtype::name(rtype::AAAA), "AAAA");
        assert_eq!(rtype::name(999), "TYPE999");
    }

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(45), "45s");
        assert_eq!(format_ttl(90), "1m30s");
        assert_eq!(format_ttl(3600), "60m0s");
        assert_eq!(format_ttl(7305), "2h1m45s");
    }
}
