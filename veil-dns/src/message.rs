//! DNS message model
//!
//! A [`Message`] holds the decoded header bit-fields and the four record
//! sections. Resource-record RDATA is kept as a window into a shared
//! backing buffer so type-specific readers (OPT options, names inside
//! CNAME/NS RDATA) can walk it without copying.

use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::name::Labels;
use crate::types::{class, rtype, Opcode, Rcode};

/// A decoded DNS message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    /// 16-bit transaction ID
    pub id: u16,
    /// QR flag: false = query, true = response
    pub response: bool,
    pub opcode: Opcode,
    /// AA flag
    pub authoritative: bool,
    /// TC flag
    pub truncated: bool,
    /// RD flag
    pub recursion_desired: bool,
    /// RA flag
    pub recursion_available: bool,
    pub rcode: Rcode,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

/// A question section entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub labels: Labels,
    pub qtype: u16,
    pub qclass: u16,
}

/// A resource record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub labels: Labels,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Rdata,
}

/// RDATA as a window into a shared backing buffer
///
/// Parsed records share one buffer (the whole received message) so that
/// names compressed inside RDATA can still be resolved against it.
/// Synthesized records own a buffer of exactly their RDATA.
#[derive(Debug, Clone)]
pub struct Rdata {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl Rdata {
    /// An empty RDATA window
    pub fn empty() -> Self {
        Rdata {
            data: Arc::from(&[][..]),
            start: 0,
            end: 0,
        }
    }

    /// RDATA owning exactly the given bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Rdata {
            data: bytes.into(),
            start: 0,
            end,
        }
    }

    /// A window into a shared buffer. The window must lie within the
    /// buffer and be non-inverted.
    pub fn window(data: Arc<[u8]>, start: usize, end: usize) -> Result<Self> {
        if start > end || end > data.len() {
            return Err(Error::BadWindow {
                start,
                end,
                len: data.len(),
            });
        }
        Ok(Rdata { data, start, end })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The backing buffer and the window start offset within it. Used to
    /// resolve compression pointers found inside RDATA.
    pub(crate) fn backing(&self) -> (&[u8], usize) {
        (&self.data, self.start)
    }
}

impl PartialEq for Rdata {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for Rdata {}

impl Record {
    /// Look up an EDNS(0) option inside an OPT record's RDATA.
    ///
    /// OPT RDATA is a sequence of (option-code, length, body) triples.
    /// Returns the option body, or `None` when the option is absent or the
    /// triple sequence ends short.
    pub fn edns_option(&self, code: u16) -> Option<&[u8]> {
        let data = self.rdata.bytes();
        let mut ofs = 0;
        while ofs + 4 <= data.len() {
            let opt = u16::from_be_bytes([data[ofs], data[ofs + 1]]);
            let len = u16::from_be_bytes([data[ofs + 2], data[ofs + 3]]) as usize;
            ofs += 4;
            if ofs + len > data.len() {
                return None;
            }
            if opt == code {
                return Some(&data[ofs..ofs + len]);
            }
            ofs += len;
        }
        None
    }

    /// Decode a single name stored in this record's RDATA (CNAME, NS,
    /// PTR). Compression pointers are resolved against the backing buffer
    /// the record was parsed from.
    pub fn rdata_name(&self) -> Result<Labels> {
        let (backing, start) = self.rdata.backing();
        let (labels, _) = crate::parse::parse_labels(backing, start)?;
        Ok(labels)
    }

    /// Render RDATA semantically for the record types the gateway logs
    /// about; other types yield `None` and are dumped as raw bytes.
    pub fn rdata_text(&self) -> Option<String> {
        let data = self.rdata.bytes();
        match self.rtype {
            rtype::A => {
                let octets: [u8; 4] = data.try_into().ok()?;
                Some(Ipv4Addr::from(octets).to_string())
            }
            rtype::AAAA => {
                let octets: [u8; 16] = data.try_into().ok()?;
                Some(Ipv6Addr::from(octets).to_string())
            }
            rtype::CNAME | rtype::NS | rtype::PTR => {
                self.rdata_name().ok().map(|l| l.to_string())
            }
            rtype::TXT => {
                let mut out = String::new();
                let mut ofs = 0;
                while ofs < data.len() {
                    let len = data[ofs] as usize;
                    ofs += 1;
                    if ofs + len > data.len() {
                        return None;
                    }
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&String::from_utf8_lossy(&data[ofs..ofs + len]));
                    ofs += len;
                }
                Some(out)
            }
            _ => None,
        }
    }
}

impl Message {
    /// True when the QR flag marks this message as a query.
    pub fn is_query(&self) -> bool {
        !self.response
    }

    /// Build a recursion-desired query for a single question.
    pub fn query(id: u16, labels: Labels, qtype: u16) -> Self {
        Message {
            id,
            recursion_desired: true,
            questions: vec![Question {
                labels,
                qtype,
                qclass: class::IN,
            }],
            ..Default::default()
        }
    }

    /// First additional record of the given type, if any.
    pub fn additional_of_type(&self, rtype: u16) -> Option<&Record> {
        self.additional.iter().find(|r| r.rtype == rtype)
    }

    /// Multi-line debug rendering of the message, in the shape the logs
    /// use at trace level.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let qr = if self.response { "response" } else { "query" };
        let _ = writeln!(
            out,
            "DNS {:04x}: {} {} AA={} TC={} RD={} RA={} ({})",
            self.id,
            qr,
            self.opcode,
            self.authoritative,
            self.truncated,
            self.recursion_desired,
            self.recursion_available,
            self.rcode
        );
        for q in &self.questions {
            let _ = writeln!(
                out,
                "  Q: {} {} {}",
                q.labels,
                rtype::name(q.qtype),
                class::name(q.qclass)
            );
        }
        for (prefix, section) in [
            ("AN", &self.answers),
            ("NS", &self.authority),
            ("AR", &self.additional),
        ] {
            for r in section {
                let rdata = match r.rdata_text() {
                    Some(text) => text,
                    None => format!("{} octets", r.rdata.len()),
                };
                let _ = writeln!(
                    out,
                    "  {}: {} {} TTL={} {}",
                    prefix,
                    r.labels,
                    rtype::name(r.rtype),
                    crate::types::format_ttl(r.ttl),
                    rdata
                );
            }
        }
        out
    }
}
