//! DNS message parser
//!
//! Decodes the RFC 1035 wire form. Compression pointers (two-bit prefix
//! `11`, 14-bit offset) are followed only backward and the chase depth is
//! bounded, so parsing any input of length N halts after O(N) work. The
//! reserved prefixes `01` and `10` are rejected.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::{Message, Question, Rdata, Record};
use crate::name::Labels;
use crate::types::{Opcode, Rcode};
use crate::{HEADER_LEN, MAX_NAME_LEN, MAX_POINTER_HOPS};

/// Parse a DNS message. Trailing octets after the last declared section do
/// not fail the parse; they are logged and dropped.
pub fn parse(packet: &[u8]) -> Result<Message> {
    let (message, trailing) = parse_with_trailing(packet)?;
    if trailing > 0 {
        log::debug!("DNS message carries {} trailing octets", trailing);
    }
    Ok(message)
}

/// Parse a DNS message, returning the number of trailing octets after the
/// last declared section alongside the decoded message.
pub fn parse_with_trailing(packet: &[u8]) -> Result<(Message, usize)> {
    if packet.len() < HEADER_LEN {
        return Err(Error::Truncated {
            offset: 0,
            needed: HEADER_LEN - packet.len(),
        });
    }

    let id = u16::from_be_bytes([packet[0], packet[1]]);
    let flags = u16::from_be_bytes([packet[2], packet[3]]);
    let qdcount = u16::from_be_bytes([packet[4], packet[5]]) as usize;
    let ancount = u16::from_be_bytes([packet[6], packet[7]]) as usize;
    let nscount = u16::from_be_bytes([packet[8], packet[9]]) as usize;
    let arcount = u16::from_be_bytes([packet[10], packet[11]]) as usize;

    let mut message = Message {
        id,
        response: flags & crate::types::FLAG_QR != 0,
        opcode: Opcode(((flags >> 11) & 0xf) as u8),
        authoritative: flags & crate::types::FLAG_AA != 0,
        truncated: flags & crate::types::FLAG_TC != 0,
        recursion_desired: flags & crate::types::FLAG_RD != 0,
        recursion_available: flags & crate::types::FLAG_RA != 0,
        rcode: Rcode((flags & 0xf) as u8),
        ..Default::default()
    };

    // Records share one backing buffer so names compressed inside RDATA
    // stay resolvable.
    let backing: Arc<[u8]> = Arc::from(packet);

    let mut ofs = HEADER_LEN;
    for _ in 0..qdcount {
        let (question, next) = parse_question(packet, ofs)?;
        message.questions.push(question);
        ofs = next;
    }
    for _ in 0..ancount {
        let (record, next) = parse_record(packet, &backing, ofs)?;
        message.answers.push(record);
        ofs = next;
    }
    for _ in 0..nscount {
        let (record, next) = parse_record(packet, &backing, ofs)?;
        message.authority.push(record);
        ofs = next;
    }
    for _ in 0..arcount {
        let (record, next) = parse_record(packet, &backing, ofs)?;
        message.additional.push(record);
        ofs = next;
    }

    Ok((message, packet.len() - ofs))
}

fn parse_question(data: &[u8], ofs: usize) -> Result<(Question, usize)> {
    let (labels, ofs) = parse_labels(data, ofs)?;
    if ofs + 4 > data.len() {
        return Err(Error::Truncated {
            offset: ofs,
            needed: ofs + 4 - data.len(),
        });
    }
    let question = Question {
        labels,
        qtype: u16::from_be_bytes([data[ofs], data[ofs + 1]]),
        qclass: u16::from_be_bytes([data[ofs + 2], data[ofs + 3]]),
    };
    Ok((question, ofs + 4))
}

fn parse_record(data: &[u8], backing: &Arc<[u8]>, ofs: usize) -> Result<(Record, usize)> {
    let (labels, ofs) = parse_labels(data, ofs)?;
    if ofs + 10 > data.len() {
        return Err(Error::Truncated {
            offset: ofs,
            needed: ofs + 10 - data.len(),
        });
    }
    let rtype = u16::from_be_bytes([data[ofs], data[ofs + 1]]);
    let class = u16::from_be_bytes([data[ofs + 2], data[ofs + 3]]);
    let ttl = u32::from_be_bytes([data[ofs + 4], data[ofs + 5], data[ofs + 6], data[ofs + 7]]);
    let rdlength = u16::from_be_bytes([data[ofs + 8], data[ofs + 9]]) as usize;
    let ofs = ofs + 10;

    if ofs + rdlength > data.len() {
        return Err(Error::Truncated {
            offset: ofs,
            needed: ofs + rdlength - data.len(),
        });
    }
    let record = Record {
        labels,
        rtype,
        class,
        ttl,
        rdata: Rdata::window(backing.clone(), ofs, ofs + rdlength)?,
    };
    Ok((record, ofs + rdlength))
}

/// Decode one name starting at `ofs`. Returns the labels and the offset of
/// the first octet after the name (after the first pointer, if the name is
/// compressed).
pub(crate) fn parse_labels(data: &[u8], ofs: usize) -> Result<(Labels, usize)> {
    let mut labels = Labels::root();
    let mut pos = ofs;
    // Offset to resume at after the name; set when the first pointer is taken.
    let mut resume = None;
    let mut hops = 0;
    let mut name_len = 0usize;

    loop {
        if pos >= data.len() {
            return Err(Error::Truncated {
                offset: pos,
                needed: pos + 1 - data.len(),
            });
        }
        let octet = data[pos];
        match octet & 0xc0 {
            0x00 => {
                let len = octet as usize;
                pos += 1;
                if len == 0 {
                    name_len += 1;
                    if name_len > MAX_NAME_LEN {
                        return Err(Error::NameTooLong(name_len));
                    }
                    return Ok((labels, resume.unwrap_or(pos)));
                }
                if pos + len > data.len() {
                    return Err(Error::Truncated {
                        offset: pos,
                        needed: pos + len - data.len(),
                    });
                }
                name_len += 1 + len;
                if name_len >= MAX_NAME_LEN {
                    return Err(Error::NameTooLong(name_len + 1));
                }
                let label = std::str::from_utf8(&data[pos..pos + len])
                    .map_err(|_| Error::Malformed(format!("label at offset {} is not valid UTF-8", pos)))?;
                labels.push(label.to_string());
                pos += len;
            }
            0xc0 => {
                if pos + 1 >= data.len() {
                    return Err(Error::Truncated {
                        offset: pos,
                        needed: pos + 2 - data.len(),
                    });
                }
                let target =
                    (u16::from_be_bytes([octet, data[pos + 1]]) & 0x3fff) as usize;
                if target >= pos {
                    return Err(Error::Malformed(format!(
                        "compression pointer at offset {} does not resolve backward (target {})",
                        pos, target
                    )));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::Malformed(format!(
                        "compression pointer chain deeper than {} hops",
                        MAX_POINTER_HOPS
                    )));
                }
                if resume.is_none() {
                    resume = Some(pos + 2);
                }
                pos = target;
            }
            reserved => {
                return Err(Error::Malformed(format!(
                    "reserved label type {:#04x} at offset {}",
                    reserved >> 6,
                    pos
                )));
            }
        }
    }
}
