//! DNS message marshaller
//!
//! Serialization is deterministic and never emits name compression; the
//! output length is computed up front so the buffer is allocated once.
//! Section counts are written unconditionally, empty or not.

use crate::error::{Error, Result};
use crate::message::{Message, Question, Record};
use crate::name::Labels;
use crate::types::{FLAG_AA, FLAG_QR, FLAG_RA, FLAG_RD, FLAG_TC};
use crate::{HEADER_LEN, MAX_LABEL_LEN, MAX_NAME_LEN};

impl Message {
    /// Serialize the message to wire form.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let len = self.serialized_len()?;
        let mut buf = Vec::with_capacity(len);

        buf.extend_from_slice(&self.id.to_be_bytes());

        let mut flags = ((self.opcode.0 as u16) & 0xf) << 11;
        flags |= (self.rcode.0 as u16) & 0xf;
        if self.response {
            flags |= FLAG_QR;
        }
        if self.authoritative {
            flags |= FLAG_AA;
        }
        if self.truncated {
            flags |= FLAG_TC;
        }
        if self.recursion_desired {
            flags |= FLAG_RD;
        }
        if self.recursion_available {
            flags |= FLAG_RA;
        }
        buf.extend_from_slice(&flags.to_be_bytes());

        buf.extend_from_slice(&section_count(self.questions.len())?.to_be_bytes());
        buf.extend_from_slice(&section_count(self.answers.len())?.to_be_bytes());
        buf.extend_from_slice(&section_count(self.authority.len())?.to_be_bytes());
        buf.extend_from_slice(&section_count(self.additional.len())?.to_be_bytes());

        for question in &self.questions {
            question.marshal_into(&mut buf)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            record.marshal_into(&mut buf)?;
        }

        debug_assert_eq!(buf.len(), len);
        Ok(buf)
    }

    /// Wire-form length of the message, validating label and name limits.
    pub fn serialized_len(&self) -> Result<usize> {
        let mut len = HEADER_LEN;
        for question in &self.questions {
            len += name_len(&question.labels)? + 4;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            len += name_len(&record.labels)? + 10 + record.rdata.len();
        }
        Ok(len)
    }
}

impl Question {
    fn marshal_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        marshal_labels(buf, &self.labels)?;
        buf.extend_from_slice(&self.qtype.to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_be_bytes());
        Ok(())
    }
}

impl Record {
    fn marshal_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        marshal_labels(buf, &self.labels)?;
        buf.extend_from_slice(&self.rtype.to_be_bytes());
        buf.extend_from_slice(&self.class.to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        let rdata = self.rdata.bytes();
        if rdata.len() > u16::MAX as usize {
            return Err(Error::Malformed(format!(
                "RDATA of {} octets does not fit a 16-bit length",
                rdata.len()
            )));
        }
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(rdata);
        Ok(())
    }
}

fn section_count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::SectionTooLarge(len))
}

fn name_len(labels: &Labels) -> Result<usize> {
    for label in labels.iter() {
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong(label.len()));
        }
    }
    let len = labels.serialized_len();
    if len > MAX_NAME_LEN {
        return Err(Error::NameTooLong(len));
    }
    Ok(len)
}

/// Labels are written as length-prefixed bytes and terminated with the
/// zero label.
fn marshal_labels(buf: &mut Vec<u8>, labels: &Labels) -> Result<()> {
    name_len(labels)?;
    for label in labels.iter() {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Rdata;
    use crate::parse::parse;
    use crate::types::{class, rtype, Rcode};

    #[test]
    fn test_marshal_query() {
        let query = Message::query(0x1234, Labels::from_name("example.com"), rtype::A);
        let wire = query.marshal().unwrap();
        assert_eq!(wire.len(), query.serialized_len().unwrap());
        assert_eq!(&wire[..2], &[0x12, 0x34]);
        assert_eq!(&wire[2..4], &[0x01, 0x00]); // RD only
        assert_eq!(&wire[4..12], &[0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&wire[12..25], b"\x07example\x03com\x00");
    }

    #[test]
    fn test_marshal_writes_empty_section_counts() {
        let message = Message::default();
        let wire = message.marshal().unwrap();
        assert_eq!(wire.len(), HEADER_LEN);
        assert_eq!(&wire[4..12], &[0u8; 8]);
    }

    #[test]
    fn test_roundtrip_response() {
        let mut message = Message::query(0xBEEF, Labels::from_name("veil.example"), rtype::A);
        message.response = true;
        message.authoritative = true;
        message.recursion_available = true;
        message.rcode = Rcode::NO_ERROR;
        message.answers.push(Record {
            labels: Labels::from_name("veil.example"),
            rtype: rtype::A,
            class: class::IN,
            ttl: 600,
            rdata: Rdata::new(vec![10, 0, 0, 1]),
        });
        message.additional.push(Record {
            labels: Labels::root(),
            rtype: rtype::OPT,
            class: 4096,
            ttl: 0,
            rdata: Rdata::empty(),
        });

        let wire = message.marshal().unwrap();
        let parsed = parse(&wire).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_label_too_long() {
        let long = "a".repeat(64);
        let message = Message::query(1, Labels::from_vec(vec![long]), rtype::A);
        assert!(matches!(message.marshal(), Err(Error::LabelTooLong(64))));
    }

    #[test]
    fn test_name_too_long() {
        let labels = Labels::from_vec(vec!["a".repeat(63); 5]);
        let message = Message::query(1, labels, rtype::A);
        assert!(matches!(message.marshal(), Err(Error::NameTooLong(_))));
    }
}
