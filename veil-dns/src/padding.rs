//! RFC 8467 block-length padding for DoH queries
//!
//! Queries sent over HTTPS are padded to a multiple of 128 octets with the
//! EDNS(0) Padding option (RFC 7830) so that message lengths leak as little
//! as possible. The option is emitted even when no pad bytes are needed,
//! keeping the message shape stable.

use crate::error::Result;
use crate::message::{Message, Rdata, Record};
use crate::name::Labels;
use crate::types::{opt_code, rtype};

/// Padded queries are a multiple of this many octets
pub const PAD_BLOCK: usize = 128;

/// Wire cost of an empty OPT record with a root owner name:
/// name(1) + type(2) + class(2) + ttl(4) + rdlength(2)
const OPT_RECORD_LEN: usize = 11;

/// Wire cost of the Padding option header: code(2) + length(2)
const OPT_HEADER_LEN: usize = 4;

/// Pad `message` so its serialized length is a multiple of [`PAD_BLOCK`]
/// and return the padded wire form.
///
/// An OPT additional record (class 4096, TTL 0) is inserted when the
/// message has none. A message that already carries a Padding option is
/// reserialized unchanged.
pub fn pad_message(message: &mut Message) -> Result<Vec<u8>> {
    let mut len = message.serialized_len()?;

    let opt_index = match message
        .additional
        .iter()
        .position(|r| r.rtype == rtype::OPT)
    {
        Some(index) => index,
        None => {
            message.additional.push(Record {
                labels: Labels::root(),
                rtype: rtype::OPT,
                class: 4096,
                ttl: 0,
                rdata: Rdata::empty(),
            });
            len += OPT_RECORD_LEN;
            message.additional.len() - 1
        }
    };

    let opt = &mut message.additional[opt_index];
    if opt.edns_option(opt_code::PADDING).is_some() {
        return message.marshal();
    }

    len += OPT_HEADER_LEN;
    let pad_len = (PAD_BLOCK - len % PAD_BLOCK) % PAD_BLOCK;

    let old = opt.rdata.bytes();
    let mut rdata = Vec::with_capacity(old.len() + OPT_HEADER_LEN + pad_len);
    rdata.extend_from_slice(old);
    rdata.extend_from_slice(&opt_code::PADDING.to_be_bytes());
    rdata.extend_from_slice(&(pad_len as u16).to_be_bytes());
    rdata.resize(rdata.len() + pad_len, 0);
    opt.rdata = Rdata::new(rdata);

    message.marshal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::types::rtype;

    #[test]
    fn test_padding_inserts_opt_record() {
        let mut query = Message::query(1, Labels::from_name("example.org"), rtype::A);
        let wire = pad_message(&mut query).unwrap();

        assert_eq!(wire.len() % PAD_BLOCK, 0);
        let parsed = parse(&wire).unwrap();
        let opt = parsed.additional_of_type(rtype::OPT).expect("OPT record");
        assert_eq!(opt.class, 4096);
        assert_eq!(opt.ttl, 0);
        assert!(opt.edns_option(opt_code::PADDING).is_some());
    }

    #[test]
    fn test_padding_preserves_question() {
        let mut query = Message::query(7, Labels::from_name("example.org"), rtype::A);
        let wire = pad_message(&mut query).unwrap();
        let parsed = parse(&wire).unwrap();
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].labels.to_string(), "example.org");
    }

    #[test]
    fn test_padding_various_name_lengths() {
        for len in [1usize, 10, 30, 60, 100] {
            let name = "a".repeat(len.min(63));
            let labels = Labels::from_vec(vec![name, "example".into(), "com".into()]);
            let mut query = Message::query(9, labels, rtype::AAAA);
            let wire = pad_message(&mut query).unwrap();
            assert_eq!(wire.len() % PAD_BLOCK, 0, "name length {}", len);
        }
    }

    #[test]
    fn test_padding_option_emitted_when_aligned() {
        // craft a query whose length with the option header is already a
        // multiple of the block: the option must still be present
        let mut hit = false;
        for len in 1..=63usize {
            let labels =
                Labels::from_vec(vec!["a".repeat(len), "b".repeat(50), "com".into()]);
            let mut query = Message::query(3, labels, rtype::A);
            let base = query.serialized_len().unwrap() + OPT_RECORD_LEN + OPT_HEADER_LEN;
            if base % PAD_BLOCK != 0 {
                continue;
            }
            hit = true;
            let wire = pad_message(&mut query).unwrap();
            assert_eq!(wire.len(), base);
            let parsed = parse(&wire).unwrap();
            let opt = parsed.additional_of_type(rtype::OPT).unwrap();
            assert_eq!(opt.edns_option(opt_code::PADDING), Some(&[][..]));
        }
        assert!(hit, "no aligned case exercised");
    }

    #[test]
    fn test_existing_padding_left_alone() {
        let mut query = Message::query(5, Labels::from_name("example.org"), rtype::A);
        let first = pad_message(&mut query).unwrap();
        // a second pass must not grow the message
        let second = pad_message(&mut query).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_opt_record_is_extended() {
        let mut query = Message::query(6, Labels::from_name("example.org"), rtype::A);
        query.additional.push(Record {
            labels: Labels::root(),
            rtype: rtype::OPT,
            class: 1232,
            ttl: 0,
            // carries a COOKIE option already
            rdata: Rdata::new(vec![0, 10, 0, 2, 0xaa, 0xbb]),
        });

        let wire = pad_message(&mut query).unwrap();
        assert_eq!(wire.len() % PAD_BLOCK, 0);
        let parsed = parse(&wire).unwrap();
        let opt = parsed.additional_of_type(rtype::OPT).unwrap();
        assert_eq!(opt.class, 1232);
        assert_eq!(opt.edns_option(opt_code::COOKIE), Some(&[0xaa, 0xbb][..]));
        assert!(opt.edns_option(opt_code::PADDING).is_some());
    }
}
