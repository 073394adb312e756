//! Integration tests for the DNS wire codec
//!
//! Exercises the parse/marshal round-trip, compression tolerance, pointer
//! safety on hostile input, and the padding invariant end-to-end.

use veil_dns::types::{class, opt_code, rtype, Rcode};
use veil_dns::{
    pad_message, parse, parse_with_trailing, Labels, Message, Question, Rdata, Record,
    PAD_BLOCK,
};

fn a_record(name: &str, ttl: u32, addr: [u8; 4]) -> Record {
    Record {
        labels: Labels::from_name(name),
        rtype: rtype::A,
        class: class::IN,
        ttl,
        rdata: Rdata::new(addr.to_vec()),
    }
}

#[test]
fn roundtrip_uncompressed_messages() {
    let mut response = Message::query(0x0101, Labels::from_name("one.example.net"), rtype::A);
    response.response = true;
    response.recursion_available = true;
    response.answers.push(a_record("one.example.net", 60, [192, 0, 2, 1]));
    response.answers.push(a_record("one.example.net", 60, [192, 0, 2, 2]));
    response.authority.push(Record {
        labels: Labels::from_name("example.net"),
        rtype: rtype::NS,
        class: class::IN,
        ttl: 86400,
        // uncompressed name: ns1.example.net
        rdata: Rdata::new(b"\x03ns1\x07example\x03net\x00".to_vec()),
    });
    response.additional.push(Record {
        labels: Labels::root(),
        rtype: rtype::OPT,
        class: 4096,
        ttl: 0,
        rdata: Rdata::empty(),
    });

    let wire = response.marshal().unwrap();
    let parsed = parse(&wire).unwrap();
    assert_eq!(parsed, response);

    // marshalling the parsed copy is byte-identical
    assert_eq!(parsed.marshal().unwrap(), wire);
}

#[test]
fn roundtrip_preserves_header_bits() {
    for (qr, aa, tc, rd, ra) in [
        (false, false, false, true, false),
        (true, true, false, true, true),
        (true, false, true, false, false),
    ] {
        let mut message = Message::query(0x4242, Labels::from_name("bits.example"), rtype::TXT);
        message.response = qr;
        message.authoritative = aa;
        message.truncated = tc;
        message.recursion_desired = rd;
        message.recursion_available = ra;
        message.rcode = Rcode::SERV_FAIL;

        let parsed = parse(&message.marshal().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }
}

#[test]
fn compressed_names_resolve_through_pointer_chain() {
    // hand-built response: question `www.example.com`, one CNAME answer
    // whose owner points at the question name and whose RDATA name points
    // at the `example.com` suffix
    let mut wire = vec![0x10, 0x20, 0x81, 0x80, 0, 1, 0, 1, 0, 0, 0, 0];
    wire.extend_from_slice(b"\x03www\x07example\x03com\x00"); // offset 12
    wire.extend_from_slice(&[0, 1, 0, 1]);
    wire.extend_from_slice(&[0xc0, 0x0c]); // owner -> www.example.com
    wire.extend_from_slice(&[0, 5, 0, 1]); // CNAME IN
    wire.extend_from_slice(&[0, 0, 0, 30]);
    wire.extend_from_slice(&[0, 6]); // RDLENGTH
    wire.extend_from_slice(b"\x03cdn"); // cdn.
    wire.extend_from_slice(&[0xc0, 0x10]); // -> example.com

    let message = parse(&wire).unwrap();
    assert_eq!(message.questions[0].labels.to_string(), "www.example.com");
    assert_eq!(message.answers[0].labels.to_string(), "www.example.com");
    assert_eq!(
        message.answers[0].rdata_name().unwrap().to_string(),
        "cdn.example.com"
    );
    assert_eq!(
        message.answers[0].rdata_text().as_deref(),
        Some("cdn.example.com")
    );
}

#[test]
fn hostile_pointer_inputs_never_diverge() {
    // self-reference
    let mut self_ref = vec![0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    self_ref.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1]);
    assert!(parse(&self_ref).is_err());

    // forward reference
    let mut forward = vec![0, 2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    forward.extend_from_slice(&[0xc0, 0x30, 0, 1, 0, 1]);
    forward.extend_from_slice(&[0u8; 48]);
    assert!(parse(&forward).is_err());

    // label/pointer cycle
    let mut cycle = vec![0, 3, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    cycle.extend_from_slice(b"\x01x");
    cycle.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1]);
    assert!(parse(&cycle).is_err());

    // every prefix of a valid query, truncated at each length
    let query = Message::query(9, Labels::from_name("truncate.example.com"), rtype::A)
        .marshal()
        .unwrap();
    for len in 0..query.len() {
        // must return, never hang; most prefixes are errors
        let _ = parse(&query[..len]);
    }
}

#[test]
fn trailing_data_is_surfaced_not_fatal() {
    let mut wire = Message::query(5, Labels::from_name("tail.example"), rtype::A)
        .marshal()
        .unwrap();
    wire.extend_from_slice(&[1, 2, 3, 4, 5]);
    let (message, trailing) = parse_with_trailing(&wire).unwrap();
    assert_eq!(trailing, 5);
    assert_eq!(message.questions[0].labels.to_string(), "tail.example");
}

#[test]
fn padding_invariant_across_name_lengths() {
    for labels in [
        Labels::from_name("a.b"),
        Labels::from_name("example.org"),
        Labels::from_name("a-rather-long-subdomain.of.some.deeply.nested.example.zone"),
        Labels::from_vec(vec!["x".repeat(63), "example".into(), "com".into()]),
    ] {
        let mut query = Message::query(0xAB, labels, rtype::AAAA);
        let wire = pad_message(&mut query).unwrap();
        assert_eq!(wire.len() % PAD_BLOCK, 0);

        let parsed = parse(&wire).unwrap();
        let opt = parsed.additional_of_type(rtype::OPT).unwrap();
        let pad = opt.edns_option(opt_code::PADDING).unwrap();
        assert!(pad.iter().all(|&b| b == 0));
    }
}

#[test]
fn deny_list_matching_reference_vectors() {
    let vectors: &[(&[&str], &[&str], bool)] = &[
        (&["a", "b", "c"], &["*", "b", "c"], true),
        (&["b", "c"], &["*", "b", "c"], false),
        (&["b", "c"], &["**", "b", "c"], true),
        (&["w", "a", "b", "c", "d"], &["*", "b", "*"], true),
    ];
    for (name, pattern, expect) in vectors {
        let name = Labels::from(*name);
        let pattern = Labels::from(*pattern);
        assert_eq!(
            name.matches(&pattern),
            *expect,
            "{} vs {}",
            name,
            pattern
        );
    }
}

#[test]
fn question_equality_is_structural() {
    let q1 = Question {
        labels: Labels::from_name("eq.example"),
        qtype: rtype::A,
        qclass: class::IN,
    };
    let q2 = Question {
        labels: Labels::from_name("eq.example"),
        qtype: rtype::A,
        qclass: class::IN,
    };
    assert_eq!(q1, q2);
}
