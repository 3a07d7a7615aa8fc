//! Helpers shared by every layer that reads or rewrites DNS messages.

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::svcb::SvcParamValue;
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use meta_dns_domain::host_value::unmap;
use std::net::IpAddr;

/// Builds the reply skeleton for `req`: same id, opcode, RD/CD flags and first question.
pub fn reply_to(req: &Message) -> Message {
    let mut msg = Message::new();
    set_reply(&mut msg, req);
    msg
}

/// Turns `msg` into a reply to `req`, keeping its records and response code.
pub fn set_reply(msg: &mut Message, req: &Message) {
    msg.set_id(req.id())
        .set_message_type(MessageType::Response)
        .set_op_code(req.op_code())
        .set_recursion_desired(req.recursion_desired())
        .set_checking_disabled(req.checking_disabled());
    msg.take_queries();
    if let Some(query) = req.queries().first() {
        msg.add_query(query.clone());
    }
}

/// NOERROR reply with no records, authoritative and recursion-available.
pub fn empty_answer_response(req: &Message) -> Message {
    let mut msg = reply_to(req);
    msg.set_response_code(ResponseCode::NoError)
        .set_authoritative(true)
        .set_recursion_available(true);
    msg
}

pub fn is_ip_request(query: &Query) -> bool {
    query.query_class() == DNSClass::IN
        && matches!(
            query.query_type(),
            RecordType::A | RecordType::AAAA | RecordType::CNAME
        )
}

/// Cache key of a question. Case and trailing-dot differences collapse to one key.
pub fn question_key(query: &Query) -> String {
    format!(
        "{}\t{}\t{}",
        query.name().to_lowercase().to_ascii(),
        query.query_class(),
        query.query_type()
    )
}

/// Lowercased question name without the trailing dot.
pub fn msg_to_domain(msg: &Message) -> String {
    msg.queries()
        .first()
        .map(query_domain)
        .unwrap_or_default()
}

pub fn query_domain(query: &Query) -> String {
    query
        .name()
        .to_lowercase()
        .to_ascii()
        .trim_end_matches('.')
        .to_string()
}

pub fn msg_to_qtype(msg: &Message) -> Option<RecordType> {
    msg.queries().first().map(Query::query_type)
}

/// Addresses of the A/AAAA answers, v4-mapped v6 addresses unmapped.
pub fn msg_to_ip(msg: &Message) -> Vec<IpAddr> {
    msg.answers().iter().filter_map(record_ip).collect()
}

pub fn record_ip(record: &Record) -> Option<IpAddr> {
    match record.data()? {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        RData::AAAA(aaaa) => Some(unmap(IpAddr::V6(aaaa.0))),
        _ => None,
    }
}

/// Short summary of the HTTPS records in the answer section, e.g. `alpn:h2,h3;ipv4hint`.
pub fn msg_to_https_rr_info(msg: &Message) -> String {
    let mut alpns: Vec<String> = Vec::new();
    let mut has_ipv4 = false;
    let mut has_ipv6 = false;

    for record in msg.answers() {
        let Some(RData::HTTPS(https)) = record.data() else {
            continue;
        };
        for (_, value) in https.0.svc_params() {
            match value {
                SvcParamValue::Alpn(alpn) if alpns.is_empty() => alpns.extend(alpn.0.iter().cloned()),
                SvcParamValue::Ipv4Hint(hint) if !hint.0.is_empty() => has_ipv4 = true,
                SvcParamValue::Ipv6Hint(hint) if !hint.0.is_empty() => has_ipv6 = true,
                _ => {}
            }
        }
    }

    let mut parts = Vec::new();
    if !alpns.is_empty() {
        parts.push(format!("alpn:{}", alpns.join(",")));
    }
    if has_ipv4 {
        parts.push("ipv4hint".to_string());
    }
    if has_ipv6 {
        parts.push("ipv6hint".to_string());
    }
    parts.join(";")
}

pub fn msg_to_log_string(msg: &Message) -> String {
    match msg_to_qtype(msg) {
        Some(RecordType::HTTPS) => format!("[{}] HTTPS", msg_to_https_rr_info(msg)),
        Some(qtype) => format!("{:?} {}", msg_to_ip(msg), qtype),
        None => format!("{:?}", msg_to_ip(msg)),
    }
}

pub fn rcode_to_string(rcode: ResponseCode) -> String {
    match rcode {
        ResponseCode::NoError => "NOERROR".to_string(),
        ResponseCode::FormErr => "FORMERR".to_string(),
        ResponseCode::ServFail => "SERVFAIL".to_string(),
        ResponseCode::NXDomain => "NXDOMAIN".to_string(),
        ResponseCode::NotImp => "NOTIMP".to_string(),
        ResponseCode::Refused => "REFUSED".to_string(),
        other => format!("RCODE{}", u16::from(other)),
    }
}

/// Smallest TTL across answer, authority and additional records. `0` when there are none.
pub fn minimal_ttl(msg: &Message) -> u32 {
    msg.answers()
        .iter()
        .chain(msg.name_servers())
        .chain(msg.additionals())
        .map(Record::ttl)
        .min()
        .unwrap_or(0)
}

/// Applies `f` to the answer, authority and additional sections in turn.
pub fn for_each_section_mut(msg: &mut Message, mut f: impl FnMut(&mut Vec<Record>)) {
    let mut answers = msg.take_answers();
    f(&mut answers);
    msg.insert_answers(answers);

    let mut name_servers = msg.take_name_servers();
    f(&mut name_servers);
    msg.insert_name_servers(name_servers);

    let mut additionals = msg.take_additionals();
    f(&mut additionals);
    msg.insert_additionals(additionals);
}

pub fn set_msg_ttl(msg: &mut Message, ttl: u32) {
    for_each_section_mut(msg, |records| {
        for record in records.iter_mut() {
            record.set_ttl(ttl);
        }
    });
}

/// Shifts the TTLs of one section so that its minimum becomes `ttl`, never below 1.
pub fn update_ttl(records: &mut [Record], ttl: u32) {
    let Some(min) = records.iter().map(Record::ttl).min() else {
        return;
    };
    let delta = min.saturating_sub(ttl);
    for record in records.iter_mut() {
        let current = record.ttl();
        record.set_ttl(current.saturating_sub(delta).clamp(1, current.max(1)));
    }
}

/// Rewrites every section so its minimal TTL equals `ttl`, keeping relative offsets.
pub fn update_msg_ttl(msg: &mut Message, ttl: u32) {
    for_each_section_mut(msg, |records| update_ttl(records, ttl));
}
