//! Bounded, defensive DNS message parsing.
//!
//! Only enough of RFC 1035 to answer "what name was asked about, and what
//! came back" — no zone transfer, no EDNS options, no authority/additional
//! sections. Fixed-width fields are read with `nom`, the same combinator
//! crate the rest of this crate's wire formats are built on.

use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;

const MAX_POINTER_HOPS: u8 = 10;
const HEADER_LEN: usize = 12;

fn read_bytes(i: &[u8], n: usize) -> IResult<&[u8], &[u8]> {
    take(n)(i)
}

fn read_ipv6_segments(i: &[u8]) -> IResult<&[u8], [u16; 8]> {
    let (rest, segments) = count(be_u16, 8)(i)?;
    Ok((rest, segments.try_into().expect("count(_, 8) always yields 8 elements")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Ptr,
    Soa,
    Txt,
    Srv,
    Other(u16),
}

impl RecordType {
    fn from_u16(v: u16) -> Self {
        match v {
            1 => RecordType::A,
            28 => RecordType::Aaaa,
            5 => RecordType::Cname,
            15 => RecordType::Mx,
            2 => RecordType::Ns,
            12 => RecordType::Ptr,
            6 => RecordType::Soa,
            16 => RecordType::Txt,
            33 => RecordType::Srv,
            other => RecordType::Other(other),
        }
    }

    pub fn as_tag(&self) -> String {
        match self {
            RecordType::A => "A".to_string(),
            RecordType::Aaaa => "AAAA".to_string(),
            RecordType::Cname => "CNAME".to_string(),
            RecordType::Mx => "MX".to_string(),
            RecordType::Ns => "NS".to_string(),
            RecordType::Ptr => "PTR".to_string(),
            RecordType::Soa => "SOA".to_string(),
            RecordType::Txt => "TXT".to_string(),
            RecordType::Srv => "SRV".to_string(),
            RecordType::Other(n) => format!("TYPE_{n}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Question {
    pub name: String,
    pub record_type: RecordType,
}

#[derive(Debug, Clone)]
pub enum AnswerData {
    Address(String),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub name: String,
    pub record_type: RecordType,
    pub data: AnswerData,
}

#[derive(Debug, Clone, Default)]
pub struct DnsMessage {
    pub is_response: bool,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl DnsMessage {
    pub fn addresses(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|a| match &a.data {
                AnswerData::Address(addr) => Some(addr.clone()),
                AnswerData::Name(_) => None,
            })
            .collect()
    }

    pub fn cnames(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|a| match &a.data {
                AnswerData::Name(n) => Some(n.clone()),
                AnswerData::Address(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsParseError {
    TooShort,
    NameTooDeep,
    NameOverrun,
    BadPointer,
}

impl std::fmt::Display for DnsParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsParseError::TooShort => write!(f, "payload shorter than a DNS header"),
            DnsParseError::NameTooDeep => write!(f, "name decompression exceeded pointer depth cap"),
            DnsParseError::NameOverrun => write!(f, "name decompression read past payload bounds"),
            DnsParseError::BadPointer => write!(f, "compression pointer out of range"),
        }
    }
}

/// Header fields this parser cares about: flags, question count, answer count.
fn parse_header(buf: &[u8]) -> IResult<&[u8], (u16, u16, u16)> {
    let (i, _id) = be_u16(buf)?;
    let (i, flags) = be_u16(i)?;
    let (i, qdcount) = be_u16(i)?;
    let (i, ancount) = be_u16(i)?;
    let (i, _nscount) = be_u16(i)?;
    let (i, _arcount) = be_u16(i)?;
    Ok((i, (flags, qdcount, ancount)))
}

/// Reads a (possibly compressed) name starting at `offset` in the full
/// message buffer. Returns the dotted name and the offset just past the
/// name's own bytes in the section it was read from (pointers do not
/// advance that cursor). A compression pointer jumps to an arbitrary
/// absolute offset, so the hop-count/loop bookkeeping around it stays a
/// manual loop; each individual field read within it goes through `nom`.
fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), DnsParseError> {
    let mut offset = start;
    let mut labels: Vec<String> = Vec::new();
    let mut hops = 0u8;
    let mut end_offset: Option<usize> = None;
    let mut visited_pointers = std::collections::HashSet::new();

    loop {
        let window = buf.get(offset..).ok_or(DnsParseError::NameOverrun)?;
        let (after_len, len) = be_u8::<_, nom::error::Error<&[u8]>>(window).map_err(|_| DnsParseError::NameOverrun)?;

        if len == 0 {
            if end_offset.is_none() {
                end_offset = Some(offset + 1);
            }
            break;
        }

        if len & 0xc0 == 0xc0 {
            let (_, pointer) =
                be_u16::<_, nom::error::Error<&[u8]>>(window).map_err(|_| DnsParseError::NameOverrun)?;
            let pointer = (pointer & 0x3fff) as usize;
            if end_offset.is_none() {
                end_offset = Some(offset + 2);
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DnsParseError::NameTooDeep);
            }
            if pointer >= buf.len() || !visited_pointers.insert(pointer) {
                return Err(DnsParseError::BadPointer);
            }
            offset = pointer;
            continue;
        }

        let (_, label) = read_bytes(after_len, len as usize).map_err(|_: nom::Err<nom::error::Error<&[u8]>>| DnsParseError::NameOverrun)?;
        labels.push(String::from_utf8_lossy(label).to_string());
        offset += 1 + len as usize;
    }

    Ok((labels.join("."), end_offset.unwrap_or(offset)))
}

fn parse_questions(buf: &[u8], mut offset: usize, qdcount: u16) -> (Vec<Question>, usize) {
    let mut questions = Vec::with_capacity((qdcount as usize).min(64));
    for _ in 0..qdcount {
        let Ok((name, next)) = read_name(buf, offset) else { break };
        let Some(window) = buf.get(next..) else { break };
        let parsed: IResult<&[u8], (u16, u16)> = (|i| {
            let (i, qtype) = be_u16(i)?;
            let (i, qclass) = be_u16(i)?;
            Ok((i, (qtype, qclass)))
        })(window);
        let Ok((rest, (qtype, _qclass))) = parsed else { break };
        offset = next + (window.len() - rest.len());
        questions.push(Question {
            name,
            record_type: RecordType::from_u16(qtype),
        });
    }
    (questions, offset)
}

/// Reads one answer's fixed header fields (type, class, ttl, rdlength) plus
/// its rdata, starting just past the answer's name.
fn parse_answer_header(window: &[u8]) -> IResult<&[u8], (u16, &[u8])> {
    let (i, rtype) = be_u16(window)?;
    let (i, _class) = be_u16(i)?;
    let (i, _ttl) = be_u32(i)?;
    let (i, rdlength) = be_u16(i)?;
    let (i, rdata) = read_bytes(i, rdlength as usize)?;
    Ok((i, (rtype, rdata)))
}

fn parse_rdata(buf: &[u8], record_type: &RecordType, rdata_start: usize, rdata: &[u8]) -> Option<AnswerData> {
    match record_type {
        RecordType::A if rdata.len() == 4 => Some(AnswerData::Address(format!(
            "{}.{}.{}.{}",
            rdata[0], rdata[1], rdata[2], rdata[3]
        ))),
        RecordType::Aaaa if rdata.len() == 16 => {
            let (_, segments) = read_ipv6_segments(rdata).ok()?;
            Some(AnswerData::Address(std::net::Ipv6Addr::from(segments).to_string()))
        }
        RecordType::Cname => read_name(buf, rdata_start).ok().map(|(n, _)| AnswerData::Name(n)),
        _ => None,
    }
}

fn parse_answers(buf: &[u8], mut offset: usize, ancount: u16) -> Vec<Answer> {
    let mut answers = Vec::with_capacity((ancount as usize).min(64));
    for _ in 0..ancount {
        let Ok((name, next)) = read_name(buf, offset) else { break };
        let Some(window) = buf.get(next..) else { break };
        let Ok((rest, (rtype, rdata))) = parse_answer_header(window) else { break };
        let rdata_start = next + (window.len() - rest.len() - rdata.len());
        offset = next + (window.len() - rest.len());

        let record_type = RecordType::from_u16(rtype);
        if let Some(data) = parse_rdata(buf, &record_type, rdata_start, rdata) {
            answers.push(Answer {
                name,
                record_type,
                data,
            });
        }
    }
    answers
}

pub fn parse(buf: &[u8]) -> Result<DnsMessage, DnsParseError> {
    if buf.len() < HEADER_LEN {
        return Err(DnsParseError::TooShort);
    }
    let (_, (flags, qdcount, ancount)) = parse_header(buf).map_err(|_| DnsParseError::TooShort)?;
    let is_response = flags & 0x8000 != 0;

    let (questions, offset) = parse_questions(buf, HEADER_LEN, qdcount);
    let answers = parse_answers(buf, offset, ancount);

    Ok(DnsMessage {
        is_response,
        questions,
        answers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_packet() -> Vec<u8> {
        let mut buf = vec![0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        buf.extend(b"\x07example\x03com\x00");
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        buf
    }

    #[test]
    fn parses_simple_query() {
        let msg = parse(&query_packet()).unwrap();
        assert!(!msg.is_response);
        assert_eq!(msg.questions.len(), 1);
        assert_eq!(msg.questions[0].name, "example.com");
        assert_eq!(msg.questions[0].record_type, RecordType::A);
    }

    #[test]
    fn parses_response_with_a_answer() {
        let mut buf = vec![0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        buf.extend(b"\x07example\x03com\x00");
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        // answer: pointer to name at offset 12, type A, class IN, ttl, rdlength 4, addr
        buf.extend([0xc0, 0x0c]);
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        buf.extend([0x00, 0x00, 0x00, 0x3c]);
        buf.extend([0x00, 0x04]);
        buf.extend([93, 184, 216, 34]);
        let msg = parse(&buf).unwrap();
        assert!(msg.is_response);
        assert_eq!(msg.addresses(), vec!["93.184.216.34".to_string()]);
    }

    #[test]
    fn rejects_self_referencing_pointer_loop() {
        // byte 12 is a pointer to itself
        let mut buf = vec![0x00; 14];
        buf[4] = 0x00;
        buf[5] = 0x01;
        buf[12] = 0xc0;
        buf[13] = 0x0c;
        let err = parse(&buf).unwrap_err();
        assert_eq!(err, DnsParseError::BadPointer);
    }

    #[test]
    fn tolerates_unparseable_answer_by_truncating() {
        let mut buf = vec![0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
        buf.extend(b"\x07example\x03com\x00");
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        buf.extend([0xc0, 0x0c]);
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        buf.extend([0x00, 0x00, 0x00, 0x3c]);
        buf.extend([0x00, 0x04]);
        buf.extend([93, 184, 216, 34]);
        // second answer claims a huge rdlength that overruns the buffer
        buf.extend([0xc0, 0x0c]);
        buf.extend([0x00, 0x01, 0x00, 0x01]);
        buf.extend([0x00, 0x00, 0x00, 0x3c]);
        buf.extend([0xff, 0xff]);
        let msg = parse(&buf).unwrap();
        assert_eq!(msg.addresses().len(), 1);
    }
}
