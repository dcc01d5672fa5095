//! Bounded parsing of a TLS ClientHello's SNI extension.
//!
//! Only the first handshake record in the payload is inspected; nothing is
//! reassembled across TCP segments or TLS records. Field reads go through
//! `nom`, the same combinator crate the rest of this crate's wire formats
//! use.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;
const EXTENSION_SERVER_NAME: u16 = 0;

/// Returns the SNI hostname from the first ClientHello found in `buf`, or
/// `None` if the payload isn't a ClientHello, is truncated, or carries no
/// `server_name` extension.
pub fn parse_sni(buf: &[u8]) -> Option<String> {
    let (i, content_type) = be_u8::<_, nom::error::Error<&[u8]>>(buf).ok()?;
    if content_type != CONTENT_TYPE_HANDSHAKE {
        return None;
    }
    let (i, (version_major, version_minor)) = pair_u8(i).ok()?;
    // TLS 1.0-1.2 record layer versions are {3,1}..{3,3}; TLS 1.3 records
    // are sent as {3,3} for compatibility, so the same range covers it.
    if version_major != 3 || !(1..=3).contains(&version_minor) {
        return None;
    }
    let (_, record_length) = be_u16::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let record_length = record_length as usize;
    let record_end = (5 + record_length).min(buf.len());
    if record_end <= 5 {
        return None;
    }
    let record = &buf[5..record_end];

    let (i, handshake_type) = be_u8::<_, nom::error::Error<&[u8]>>(record).ok()?;
    if handshake_type != HANDSHAKE_TYPE_CLIENT_HELLO {
        return None;
    }
    let (i, _handshake_length) = be_u24::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let (i, _client_version) = take_n(i, 2).ok()?;
    let (i, _random) = take_n(i, 32).ok()?;

    let (i, session_id_len) = be_u8::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let (i, _session_id) = take_n(i, session_id_len as usize).ok()?;

    let (i, cipher_suites_len) = be_u16::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let (i, _cipher_suites) = take_n(i, cipher_suites_len as usize).ok()?;

    let (i, compression_len) = be_u8::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let (i, _compression_methods) = take_n(i, compression_len as usize).ok()?;

    let (i, extensions_len) = be_u16::<_, nom::error::Error<&[u8]>>(i).ok()?;
    let extensions_len = extensions_len as usize;
    let extensions_end = extensions_len.min(i.len());
    let extensions = &i[..extensions_end];

    parse_extensions(extensions)
}

fn pair_u8(i: &[u8]) -> IResult<&[u8], (u8, u8)> {
    let (i, a) = be_u8(i)?;
    let (i, b) = be_u8(i)?;
    Ok((i, (a, b)))
}

fn take_n(i: &[u8], n: usize) -> IResult<&[u8], &[u8]> {
    take(n)(i)
}

fn parse_extensions(mut extensions: &[u8]) -> Option<String> {
    loop {
        let (rest, ext_type) = be_u16::<_, nom::error::Error<&[u8]>>(extensions).ok()?;
        let (rest, ext_len) = be_u16::<_, nom::error::Error<&[u8]>>(rest).ok()?;
        let (rest, ext_body) = take_n(rest, ext_len as usize).ok()?;

        if ext_type == EXTENSION_SERVER_NAME {
            return parse_server_name_extension(ext_body);
        }
        extensions = rest;
        if extensions.is_empty() {
            return None;
        }
    }
}

fn parse_server_name_extension(ext: &[u8]) -> Option<String> {
    let (i, list_len) = be_u16::<_, nom::error::Error<&[u8]>>(ext).ok()?;
    let list_end = (list_len as usize).min(i.len());
    let mut list = &i[..list_end];

    while !list.is_empty() {
        let (rest, name_type) = be_u8::<_, nom::error::Error<&[u8]>>(list).ok()?;
        let (rest, name_len) = be_u16::<_, nom::error::Error<&[u8]>>(rest).ok()?;
        let (rest, name) = take_n(rest, name_len as usize).ok()?;

        if name_type == 0 {
            return Some(String::from_utf8_lossy(name).to_string());
        }
        list = rest;
    }
    None
}
