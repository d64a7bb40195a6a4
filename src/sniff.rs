//! Content-type detection from leading bytes

/// At most this many bytes are inspected
const SNIFF_LEN: usize = 512;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// (magic prefix, content type)
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"Rar!\x1a\x07", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"\x1aE\xdf\xa3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
];

/// Markup prefixes matched case-insensitively after leading whitespace
const MARKUP: &[(&str, &str)] = &[
    ("<!doctype html", "text/html; charset=utf-8"),
    ("<html", "text/html; charset=utf-8"),
    ("<head", "text/html; charset=utf-8"),
    ("<body", "text/html; charset=utf-8"),
    ("<?xml", "text/xml; charset=utf-8"),
];

/// Guess the content type of `data`.
///
/// Never fails: unrecognised binary data is `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if data.is_empty() {
        return TEXT_PLAIN;
    }

    if data.len() >= 12 && &data[..4] == b"RIFF" {
        match &data[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            b"AVI " => return "video/avi",
            _ => {}
        }
    }

    if let Some((_, content_type)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return *content_type;
    }

    let trimmed = trim_leading_whitespace(data);
    for (prefix, content_type) in MARKUP {
        if trimmed.len() >= prefix.len()
            && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        {
            return *content_type;
        }
    }

    if looks_like_text(data) {
        if matches!(trimmed.first(), Some(b'{') | Some(b'['))
            && matches!(
                trim_trailing_whitespace(trimmed).last(),
                Some(b'}') | Some(b']')
            )
        {
            return "application/json";
        }
        return TEXT_PLAIN;
    }

    OCTET_STREAM
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &data[..end]
}

/// UTF-8 without control bytes other than whitespace. A multi-byte sequence
/// cut off by the sniff window still counts as text.
fn looks_like_text(data: &[u8]) -> bool {
    let valid = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&data[..e.valid_up_to()]) {
            Ok(s) => s,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    !valid
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c'))
}
