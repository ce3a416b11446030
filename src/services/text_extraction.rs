//! Best-effort text salvage from PDF bytes.
//!
//! No object model: Flate-compressed streams are inflated where they can be,
//! then string literals, hex strings and printable runs are pooled. Content
//! stream operators are never interpreted.

use std::io::Read;

use flate2::read::ZlibDecoder;

const MAX_INFLATED_PER_STREAM: usize = 8 * 1024 * 1024;
const MAX_INFLATED_TOTAL: usize = 32 * 1024 * 1024;
const MAX_STRING_LEN: usize = 4096;
const DICTIONARY_LOOKBACK: usize = 2048;

pub struct TextExtractor;

impl TextExtractor {
    pub fn extract_from_pdf(bytes: &[u8]) -> String {
        let segments = inflate_streams(bytes);
        tracing::debug!(inflated_streams = segments.len(), "PDF streams inflated");

        let mut combined = Vec::with_capacity(bytes.len() + segments.iter().map(Vec::len).sum::<usize>());
        combined.extend_from_slice(bytes);
        for segment in &segments {
            combined.push(b'\n');
            combined.extend_from_slice(segment);
        }

        let pools = [
            literal_strings(&combined).join("\n"),
            hex_strings(&combined).join("\n"),
            printable_fallback(&combined),
        ];
        collapse_blank_lines(&pools.join("\n\n"))
    }

    pub fn validate_text_quality(text: &str) -> bool {
        text.len() > 50 && text.split_whitespace().count() > 10
    }
}

/// Single byte per char, so offsets in the text match offsets in the buffer.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Header bytes between the owning `obj` keyword (or a bounded lookback) and `stream`.
fn dictionary_before(bytes: &[u8], stream_pos: usize) -> &[u8] {
    let floor = stream_pos.saturating_sub(DICTIONARY_LOOKBACK);
    let window = &bytes[floor..stream_pos];
    match rfind(window, b"obj") {
        Some(p) => &window[p..],
        None => window,
    }
}

pub fn inflate_streams(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut segments = Vec::new();
    let mut budget = MAX_INFLATED_TOTAL;
    let mut cursor = 0;

    while let Some(pos) = find(bytes, b"stream", cursor) {
        cursor = pos + b"stream".len();
        if pos >= 3 && &bytes[pos - 3..pos] == b"end" {
            continue;
        }

        let mut start = cursor;
        if bytes.get(start) == Some(&b'\r') {
            start += 1;
        }
        if bytes.get(start) == Some(&b'\n') {
            start += 1;
        }
        let Some(end) = find(bytes, b"endstream", start) else {
            break;
        };
        cursor = end + b"endstream".len();

        if find(dictionary_before(bytes, pos), b"FlateDecode", 0).is_none() {
            continue;
        }

        let mut data = &bytes[start..end];
        while let Some((&last, rest)) = data.split_last() {
            if last == b'\r' || last == b'\n' {
                data = rest;
            } else {
                break;
            }
        }

        match inflate(data, budget.min(MAX_INFLATED_PER_STREAM)) {
            Ok(out) if !out.is_empty() => {
                budget = budget.saturating_sub(out.len());
                segments.push(out);
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(offset = pos, "Skipping stream that failed to inflate: {}", err),
        }
        if budget == 0 {
            tracing::warn!("Inflate budget exhausted, ignoring remaining streams");
            break;
        }
    }

    segments
}

fn inflate(data: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64)
        .read_to_end(&mut out)?;
    Ok(out)
}

fn looks_like_text(decoded: &[u8]) -> bool {
    if decoded.is_empty() || !decoded.iter().any(|b| b.is_ascii_alphanumeric()) {
        return false;
    }
    let printable = decoded
        .iter()
        .filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        .count();
    printable * 10 >= decoded.len() * 8
}

fn printable_only(decoded: &[u8]) -> String {
    let kept: Vec<u8> = decoded
        .iter()
        .map(|&b| if b == b'\t' || b == b'\r' { b' ' } else { b })
        .filter(|b| b.is_ascii_graphic() || *b == b' ' || *b == b'\n')
        .collect();
    latin1(&kept).trim().to_string()
}

/// Parenthesized string literals with escapes decoded.
pub fn literal_strings(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'(' {
            i += 1;
            continue;
        }
        match read_literal(bytes, i + 1) {
            Some((decoded, next)) => {
                if looks_like_text(&decoded) {
                    let text = printable_only(&decoded);
                    if !text.is_empty() {
                        out.push(text);
                    }
                }
                i = next;
            }
            None => i += 1,
        }
    }
    out
}

/// Returns the decoded literal and the index after its closing paren.
fn read_literal(bytes: &[u8], start: usize) -> Option<(Vec<u8>, usize)> {
    let mut decoded = Vec::new();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        if i - start > MAX_STRING_LEN {
            return None;
        }
        let b = bytes[i];
        match b {
            b'\\' => {
                i += 1;
                let Some(&esc) = bytes.get(i) else {
                    return None;
                };
                match esc {
                    b'n' => decoded.push(b'\n'),
                    b'r' => decoded.push(b'\r'),
                    b't' => decoded.push(b'\t'),
                    b'b' => decoded.push(0x08),
                    b'f' => decoded.push(0x0c),
                    b'0'..=b'7' => {
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        while digits < 3 {
                            match bytes.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    digits += 1;
                                    i += 1;
                                }
                                _ => break,
                            }
                        }
                        decoded.push((value & 0xff) as u8);
                        continue;
                    }
                    b'\r' => {
                        if bytes.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => {}
                    other => decoded.push(other),
                }
            }
            b'(' => {
                depth += 1;
                decoded.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((decoded, i + 1));
                }
                decoded.push(b);
            }
            _ => decoded.push(b),
        }
        i += 1;
    }
    None
}

/// `<48656C6C6F>` style strings; dictionary delimiters `<<` are skipped.
pub fn hex_strings(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'<') {
            i += 2;
            continue;
        }

        let mut digits = Vec::new();
        let mut j = i + 1;
        let mut closed = false;
        while j < bytes.len() && j - i <= MAX_STRING_LEN {
            match bytes[j] {
                b'>' => {
                    closed = true;
                    break;
                }
                d if d.is_ascii_hexdigit() => digits.push(d),
                w if w.is_ascii_whitespace() => {}
                _ => break,
            }
            j += 1;
        }

        if closed && digits.len() >= 2 {
            let decoded = decode_hex_digits(&digits);
            if looks_like_text(&decoded) {
                let text = printable_only(&decoded);
                if !text.is_empty() {
                    out.push(text);
                }
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    out
}

fn decode_hex_digits(digits: &[u8]) -> Vec<u8> {
    let nibble = |d: u8| match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        _ => d - b'A' + 10,
    };
    digits
        .chunks(2)
        .map(|pair| {
            let hi = nibble(pair[0]);
            let lo = pair.get(1).map(|&d| nibble(d)).unwrap_or(0);
            (hi << 4) | lo
        })
        .collect()
}

/// The whole buffer with every non-printable byte turned into a line break.
pub fn printable_fallback(bytes: &[u8]) -> String {
    let mapped: String = bytes
        .iter()
        .map(|&b| match b {
            b'\t' => ' ',
            0x20..=0x7e => b as char,
            _ => '\n',
        })
        .collect();

    mapped
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().any(|c| c.is_ascii_alphanumeric()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_blank = false;
    for line in text.lines() {
        let line = line.trim_end();
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push_str(line);
        out.push('\n');
        previous_blank = blank;
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn pdf_with_stream(filter: &str, payload: &[u8]) -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n1 0 obj\n<< /Length 10 ".to_vec();
        pdf.extend_from_slice(filter.as_bytes());
        pdf.extend_from_slice(b" >>\nstream\r\n");
        pdf.extend_from_slice(payload);
        pdf.extend_from_slice(b"\r\nendstream\nendobj\n%%EOF\n");
        pdf
    }

    fn pdf_with_streams(payloads: &[&[u8]]) -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        for (idx, payload) in payloads.iter().enumerate() {
            pdf.extend_from_slice(format!("{} 0 obj\n<< /Filter /FlateDecode >>\nstream\r\n", idx + 1).as_bytes());
            pdf.extend_from_slice(payload);
            pdf.extend_from_slice(b"\r\nendstream\nendobj\n");
        }
        pdf.extend_from_slice(b"%%EOF\n");
        pdf
    }

    #[test]
    fn single_stream_output_is_capped() {
        let compressed = deflate(&vec![b'a'; 9 * 1024 * 1024]);
        let segments = inflate_streams(&pdf_with_streams(&[&compressed]));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), MAX_INFLATED_PER_STREAM);
    }

    #[test]
    fn document_output_is_capped() {
        let compressed = deflate(&vec![b'a'; 9 * 1024 * 1024]);
        let payloads: Vec<&[u8]> = (0..6).map(|_| compressed.as_slice()).collect();
        let segments = inflate_streams(&pdf_with_streams(&payloads));

        let total: usize = segments.iter().map(Vec::len).sum();
        assert_eq!(total, MAX_INFLATED_TOTAL);
        // The budget runs out after four capped streams; the rest are never read.
        assert_eq!(segments.len(), MAX_INFLATED_TOTAL / MAX_INFLATED_PER_STREAM);
    }

    #[test]
    fn inflates_flate_streams() {
        let content = b"BT /F1 12 Tf (Invoice Number: INV-77) Tj ET";
        let pdf = pdf_with_stream("/Filter /FlateDecode", &deflate(content));
        let segments = inflate_streams(&pdf);
        assert_eq!(segments, vec![content.to_vec()]);

        let text = TextExtractor::extract_from_pdf(&pdf);
        assert!(text.contains("Invoice Number: INV-77"));
    }

    #[test]
    fn ignores_unfiltered_and_corrupt_streams() {
        let plain = pdf_with_stream("", b"(Hello) Tj");
        assert!(inflate_streams(&plain).is_empty());

        let corrupt = pdf_with_stream("/Filter /FlateDecode", b"definitely not zlib");
        assert!(inflate_streams(&corrupt).is_empty());
        let text = TextExtractor::extract_from_pdf(&corrupt);
        assert!(text.contains("definitely not zlib"));
    }

    #[test]
    fn decodes_literal_escapes() {
        let strings = literal_strings(br"(Amount \(USD\)) Tj (Line\nTwo) (caf\351 au lait) (\101\102C)");
        assert_eq!(strings[0], "Amount (USD)");
        assert_eq!(strings[1], "Line\nTwo");
        assert_eq!(strings[2], "caf au lait");
        assert_eq!(strings[3], "ABC");
    }

    #[test]
    fn decodes_hex_strings_but_not_dictionaries() {
        let strings = hex_strings(b"<< /Type /Page >> <48656C6C6F> <4142 43>");
        assert_eq!(strings, vec!["Hello".to_string(), "ABC".to_string()]);
    }

    #[test]
    fn odd_hex_digit_is_padded() {
        assert_eq!(decode_hex_digits(b"414"), vec![0x41, 0x40]);
    }

    #[test]
    fn fallback_keeps_printable_runs() {
        let text = printable_fallback(b"Total Due\x00\x01$1,200.00\n\xff\xfe");
        assert_eq!(text, "Total Due\n$1,200.00");
    }

    #[test]
    fn blank_line_runs_collapse() {
        assert_eq!(collapse_blank_lines("\n\na\n\n\n\nb  \n\n"), "a\n\nb");
    }

    #[test]
    fn unterminated_literal_does_not_swallow_document() {
        let mut bytes = b"(".to_vec();
        bytes.extend(std::iter::repeat(b'x').take(MAX_STRING_LEN + 10));
        bytes.extend_from_slice(b" (Real Text)");
        let strings = literal_strings(&bytes);
        assert!(strings.iter().any(|s| s == "Real Text"));
    }
}
