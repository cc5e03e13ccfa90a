/// Stream decoding and decompression utilities.
///
/// Decodes the general-purpose filters needed to look inside object streams,
/// cross-reference streams and metadata streams. Image codecs are recognised
/// by name so the validator can report them, but their data is never decoded.
use super::error::{PDFError, PDFResult};
use super::parser::{Dict, PDFObject};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;
use weezl::{BitOrder, LzwStatus, decode::Decoder as LzwDecoder};

/// Default ceiling on the decoded size of one stream (64 MiB).
pub const DEFAULT_MAX_DECODED_BYTES: usize = 64 * 1024 * 1024;

fn limit_error(filter: &str, limit: usize) -> PDFError {
    PDFError::DecodeLimit {
        filter: filter.to_string(),
        limit,
    }
}

/// Reads `reader` to the end, failing once more than `limit` bytes come out.
fn read_limited(reader: impl Read, limit: usize, out: &mut Vec<u8>) -> std::io::Result<bool> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader.take(cap).read_to_end(out)?;
    Ok(out.len() <= limit)
}

/// Standard filters, including their abbreviated inline-image names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Flate,
    Lzw,
    AsciiHex,
    Ascii85,
    RunLength,
    Dct,
    Jpx,
    Jbig2,
    CcittFax,
    Crypt,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "FlateDecode" | "Fl" => FilterKind::Flate,
            "LZWDecode" | "LZW" => FilterKind::Lzw,
            "ASCIIHexDecode" | "AHx" => FilterKind::AsciiHex,
            "ASCII85Decode" | "A85" => FilterKind::Ascii85,
            "RunLengthDecode" | "RL" => FilterKind::RunLength,
            "DCTDecode" | "DCT" => FilterKind::Dct,
            "JPXDecode" => FilterKind::Jpx,
            "JBIG2Decode" => FilterKind::Jbig2,
            "CCITTFaxDecode" | "CCF" => FilterKind::CcittFax,
            "Crypt" => FilterKind::Crypt,
            _ => return None,
        })
    }

    /// Full filter name, with abbreviations expanded.
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Flate => "FlateDecode",
            FilterKind::Lzw => "LZWDecode",
            FilterKind::AsciiHex => "ASCIIHexDecode",
            FilterKind::Ascii85 => "ASCII85Decode",
            FilterKind::RunLength => "RunLengthDecode",
            FilterKind::Dct => "DCTDecode",
            FilterKind::Jpx => "JPXDecode",
            FilterKind::Jbig2 => "JBIG2Decode",
            FilterKind::CcittFax => "CCITTFaxDecode",
            FilterKind::Crypt => "Crypt",
        }
    }
}

/// Decodes a FlateDecode (zlib/deflate) compressed stream.
///
/// Falls back to raw deflate when the zlib header is missing, which some
/// producers emit. Output longer than `limit` bytes is an error.
pub fn decode_flate(compressed_data: &[u8], limit: usize) -> PDFResult<Vec<u8>> {
    let mut decompressed = Vec::new();

    let within = match read_limited(ZlibDecoder::new(compressed_data), limit, &mut decompressed) {
        Ok(within) => within,
        Err(zlib_err) => {
            decompressed.clear();
            read_limited(DeflateDecoder::new(compressed_data), limit, &mut decompressed).map_err(
                |deflate_err| PDFError::Decode {
                    filter: "FlateDecode".to_string(),
                    message: format!(
                        "zlib failed ({}), raw deflate failed ({})",
                        zlib_err, deflate_err
                    ),
                },
            )?
        }
    };
    if !within {
        return Err(limit_error("FlateDecode", limit));
    }
    Ok(decompressed)
}

/// Decodes LZW data, MSB first with 8-bit initial code size.
///
/// `early_change` follows the /EarlyChange decode parameter (default 1).
/// Output longer than `limit` bytes is an error.
pub fn decode_lzw(data: &[u8], early_change: bool, limit: usize) -> PDFResult<Vec<u8>> {
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let mut buf = [0u8; 4096];
    let mut input = data;
    loop {
        let result = decoder.decode_bytes(input, &mut buf);
        input = &input[result.consumed_in..];
        output.extend_from_slice(&buf[..result.consumed_out]);
        if output.len() > limit {
            return Err(limit_error("LZWDecode", limit));
        }
        match result.status {
            Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => break,
            Ok(LzwStatus::Ok) if result.consumed_in == 0 && result.consumed_out == 0 => break,
            Ok(LzwStatus::Ok) => {}
            // Truncated data still yields what was decoded so far
            Err(e) if !output.is_empty() => {
                log::debug!("LZW stream ended early: {}", e);
                break;
            }
            Err(e) => {
                return Err(PDFError::Decode {
                    filter: "LZWDecode".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(output)
}

/// Decodes ASCIIHex-encoded data. Whitespace is ignored; '>' ends the data.
pub fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b'>' => break,
            b if b.is_ascii_whitespace() || b == 0 => continue,
            other => {
                return Err(PDFError::Decode {
                    filter: "ASCIIHexDecode".to_string(),
                    message: format!("invalid character 0x{:02x}", other),
                });
            }
        };
        match high.take() {
            Some(h) => result.push((h << 4) | digit),
            None => high = Some(digit),
        }
    }

    // Odd number of hex digits: implicit trailing 0
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

/// Decodes ASCII85 (Base85) encoded data.
pub fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut tuple = 0u64;
    let mut count = 0usize;

    let data = data.strip_prefix(b"<~").unwrap_or(data);
    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0u8; 4]),
            b if b.is_ascii_whitespace() || b == 0 => {}
            b'!'..=b'u' => {
                tuple = tuple * 85 + u64::from(byte - b'!');
                count += 1;
                if count == 5 {
                    if tuple > u64::from(u32::MAX) {
                        return Err(PDFError::Decode {
                            filter: "ASCII85Decode".to_string(),
                            message: "group value out of range".to_string(),
                        });
                    }
                    result.extend_from_slice(&(tuple as u32).to_be_bytes());
                    tuple = 0;
                    count = 0;
                }
            }
            other => {
                return Err(PDFError::Decode {
                    filter: "ASCII85Decode".to_string(),
                    message: format!("invalid character 0x{:02x}", other),
                });
            }
        }
    }

    // Partial final group: pad with 'u' and keep count - 1 bytes
    if count > 1 {
        for _ in count..5 {
            tuple = tuple * 85 + 84;
        }
        let bytes = (tuple.min(u64::from(u32::MAX)) as u32).to_be_bytes();
        result.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(result)
}

/// Decodes RunLength-encoded data.
pub fn decode_run_length(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let end = (i + count).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let Some(&value) = data.get(i) else { break };
                result.extend(std::iter::repeat(value).take(257 - length as usize));
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Reverses PNG row predictors (Predictor >= 10).
pub fn decode_png_predictor(
    data: &[u8],
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> PDFResult<Vec<u8>> {
    let bits_per_pixel = colors.checked_mul(bits_per_component).ok_or_else(predictor_overflow)?;
    let pix_bytes = bits_per_pixel.div_ceil(8).max(1);
    let row_bytes = columns
        .checked_mul(bits_per_pixel)
        .ok_or_else(predictor_overflow)?
        .div_ceil(8);
    // A short final row is tolerated and dropped
    if row_bytes >= data.len() {
        return Ok(Vec::new());
    }
    let stride = 1 + row_bytes;
    let num_rows = data.len() / stride;
    let mut output = Vec::with_capacity(num_rows * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut row = vec![0u8; row_bytes];

    for row_idx in 0..num_rows {
        let row_start = row_idx * stride;
        let predictor_byte = data[row_start];
        let raw = &data[row_start + 1..row_start + stride];

        for i in 0..row_bytes {
            let left = if i >= pix_bytes { row[i - pix_bytes] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= pix_bytes { prev_row[i - pix_bytes] } else { 0 };

            let predicted = match predictor_byte {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(PDFError::Decode {
                        filter: "Predictor".to_string(),
                        message: format!("unknown PNG predictor {}", other),
                    });
                }
            };
            row[i] = raw[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row);
        std::mem::swap(&mut prev_row, &mut row);
    }

    Ok(output)
}

fn predictor_overflow() -> PDFError {
    PDFError::Decode {
        filter: "Predictor".to_string(),
        message: "/Columns, /Colors and /BitsPerComponent overflow the row size".to_string(),
    }
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i32 + up as i32 - up_left as i32;
    let pa = (p - left as i32).abs();
    let pb = (p - up as i32).abs();
    let pc = (p - up_left as i32).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// Reverses the TIFF horizontal-differencing predictor (Predictor 2).
pub fn decode_tiff_predictor(
    data: &[u8],
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> PDFResult<Vec<u8>> {
    if bits_per_component != 8 {
        return Err(PDFError::Unsupported(format!(
            "TIFF predictor with {} bits per component",
            bits_per_component
        )));
    }
    let row_bytes = columns.checked_mul(colors).ok_or_else(predictor_overflow)?;
    let mut output = data.to_vec();
    if row_bytes == 0 {
        return Ok(output);
    }

    for row in output.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(output)
}

fn parm_int(parms: Option<&Dict>, key: &str, default: i64) -> i64 {
    parms
        .and_then(|p| p.get(key))
        .and_then(PDFObject::as_int)
        .unwrap_or(default)
}

/// Applies the /Predictor from a decode-parameter dictionary.
fn apply_predictor(data: Vec<u8>, parms: Option<&Dict>) -> PDFResult<Vec<u8>> {
    let predictor = parm_int(parms, "Predictor", 1);
    if predictor <= 1 {
        return Ok(data);
    }
    let colors = parm_int(parms, "Colors", 1).clamp(1, 32) as usize;
    let bpc = parm_int(parms, "BitsPerComponent", 8).clamp(1, 16) as usize;
    let columns = usize::try_from(parm_int(parms, "Columns", 1).max(1)).unwrap_or(usize::MAX);

    match predictor {
        2 => decode_tiff_predictor(&data, colors, bpc, columns),
        10..=15 => decode_png_predictor(&data, colors, bpc, columns),
        other => Err(PDFError::Decode {
            filter: "Predictor".to_string(),
            message: format!("unknown predictor {}", other),
        }),
    }
}

/// Applies a single filter to data, producing at most `limit` bytes.
pub fn apply_filter(
    data: &[u8],
    filter_name: &str,
    parms: Option<&Dict>,
    limit: usize,
) -> PDFResult<Vec<u8>> {
    let kind = FilterKind::from_name(filter_name)
        .ok_or_else(|| PDFError::Unsupported(format!("unknown filter /{}", filter_name)))?;

    let decoded = match kind {
        FilterKind::Flate => apply_predictor(decode_flate(data, limit)?, parms)?,
        FilterKind::Lzw => {
            let early_change = parm_int(parms, "EarlyChange", 1) != 0;
            apply_predictor(decode_lzw(data, early_change, limit)?, parms)?
        }
        FilterKind::AsciiHex => decode_ascii_hex(data)?,
        FilterKind::Ascii85 => decode_ascii85(data)?,
        FilterKind::RunLength => decode_run_length(data)?,
        _ => {
            return Err(PDFError::Unsupported(format!(
                "/{} data is not decoded",
                filter_name
            )));
        }
    };
    if decoded.len() > limit {
        return Err(limit_error(kind.name(), limit));
    }
    Ok(decoded)
}

/// Decode parameters aligned with each filter of a stream.
///
/// /DecodeParms may be a single dictionary or an array parallel to /Filter.
pub fn decode_parms(dict: &Dict, filter_count: usize) -> Vec<Option<&Dict>> {
    match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PDFObject::Dictionary(d)) => {
            let mut parms = vec![None; filter_count];
            if let Some(first) = parms.first_mut() {
                *first = Some(d);
            }
            parms
        }
        Some(PDFObject::Array(items)) => (0..filter_count)
            .map(|i| items.get(i).and_then(|item| item.as_dict()))
            .collect(),
        _ => vec![None; filter_count],
    }
}

/// Applies a stream's filter chain in order.
///
/// Filters are listed in the order they must be applied to decode: the first
/// entry of /Filter is undone first. Every intermediate result is held to
/// `limit` bytes.
pub fn decode_stream(
    data: &[u8],
    filters: &[String],
    dict: &Dict,
    limit: usize,
) -> PDFResult<Vec<u8>> {
    if filters.is_empty() {
        return Ok(data.to_vec());
    }
    let parms = decode_parms(dict, filters.len());

    let mut current = data.to_vec();
    for (filter_name, parm) in filters.iter().zip(parms) {
        log::trace!("applying /{} to {} bytes", filter_name, current.len());
        current = apply_filter(&current, filter_name, parm, limit)?;
    }
    Ok(current)
}
