// Seed file extraction from a `/generate` request body.
//
// Browser clients send the seed as `multipart/form-data` with the MIDI file
// in a part named `file`. Scripts may instead POST the file itself as the
// body. Both are accepted:
//
// - `multipart/form-data; boundary=...`: the body is split on the boundary
//   and the `file` part's content is returned. A missing `file` part (or one
//   without a filename, which makes it a plain form field) is `NoFilePart`;
//   an empty filename is `NoSelectedFile`, which is what a browser sends
//   when nothing was chosen.
// - anything else: the body is the file. An empty body is `NoFilePart`.
//
// The body has already been read into memory under the upload limit, so
// parts borrow from it rather than streaming.

use crate::error::{Result, ServerError};

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
struct FormPart<'a> {
    name: Option<String>,
    filename: Option<String>,
    data: &'a [u8],
}

/// Return the bytes of the uploaded seed file.
pub fn seed_file<'a>(content_type: Option<&str>, body: &'a [u8]) -> Result<&'a [u8]> {
    let Some(boundary) = content_type.and_then(form_boundary) else {
        if body.is_empty() {
            return Err(ServerError::NoFilePart);
        }
        return Ok(body);
    };

    let parts = parse_form(body, &boundary)?;
    let part = parts
        .into_iter()
        .find(|p| p.name.as_deref() == Some("file") && p.filename.is_some())
        .ok_or(ServerError::NoFilePart)?;
    if part.filename.as_deref() == Some("") {
        return Err(ServerError::NoSelectedFile);
    }
    Ok(part.data)
}

/// The boundary of a `multipart/form-data` content type, or `None` for any
/// other type.
fn form_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';').map(str::trim);
    let mime = params.next()?;
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| unquote(v.trim()).to_string())
        .filter(|b| !b.is_empty())
}

fn parse_form<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<FormPart<'a>>> {
    let malformed = || ServerError::BadRequest("malformed multipart body".into());
    let delimiter = format!("--{boundary}").into_bytes();
    let separator = [b"\r\n".as_slice(), &delimiter].concat();

    let mut parts = Vec::new();
    let mut pos = find(body, &delimiter, 0).ok_or_else(malformed)? + delimiter.len();
    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(malformed());
        }
        pos += 2;

        let header_end = find(body, b"\r\n\r\n", pos).ok_or_else(malformed)?;
        let headers = String::from_utf8_lossy(&body[pos..header_end]);
        let content_start = header_end + 4;
        let content_end = find(body, &separator, content_start).ok_or_else(malformed)?;

        let (name, filename) = content_disposition(&headers);
        parts.push(FormPart {
            name,
            filename,
            data: &body[content_start..content_end],
        });
        pos = content_end + separator.len();
    }
    Ok(parts)
}

/// `name` and `filename` from a part's Content-Disposition header.
fn content_disposition(headers: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut filename = None;
    for line in headers.split("\r\n") {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        if !field.trim().eq_ignore_ascii_case("content-disposition") {
            continue;
        }
        for param in value.split(';').skip(1) {
            let Some((key, val)) = param.split_once('=') else {
                continue;
            };
            let val = unquote(val.trim()).to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(val),
                "filename" => filename = Some(val),
                _ => {}
            }
        }
    }
    (name, filename)
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=----cadenza42";

    fn form(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(b"------cadenza42\r\n");
            let disposition = match filename {
                Some(f) => format!("form-data; name=\"{name}\"; filename=\"{f}\""),
                None => format!("form-data; name=\"{name}\""),
            };
            body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"------cadenza42--\r\n");
        body
    }

    #[test]
    fn raw_body_is_the_file() {
        assert_eq!(seed_file(None, b"MThd").unwrap(), b"MThd");
        assert_eq!(seed_file(Some("audio/midi"), b"MThd").unwrap(), b"MThd");
        assert!(matches!(
            seed_file(Some("audio/midi"), b""),
            Err(ServerError::NoFilePart)
        ));
    }

    #[test]
    fn file_part_is_extracted() {
        let data: &[u8] = b"MThd\r\n--not-the-boundary\x00\xff";
        let body = form(&[("comment", None, &b"hi"[..]), ("file", Some("seed.mid"), data)]);
        assert_eq!(seed_file(Some(CT), &body).unwrap(), data);
    }

    #[test]
    fn missing_file_part() {
        let body = form(&[("other", Some("seed.mid"), &b"MThd"[..])]);
        assert!(matches!(
            seed_file(Some(CT), &body),
            Err(ServerError::NoFilePart)
        ));
        // A `file` field without a filename is a plain form value.
        let body = form(&[("file", None, &b"MThd"[..])]);
        assert!(matches!(
            seed_file(Some(CT), &body),
            Err(ServerError::NoFilePart)
        ));
    }

    #[test]
    fn empty_filename_means_nothing_selected() {
        let body = form(&[("file", Some(""), &b""[..])]);
        assert!(matches!(
            seed_file(Some(CT), &body),
            Err(ServerError::NoSelectedFile)
        ));
    }

    #[test]
    fn boundary_parameter_variants() {
        assert_eq!(
            form_boundary("Multipart/Form-Data; charset=utf-8; boundary=\"abc\""),
            Some("abc".to_string())
        );
        assert_eq!(form_boundary("multipart/form-data"), None);
        assert_eq!(form_boundary("application/json; boundary=abc"), None);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let body = b"------cadenza42\r\nContent-Disposition: form-data; name=\"file\"";
        assert!(matches!(
            seed_file(Some(CT), body),
            Err(ServerError::BadRequest(_))
        ));
    }
}
