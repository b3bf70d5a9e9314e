//! `multipart/form-data` bodies (RFC 7578).
//!
//! Encoding is done by ureq's `multipart::Form`, read to the end into a
//! buffer so the result can sit in a plain-data `HttpRequest`. Every payload
//! gets a fresh random boundary.

use std::borrow::Cow;
use std::io::{self, Read};

use ureq::unversioned::multipart::{Form, Part};

const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// A file part: form field name, file name sent to the server, and the
/// byte source for its content.
pub struct MultipartFile<R> {
    pub field_name: String,
    pub file_name: String,
    pub reader: R,
}

impl<R: Read> MultipartFile<R> {
    pub fn new(field_name: impl Into<String>, file_name: impl Into<String>, reader: R) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            reader,
        }
    }
}

/// An encoded body and the `Content-Type` that names its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Encode `fields` in order, followed by `file` as the last part.
///
/// Any error returned by the file's reader aborts the encoding.
pub fn encode<I, K, V, R>(fields: I, file: &mut MultipartFile<R>) -> io::Result<MultipartBody>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
    R: Read,
{
    let fields: Vec<(String, V)> = fields
        .into_iter()
        .map(|(name, value)| (disposition_param(name.as_ref()).into_owned(), value))
        .collect();
    let field_name = disposition_param(&file.field_name).into_owned();
    let file_name = disposition_param(&file.file_name).into_owned();

    let mut form = Form::new();
    for (name, value) in &fields {
        form = form.text(name, value.as_ref());
    }
    let part = Part::reader(&mut file.reader)
        .file_name(&file_name)
        .mime_str(FILE_CONTENT_TYPE)
        .map_err(io::Error::other)?;
    form = form.part(&field_name, part);

    let content_type = format!("multipart/form-data; boundary={}", form.boundary());
    let mut body = Vec::new();
    form.read_to_end(&mut body)?;
    Ok(MultipartBody { content_type, body })
}

/// Percent-encode the characters that would end a quoted
/// `Content-Disposition` parameter, the way browsers do.
fn disposition_param(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace('"', "%22")
            .replace('\r', "%0D")
            .replace('\n', "%0A"),
    )
}
