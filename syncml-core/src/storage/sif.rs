// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SIF note payloads
//!
//! A `<note>` root holding `SIFVersion`, `Subject` and `Body`. Elements are
//! matched by local name, so a namespaced root is accepted. Other children
//! are ignored.

use std::io::Cursor;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::store::{StoreError, StoreResult};

const SIF_VERSION: &str = "1.1";

impl From<quick_xml::Error> for StoreError {
    fn from(err: quick_xml::Error) -> Self {
        StoreError::Codec(format!("SIF note: {}", err))
    }
}

/// Serialize a note to SIF XML
pub fn dump(name: &str, body: &str) -> StoreResult<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("note")))?;
    write_simple_element(&mut writer, "SIFVersion", SIF_VERSION)?;
    write_simple_element(&mut writer, "Subject", name)?;
    write_simple_element(&mut writer, "Body", body)?;
    writer.write_event(Event::End(BytesEnd::new("note")))?;

    Ok(writer.into_inner().into_inner())
}

fn write_simple_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> StoreResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Subject,
    Body,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Subject" => Some(Field::Subject),
            b"Body" => Some(Field::Body),
            _ => None,
        }
    }
}

/// Parses a SIF note into its subject, if not empty, and body.
pub fn load(text: &str) -> StoreResult<(Option<String>, String)> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut field: Option<Field> = None;
    let mut buf = String::new();
    let mut subject: Option<String> = None;
    let mut body: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => root_seen = check_root(e.local_name().as_ref())?,
                    2 => {
                        field = Field::from_local_name(e.local_name().as_ref());
                        buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match depth {
                0 => root_seen = check_root(e.local_name().as_ref())?,
                1 => match Field::from_local_name(e.local_name().as_ref()) {
                    Some(Field::Subject) => subject = Some(String::new()),
                    Some(Field::Body) => body = Some(String::new()),
                    None => {}
                },
                _ => {}
            },
            Event::Text(e) if depth == 2 && field.is_some() => buf.push_str(&e.unescape()?),
            Event::CData(e) if depth == 2 && field.is_some() => {
                let raw = e.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| StoreError::Codec(format!("SIF note is not UTF-8: {}", e)))?;
                buf.push_str(text);
            }
            Event::End(_) => {
                if depth == 2 {
                    match field.take() {
                        Some(Field::Subject) => subject = Some(std::mem::take(&mut buf)),
                        Some(Field::Body) => body = Some(std::mem::take(&mut buf)),
                        None => {}
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(StoreError::Codec("not a SIF note".into()));
    }
    let body = body.ok_or_else(|| StoreError::Codec("SIF note without body".into()))?;
    Ok((subject.filter(|s| !s.is_empty()), body))
}

fn check_root(name: &[u8]) -> StoreResult<bool> {
    if name != b"note" {
        return Err(StoreError::Codec(format!(
            "not a SIF note: root <{}>",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(true)
}
