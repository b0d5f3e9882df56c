//! Quick-XML based XMLTV parser
//!
//! Streams through a guide document once, keeping only `channel` and
//! `programme` records. Unknown elements are ignored. Records missing a
//! channel id or a valid start/stop pair, or whose stop is not after their
//! start, are dropped without failing the document; a structurally broken
//! document fails as a whole.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::errors::{SourceError, SourceResult};
use crate::models::{EpgChannel, Program, UNTITLED_PROGRAM};
use crate::utils::datetime::parse_xmltv_time;

const PREVIEW_CHARS: usize = 40;

/// Channels and programmes read from one guide document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvDocument {
    pub programs: Vec<Program>,
    pub channels: Vec<EpgChannel>,
}

impl XmltvDocument {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty() && self.channels.is_empty()
    }
}

/// What a downloaded body looks like before any parsing is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Markup rooted at `<tv>`, possibly behind an XML declaration
    Guide,
    /// Something else: an HTML error page, JSON, a playlist
    NotGuideFormat,
    /// Nothing but whitespace and byte order marks
    Empty,
}

fn trim_leading(text: &str) -> &str {
    text.trim_start_matches(|c: char| c == '\u{FEFF}' || c.is_whitespace())
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Classify a body as guide markup without parsing it.
pub fn classify_document(text: &str) -> DocumentKind {
    let trimmed = trim_leading(text);
    if trimmed.is_empty() {
        return DocumentKind::Empty;
    }
    if !trimmed.starts_with('<') {
        return DocumentKind::NotGuideFormat;
    }
    if starts_with_ignore_case(trimmed, "<tv") {
        return DocumentKind::Guide;
    }
    if starts_with_ignore_case(trimmed, "<?xml") && trimmed.to_ascii_lowercase().contains("<tv") {
        return DocumentKind::Guide;
    }
    DocumentKind::NotGuideFormat
}

/// First characters of a body on a single line, for report lines.
pub fn preview(text: &str) -> String {
    let trimmed = trim_leading(text);
    let mut head: String = trimmed
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    if trimmed.chars().nth(PREVIEW_CHARS).is_some() {
        head.push_str("...");
    }
    head
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DisplayName,
    Title,
    Description,
}

#[derive(Debug)]
struct PendingChannel {
    id: String,
    display_names: Vec<String>,
    seen: HashSet<String>,
}

impl PendingChannel {
    fn new(id: String) -> Self {
        Self {
            id,
            display_names: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn add_name(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() && self.seen.insert(name.to_lowercase()) {
            self.display_names.push(name.to_string());
        }
    }

    fn finish(self) -> EpgChannel {
        EpgChannel {
            id: self.id,
            display_names: self.display_names,
        }
    }
}

#[derive(Debug)]
struct PendingProgram {
    channel_id: String,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    title: Option<String>,
    description: Option<String>,
}

impl PendingProgram {
    fn from_element(element: &BytesStart) -> Option<Self> {
        let attrs = parse_attributes(element);
        let channel_id = attrs.get("channel").map(|c| c.trim()).filter(|c| !c.is_empty())?;
        let start = parse_xmltv_time(attrs.get("start")?).ok()?;
        let end = parse_xmltv_time(attrs.get("stop")?).ok()?;
        if end <= start {
            return None;
        }
        Some(Self {
            channel_id: channel_id.to_string(),
            start,
            end,
            title: None,
            description: None,
        })
    }

    fn finish(self) -> Program {
        Program {
            channel_id: self.channel_id,
            title: self.title.unwrap_or_else(|| UNTITLED_PROGRAM.to_string()),
            description: self.description,
            start: self.start,
            end: self.end,
        }
    }
}

fn element_is(element: &[u8], name: &str) -> bool {
    element.eq_ignore_ascii_case(name.as_bytes())
}

fn channel_id_of(element: &BytesStart) -> Option<String> {
    parse_attributes(element)
        .get("id")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn text_of(text: &BytesText) -> String {
    match text.unescape() {
        Ok(unescaped) => unescaped.into_owned(),
        // Feeds routinely use HTML entities such as &nbsp; that XML does not define
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

/// Parse guide markup into programmes and channels.
///
/// Leading byte order marks and any junk before the first `<` are skipped.
/// Empty input yields an empty document.
pub fn parse_xmltv(content: &str) -> SourceResult<XmltvDocument> {
    let trimmed = trim_leading(content);
    let Some(start) = trimmed.find('<') else {
        return Ok(XmltvDocument::default());
    };

    let mut reader = Reader::from_str(&trimmed[start..]);
    reader.config_mut().trim_text(true);

    let mut document = XmltvDocument::default();
    let mut channel: Option<PendingChannel> = None;
    let mut program: Option<PendingProgram> = None;
    let mut capture: Option<Field> = None;
    let mut text = String::new();
    let mut dropped = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let name = name.as_ref();
                if element_is(name, "channel") {
                    channel = channel_id_of(e).map(PendingChannel::new);
                } else if element_is(name, "programme") {
                    program = PendingProgram::from_element(e);
                    if program.is_none() {
                        dropped += 1;
                    }
                } else if channel.is_some() && element_is(name, "display-name") {
                    capture = Some(Field::DisplayName);
                } else if program.is_some() && element_is(name, "title") {
                    capture = Some(Field::Title);
                } else if program.is_some() && element_is(name, "desc") {
                    capture = Some(Field::Description);
                }
                text.clear();
            }

            Ok(Event::End(ref e)) => {
                let name = e.name();
                let name = name.as_ref();
                if element_is(name, "channel") {
                    if let Some(pending) = channel.take() {
                        document.channels.push(pending.finish());
                    }
                } else if element_is(name, "programme") {
                    if let Some(pending) = program.take() {
                        document.programs.push(pending.finish());
                    }
                } else if let Some(field) = capture.take() {
                    let value = text.trim();
                    if !value.is_empty() {
                        match field {
                            Field::DisplayName => {
                                if let Some(pending) = channel.as_mut() {
                                    pending.add_name(value);
                                }
                            }
                            Field::Title => {
                                if let Some(pending) = program.as_mut() {
                                    pending.title.get_or_insert_with(|| value.to_string());
                                }
                            }
                            Field::Description => {
                                if let Some(pending) = program.as_mut() {
                                    pending.description.get_or_insert_with(|| value.to_string());
                                }
                            }
                        }
                    }
                }
                text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let name = name.as_ref();
                if element_is(name, "channel") {
                    if let Some(id) = channel_id_of(e) {
                        document.channels.push(PendingChannel::new(id).finish());
                    }
                } else if element_is(name, "programme") {
                    match PendingProgram::from_element(e) {
                        Some(pending) => document.programs.push(pending.finish()),
                        None => dropped += 1,
                    }
                }
            }

            Ok(Event::Text(ref e)) => {
                if capture.is_some() {
                    text.push_str(&text_of(e));
                }
            }

            Ok(Event::CData(ref e)) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(SourceError::parse_error(
                    "xmltv",
                    format!("XML parsing error at position {}: {e}", reader.buffer_position()),
                ));
            }

            _ => {} // Ignore declarations, comments, doctypes, processing instructions
        }
    }

    debug!(
        "Parsed XMLTV document: {} programmes, {} channels, {} programmes dropped",
        document.programs.len(),
        document.channels.len(),
        dropped
    );

    Ok(document)
}

/// Parse XML attributes into a HashMap keyed by lowercased name
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.insert(key, value);
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="BBC1.uk">
    <display-name>BBC One</display-name>
    <display-name>bbc one</display-name>
    <display-name>BBC 1</display-name>
    <icon src="http://logo/bbc1.png"/>
  </channel>
  <channel id="  ">
    <display-name>Nameless</display-name>
  </channel>
  <channel id="ITV1.uk"/>
  <programme start="20240101180000 +0000" stop="20240101190000 +0000" channel="BBC1.uk">
    <title lang="en"></title>
    <title lang="en">News &amp; Weather</title>
    <title lang="cy">Newyddion</title>
    <desc>  </desc>
    <desc>Headlines</desc>
  </programme>
  <programme start="20240101190000 +0000" stop="20240101190000 +0000" channel="BBC1.uk">
    <title>Zero length</title>
  </programme>
  <programme start="20240101190000 +0000" channel="BBC1.uk">
    <title>No stop</title>
  </programme>
  <programme start="20240101190000 +0000" stop="20240101200000 +0000" channel="">
    <title>No channel</title>
  </programme>
  <programme start="20240101190000 +0100" stop="20240101200000 +0100" channel=" ITV1.uk ">
    <desc>No title here</desc>
  </programme>
  <programme start="20240101200000 +0000" stop="20240101210000 +0000" channel="ITV1.uk"/>
</tv>"#;

    #[test]
    fn test_parse_channels() {
        let doc = parse_xmltv(SAMPLE).unwrap();
        assert_eq!(doc.channels.len(), 2);
        assert_eq!(doc.channels[0].id, "BBC1.uk");
        assert_eq!(doc.channels[0].display_names, vec!["BBC One", "BBC 1"]);
        assert_eq!(doc.channels[1].id, "ITV1.uk");
        assert!(doc.channels[1].display_names.is_empty());
    }

    #[test]
    fn test_parse_programmes() {
        let doc = parse_xmltv(SAMPLE).unwrap();
        assert_eq!(doc.programs.len(), 3);

        let news = &doc.programs[0];
        assert_eq!(news.channel_id, "BBC1.uk");
        assert_eq!(news.title, "News & Weather");
        assert_eq!(news.description.as_deref(), Some("Headlines"));
        assert_eq!(news.start, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());

        let untitled = &doc.programs[1];
        assert_eq!(untitled.channel_id, "ITV1.uk");
        assert_eq!(untitled.title, UNTITLED_PROGRAM);
        assert_eq!(untitled.start, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());

        assert_eq!(doc.programs[2].title, UNTITLED_PROGRAM);
        assert!(doc.programs.iter().all(|p| p.end > p.start));
    }

    #[test]
    fn test_leading_garbage_and_bom_are_skipped() {
        let xml = "\u{FEFF}  junk<tv><channel id=\"a\"><display-name>A</display-name></channel></tv>";
        let doc = parse_xmltv(xml).unwrap();
        assert_eq!(doc.channels.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_xmltv("").unwrap().is_empty());
        assert!(parse_xmltv("   \n").unwrap().is_empty());
        assert!(parse_xmltv("no markup at all").unwrap().is_empty());
    }

    #[test]
    fn test_broken_document_fails() {
        let xml = "<tv><programme channel=\"a\"><title>x</desc></programme></tv>";
        assert!(matches!(
            parse_xmltv(xml),
            Err(SourceError::ParseError { .. })
        ));
    }

    #[test]
    fn test_classify_document() {
        assert_eq!(classify_document("<tv></tv>"), DocumentKind::Guide);
        assert_eq!(classify_document("\u{FEFF}\r\n<TV>"), DocumentKind::Guide);
        assert_eq!(
            classify_document("<?xml version=\"1.0\"?>\n<tv>"),
            DocumentKind::Guide
        );
        assert_eq!(
            classify_document("<?xml version=\"1.0\"?><rss></rss>"),
            DocumentKind::NotGuideFormat
        );
        assert_eq!(
            classify_document("<!DOCTYPE html><html>"),
            DocumentKind::NotGuideFormat
        );
        assert_eq!(classify_document("{\"error\":1}"), DocumentKind::NotGuideFormat);
        assert_eq!(classify_document(" \u{FEFF} \n"), DocumentKind::Empty);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("\u{FEFF}<html>\r\n<body>"), "<html>  <body>");
        let long = "x".repeat(50);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(40)));
    }
}
