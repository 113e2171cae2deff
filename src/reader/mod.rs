//! Streaming decoder for FileMaker Pro `FMPXMLRESULT` exports.
//!
//! [`FmpReader`] is a pull iterator. The first item is always the
//! [`Schema`]; every following item is one [`Record`]. Nothing beyond the row
//! being assembled is kept in memory, and dropping the reader drops the
//! underlying byte source.

pub mod catalog;
pub mod emitter;
pub mod error;
pub mod naming;
pub mod state;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::{io::BufRead, mem, sync::Arc};
use tracing::{debug, info, warn};

use crate::schema::{Record, Schema};
use catalog::{parse_count, Attributes, FieldCatalog};
use emitter::{finalize_schema, RecordEmitter};
use state::{route, transition, Action, Edge, Phase, Tag};

pub use error::{DecodeWarning, DuplicateName, FmpError, FmpResult};
pub use naming::{sanitize_name, DefaultNameResolver, NameResolver, NumberedNameResolver};

/// Namespace declared on `<FMPXMLRESULT>` by FileMaker.
pub const FMP_NAMESPACE: &str = "http://www.filemaker.com/fmp/1/result";

const PROGRESS_EVERY: u64 = 100_000;

/// One item of the decoded stream.
#[derive(Debug, Clone)]
pub enum FmpItem {
    Schema(Arc<Schema>),
    Record(Record),
}

impl FmpItem {
    pub fn into_record(self) -> Option<Record> {
        match self {
            FmpItem::Record(r) => Some(r),
            FmpItem::Schema(_) => None,
        }
    }
}

/// A structural event, owned, detached from the tokenizer's buffer.
enum Step {
    Element {
        tag: Tag,
        edge: Edge,
        attrs: Option<Attributes>,
    },
    Text(String),
    Eof,
    Skip,
}

/// Decode `source` with the default naming policy.
pub fn read_fmp_xml<R: BufRead>(source: R) -> FmpReader<R> {
    FmpReader::new(source)
}

pub struct FmpReader<R: BufRead> {
    xml: Reader<R>,
    buf: Vec<u8>,
    phase: Phase,
    catalog: FieldCatalog,
    emitter: Option<RecordEmitter>,
    resolver: Box<dyn NameResolver + Send>,
    pending: Attributes,
    text: String,
    capturing: bool,
    depth: usize,
    warnings: Vec<DecodeWarning>,
    done: bool,
}

impl<R: BufRead> FmpReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_resolver(source, DefaultNameResolver)
    }

    pub fn with_resolver(source: R, resolver: impl NameResolver + Send + 'static) -> Self {
        let mut xml = Reader::from_reader(source);
        let config = xml.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            xml,
            buf: Vec::with_capacity(1024),
            phase: Phase::Initial,
            catalog: FieldCatalog::new(),
            emitter: None,
            resolver: Box::new(resolver),
            pending: Attributes::new(),
            text: String::new(),
            capturing: false,
            depth: 0,
            warnings: Vec::new(),
            done: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Available once the header has been read.
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.emitter.as_ref().map(|e| e.schema())
    }

    /// Non-fatal conditions seen so far. Each is also logged.
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    pub fn rows_emitted(&self) -> u64 {
        self.emitter.as_ref().map_or(0, |e| e.rows_emitted())
    }

    /// Pull the first item, which is the schema.
    pub fn read_schema(&mut self) -> FmpResult<Arc<Schema>> {
        if let Some(schema) = self.schema() {
            return Ok(Arc::clone(schema));
        }
        match self.next() {
            Some(Ok(FmpItem::Schema(schema))) => Ok(schema),
            Some(Ok(FmpItem::Record(_))) => unreachable!("records never precede the schema"),
            Some(Err(e)) => Err(e),
            None => Err(FmpError::MissingResultSet),
        }
    }

    /// Records only; the schema item is skipped.
    pub fn into_records(self) -> impl Iterator<Item = FmpResult<Record>> {
        self.filter_map(|item| match item {
            Ok(FmpItem::Record(r)) => Some(Ok(r)),
            Ok(FmpItem::Schema(_)) => None,
            Err(e) => Some(Err(e)),
        })
    }

    /// Give back the byte source.
    pub fn into_inner(self) -> R {
        self.xml.into_inner()
    }

    fn advance(&mut self) -> FmpResult<Option<FmpItem>> {
        loop {
            match self.read_step()? {
                Step::Element { tag, edge, attrs } => {
                    if let Some(item) = self.apply(tag, edge, attrs)? {
                        return Ok(Some(item));
                    }
                }
                Step::Text(text) => self.text.push_str(&text),
                Step::Skip => {}
                Step::Eof => return self.finish().map(|_| None),
            }
        }
    }

    /// Read one tokenizer event and detach what we need from its buffer.
    ///
    /// The buffer is cleared on every call, so tokenizer memory stays bounded
    /// by the largest single event rather than growing with the document.
    fn read_step(&mut self) -> FmpResult<Step> {
        self.buf.clear();
        let phase = self.phase;
        let capturing = self.capturing;
        let position = self.xml.buffer_position() as u64;

        let event = match self.xml.read_event_into(&mut self.buf) {
            Ok(event) => event,
            Err(source) => {
                return Err(FmpError::Xml {
                    position: self.xml.error_position() as u64,
                    source,
                })
            }
        };

        let step = match event {
            Event::Start(start) => {
                let tag = Tag::from_local_name(start.local_name().as_ref());
                let attrs = if phase != Phase::Results && tag.has_header_attributes() {
                    Some(collect_attributes(&start, position)?)
                } else {
                    None
                };
                Step::Element {
                    tag,
                    edge: Edge::Start,
                    attrs,
                }
            }
            Event::End(end) => Step::Element {
                tag: Tag::from_local_name(end.local_name().as_ref()),
                edge: Edge::End,
                attrs: None,
            },
            Event::Text(text) if capturing => {
                let unescaped = text.unescape().map_err(|source| FmpError::Xml {
                    position,
                    source,
                })?;
                Step::Text(unescaped.into_owned())
            }
            Event::CData(cdata) if capturing => {
                let text = std::str::from_utf8(&cdata)
                    .map_err(|source| FmpError::InvalidUtf8 { position, source })?;
                Step::Text(text.to_owned())
            }
            Event::Eof => Step::Eof,
            _ => Step::Skip,
        };
        Ok(step)
    }

    fn apply(&mut self, tag: Tag, edge: Edge, attrs: Option<Attributes>) -> FmpResult<Option<FmpItem>> {
        match edge {
            Edge::Start => self.depth += 1,
            Edge::End => self.depth = self.depth.saturating_sub(1),
        }

        let action = route(self.phase, tag, edge);
        let mut item = None;
        match action {
            Action::OpenData => {
                self.text.clear();
                self.capturing = true;
            }
            Action::CloseData => {
                self.capturing = false;
                let value = if self.text.is_empty() {
                    None
                } else {
                    Some(mem::take(&mut self.text))
                };
                self.emitter_mut().push_data(value)?;
            }
            Action::OpenCol => self.emitter_mut().open_col(),
            Action::CloseCol => self.emitter_mut().close_col(),
            Action::OpenRow => self.emitter_mut().open_row(),
            Action::CloseRow => {
                let record = self.emitter_mut().close_row()?;
                if record.row() % PROGRESS_EVERY == 0 {
                    debug!(rows = record.row(), "decoding");
                }
                item = Some(FmpItem::Record(record));
            }
            Action::StashAttributes => {
                self.pending = attrs.unwrap_or_default();
            }
            Action::Field => self.catalog.add_field(&self.pending)?,
            Action::Database => self.catalog.add_database(&self.pending)?,
            Action::Product => self.catalog.set_product(&self.pending),
            Action::OpenErrorCode => {
                self.text.clear();
                self.capturing = true;
            }
            Action::ErrorCode => {
                self.capturing = false;
                self.catalog.set_error_code(&self.text);
                self.text.clear();
                if let Some(code) = self.catalog.error_code.filter(|c| *c != 0) {
                    self.warn(DecodeWarning::ExportErrorCode(code));
                }
            }
            Action::EnterResults => {
                let schema = self.enter_results(attrs.unwrap_or_default())?;
                item = Some(FmpItem::Schema(schema));
            }
            Action::EnterHeader => {
                if let Some(ns) = attrs.as_ref().and_then(|a| a.get("xmlns")) {
                    if ns != FMP_NAMESPACE {
                        self.warn(DecodeWarning::UnexpectedNamespace(ns.to_string()));
                    }
                }
            }
            Action::Ignore => {}
        }
        self.phase = transition(self.phase, action);
        Ok(item)
    }

    fn enter_results(&mut self, attrs: Attributes) -> FmpResult<Arc<Schema>> {
        let found = attrs.get("FOUND").ok_or(FmpError::MissingAttribute {
            element: "RESULTSET",
            attribute: "FOUND",
        })?;
        let found = parse_count(found, "RESULTSET", "FOUND")?;

        let catalog = mem::take(&mut self.catalog);
        let (schema, warning) = finalize_schema(catalog, found, &*self.resolver)?;
        if let Some(w) = warning {
            self.warnings.push(w);
        }
        info!(
            table = %schema.table_name,
            fields = schema.fields.len(),
            records = schema.resultset_record_count,
            "parsing records"
        );

        let schema = Arc::new(schema);
        self.emitter = Some(RecordEmitter::new(Arc::clone(&schema)));
        Ok(schema)
    }

    fn finish(&mut self) -> FmpResult<()> {
        if self.depth > 0 {
            return Err(FmpError::Truncated { open: self.depth });
        }
        match self.phase {
            Phase::Initial => Err(FmpError::NotFmpXml),
            Phase::Header => Err(FmpError::MissingResultSet),
            Phase::Results => {
                let emitter = self.emitter_mut();
                emitter.finish()?;
                info!(rows = emitter.rows_emitted(), "finished decoding");
                Ok(())
            }
        }
    }

    fn emitter_mut(&mut self) -> &mut RecordEmitter {
        self.emitter
            .as_mut()
            .expect("row events are only routed in the results phase")
    }

    fn warn(&mut self, warning: DecodeWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

impl<R: BufRead> Iterator for FmpReader<R> {
    type Item = FmpResult<FmpItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn collect_attributes(start: &BytesStart<'_>, position: u64) -> FmpResult<Attributes> {
    let malformed = |message: String| FmpError::Attribute {
        element: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        position,
        message,
    };

    let mut attrs = Attributes::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        attrs.push(key, value);
    }
    Ok(attrs)
}
