// src/reader/state.rs

/// Decoding phase. `Results` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Initial,
    Header,
    Results,
}

/// Elements of the FMPXMLRESULT grammar the decoder cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Root,
    ErrorCode,
    Product,
    Database,
    Field,
    ResultSet,
    Row,
    Col,
    Data,
    Other,
}

impl Tag {
    /// Classify an element by its local (namespace-stripped) name.
    pub fn from_local_name(name: &[u8]) -> Self {
        match name {
            b"DATA" => Tag::Data,
            b"COL" => Tag::Col,
            b"ROW" => Tag::Row,
            b"FIELD" => Tag::Field,
            b"RESULTSET" => Tag::ResultSet,
            b"DATABASE" => Tag::Database,
            b"PRODUCT" => Tag::Product,
            b"ERRORCODE" => Tag::ErrorCode,
            b"FMPXMLRESULT" => Tag::Root,
            _ => Tag::Other,
        }
    }

    /// Elements whose attributes the header phase reads.
    pub fn has_header_attributes(&self) -> bool {
        matches!(
            self,
            Tag::Root | Tag::Database | Tag::Field | Tag::Product | Tag::ResultSet
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    Start,
    End,
}

/// What the reader must do with one structural event.
///
/// Header elements carry their attributes on the start tag but are consumed on
/// the end tag, hence `StashAttributes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    EnterHeader,
    StashAttributes,
    OpenErrorCode,
    ErrorCode,
    Product,
    Database,
    Field,
    EnterResults,
    OpenRow,
    CloseRow,
    OpenCol,
    CloseCol,
    OpenData,
    CloseData,
    Ignore,
}

/// Route a structural event given the current phase.
///
/// `Results` is tested first: nearly every event of a real export arrives in
/// that phase, so this keeps the hot path to a single comparison.
pub fn route(phase: Phase, tag: Tag, edge: Edge) -> Action {
    if phase == Phase::Results {
        return match (tag, edge) {
            (Tag::Data, Edge::Start) => Action::OpenData,
            (Tag::Data, Edge::End) => Action::CloseData,
            (Tag::Col, Edge::Start) => Action::OpenCol,
            (Tag::Col, Edge::End) => Action::CloseCol,
            (Tag::Row, Edge::Start) => Action::OpenRow,
            (Tag::Row, Edge::End) => Action::CloseRow,
            _ => Action::Ignore,
        };
    }

    if phase == Phase::Header {
        return match (tag, edge) {
            (Tag::Field, Edge::End) => Action::Field,
            (Tag::Field | Tag::Database | Tag::Product, Edge::Start) => Action::StashAttributes,
            (Tag::Database, Edge::End) => Action::Database,
            (Tag::Product, Edge::End) => Action::Product,
            (Tag::ErrorCode, Edge::Start) => Action::OpenErrorCode,
            (Tag::ErrorCode, Edge::End) => Action::ErrorCode,
            (Tag::ResultSet, Edge::Start) => Action::EnterResults,
            _ => Action::Ignore,
        };
    }

    match (tag, edge) {
        (Tag::Root, Edge::Start) => Action::EnterHeader,
        _ => Action::Ignore,
    }
}

/// Phase after `action` has been applied.
pub fn transition(phase: Phase, action: Action) -> Phase {
    match (phase, action) {
        (Phase::Initial, Action::EnterHeader) => Phase::Header,
        (Phase::Header, Action::EnterResults) => Phase::Results,
        (phase, _) => phase,
    }
}
