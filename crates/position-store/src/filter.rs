use model::{InstrumentClass, Position, PositionKind, Venue};

/// Conjunctive position query. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionFilter {
    pub owner_id: Option<i64>,
    pub kind: Option<PositionKind>,
    pub venue: Option<Venue>,
    pub instrument_class: Option<InstrumentClass>,
    pub symbol: Option<String>,
    pub depends_on: Option<String>,
    pub filled: Option<bool>,
    pub tp_opened: Option<bool>,
    pub finished: Option<bool>,
}

impl PositionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything not yet finished.
    pub fn open() -> Self {
        Self::new().finished(false)
    }

    pub fn owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn kind(mut self, kind: PositionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn venue(mut self, venue: Venue) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn class(mut self, class: InstrumentClass) -> Self {
        self.instrument_class = Some(class);
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn depends_on(mut self, anchor_id: impl Into<String>) -> Self {
        self.depends_on = Some(anchor_id.into());
        self
    }

    pub fn filled(mut self, filled: bool) -> Self {
        self.filled = Some(filled);
        self
    }

    pub fn tp_opened(mut self, tp_opened: bool) -> Self {
        self.tp_opened = Some(tp_opened);
        self
    }

    pub fn finished(mut self, finished: bool) -> Self {
        self.finished = Some(finished);
        self
    }

    pub fn matches(&self, p: &Position) -> bool {
        self.owner_id.map_or(true, |v| p.owner_id == v)
            && self.kind.map_or(true, |v| p.kind == v)
            && self.venue.map_or(true, |v| p.venue == v)
            && self.instrument_class.map_or(true, |v| p.instrument_class == v)
            && self.symbol.as_ref().map_or(true, |v| &p.symbol == v)
            && self
                .depends_on
                .as_ref()
                .map_or(true, |v| p.depends_on.as_ref() == Some(v))
            && self.filled.map_or(true, |v| p.filled == v)
            && self.tp_opened.map_or(true, |v| p.tp_opened == v)
            && self.finished.map_or(true, |v| p.finished == v)
    }
}
