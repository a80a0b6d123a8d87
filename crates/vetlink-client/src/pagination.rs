//! Chat history pagination.
//!
//! Tracks the one history request that may be in flight, whether the initial
//! page has arrived, and whether older pages remain. The controller issues
//! no I/O itself; [`crate::ChatSession`] turns its decisions into fetch
//! actions and reports results back by request id.

use vetlink_proto::MessageId;

/// Identifies one request issued by a session. Results carrying an unknown
/// id are stale and get discarded.
pub type RequestId = u64;

/// What a history request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// First page of a room; replaces the store
    Initial,
    /// Page older than the cursor; prepended
    Older,
    /// Latest page after a reconnect; merged to catch missed messages
    CatchUp,
}

/// Single-flight pagination state.
///
/// # Invariants
///
/// - At most one `Initial` or `Older` request is in flight.
/// - `Older` requests are only issued after the initial load completed and
///   while older pages remain.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    in_flight: Option<(RequestId, HistoryKind)>,
    catch_up: Option<RequestId>,
    initial_done: bool,
    has_older: bool,
}

impl Pagination {
    /// Fresh controller with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether older pages remain on the server.
    pub fn has_older(&self) -> bool {
        self.has_older
    }

    /// Whether the first page is being fetched.
    pub fn is_loading_initial(&self) -> bool {
        matches!(self.in_flight, Some((_, HistoryKind::Initial)))
    }

    /// Whether any `Initial`/`Older` request is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the first page has arrived.
    pub fn is_initialized(&self) -> bool {
        self.initial_done
    }

    /// Start the initial load. Supersedes anything in flight.
    pub fn begin_initial(&mut self, request: RequestId) {
        self.in_flight = Some((request, HistoryKind::Initial));
        self.catch_up = None;
        self.initial_done = false;
        self.has_older = false;
    }

    /// Start loading the page before `oldest`.
    ///
    /// Returns the cursor to fetch with, or `None` if the request must not
    /// be issued: initial load pending, nothing older, already loading, or
    /// an empty store.
    pub fn begin_older(
        &mut self,
        request: RequestId,
        oldest: Option<MessageId>,
    ) -> Option<MessageId> {
        if !self.initial_done || !self.has_older || self.in_flight.is_some() {
            return None;
        }

        let cursor = oldest?;
        self.in_flight = Some((request, HistoryKind::Older));
        Some(cursor)
    }

    /// Start a catch-up fetch of the latest page. `false` if one is already
    /// running or the room was never loaded.
    pub fn begin_catch_up(&mut self, request: RequestId) -> bool {
        if !self.initial_done || self.catch_up.is_some() {
            return false;
        }
        self.catch_up = Some(request);
        true
    }

    /// Claim the result for `request`. `None` if it is stale.
    pub fn complete(&mut self, request: RequestId) -> Option<HistoryKind> {
        match self.in_flight {
            Some((id, kind)) if id == request => {
                self.in_flight = None;
                return Some(kind);
            },
            _ => {},
        }

        if self.catch_up == Some(request) {
            self.catch_up = None;
            return Some(HistoryKind::CatchUp);
        }

        None
    }

    /// Record the outcome of a successful `Initial` or `Older` page.
    ///
    /// A backfill page that added nothing ends pagination even if the
    /// server claims older pages exist, so a misbehaving backend cannot make
    /// the scroll sentinel fetch forever.
    pub fn finish(&mut self, kind: HistoryKind, has_previous: bool, added: usize) {
        match kind {
            HistoryKind::Initial => {
                self.initial_done = true;
                self.has_older = has_previous;
            },
            HistoryKind::Older => {
                self.has_older = has_previous && added > 0;
            },
            HistoryKind::CatchUp => {},
        }
    }

    /// Forget everything (room change, teardown).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
