use async_trait::async_trait;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// `limit`/`offset` pair for a list call. `limit` is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    limit: u32,
    offset: u64,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u64) -> ClientResult<Self> {
        if limit == 0 {
            return Err(ClientError::validation("page limit must be at least 1"));
        }
        Ok(Self { limit, offset })
    }

    pub fn first(limit: u32) -> ClientResult<Self> {
        Self::new(limit, 0)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Fetches one page of `T`.
#[async_trait]
pub trait ListSource<T>: Send + Sync {
    async fn list(&self, page: PageRequest) -> ClientResult<Vec<T>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState<T> {
    page_index: u32,
    page_size: u32,
    items: Vec<T>,
}

impl<T> PageState<T> {
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page_index) * u64::from(self.page_size)
    }
}

/// Parameters a reload was started with.
///
/// Handed back to [`PagedCollection::complete`] so a result that arrives
/// after the page, the size, or the scope changed can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket {
    page_index: u32,
    page_size: u32,
    sequence: u64,
}

impl ReloadTicket {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            limit: self.page_size,
            offset: u64::from(self.page_index) * u64::from(self.page_size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Superseded,
}

/// Read-only snapshot handed to the presentation layer.
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a, T> {
    pub page_index: u32,
    pub page_size: u32,
    pub items: &'a [T],
    pub status: &'a LoadStatus,
    pub has_more: bool,
}

/// Paging state machine for one remote list.
///
/// Only the most recently started reload may land; anything older is
/// dropped on arrival without touching items or status.
#[derive(Debug)]
pub struct PagedCollection<T> {
    state: PageState<T>,
    status: LoadStatus,
    issued: u64,
    in_flight: Option<ReloadTicket>,
}

impl<T> PagedCollection<T> {
    pub fn new(page_size: u32) -> ClientResult<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            state: PageState {
                page_index: 0,
                page_size,
                items: vec![],
            },
            status: LoadStatus::Idle,
            issued: 0,
            in_flight: None,
        })
    }

    pub fn state(&self) -> &PageState<T> {
        &self.state
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn items(&self) -> &[T] {
        &self.state.items
    }

    pub fn page_index(&self) -> u32 {
        self.state.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.state.page_size
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// A full page came back, so the next one may have items.
    pub fn has_more(&self) -> bool {
        self.state.items.len() >= self.state.page_size as usize
    }

    pub fn view(&self) -> PageView<'_, T> {
        PageView {
            page_index: self.state.page_index,
            page_size: self.state.page_size,
            items: &self.state.items,
            status: &self.status,
            has_more: self.has_more(),
        }
    }

    pub fn set_page_size(&mut self, page_size: u32) -> ClientResult<ReloadTicket> {
        validate_page_size(page_size)?;
        self.state.page_size = page_size;
        self.state.page_index = 0;
        Ok(self.begin_reload())
    }

    pub fn next_page(&mut self) -> ReloadTicket {
        self.state.page_index = self.state.page_index.saturating_add(1);
        self.begin_reload()
    }

    pub fn prev_page(&mut self) -> Option<ReloadTicket> {
        if self.state.page_index == 0 {
            return None;
        }
        self.state.page_index -= 1;
        Some(self.begin_reload())
    }

    pub fn begin_reload(&mut self) -> ReloadTicket {
        if let Some(previous) = self.in_flight {
            debug!(
                page_index = previous.page_index,
                page_size = previous.page_size,
                "superseding in-flight reload"
            );
        }
        self.issued += 1;
        let ticket = ReloadTicket {
            page_index: self.state.page_index,
            page_size: self.state.page_size,
            sequence: self.issued,
        };
        self.in_flight = Some(ticket);
        self.status = LoadStatus::Loading;
        ticket
    }

    /// Lands the result of `ticket`'s reload unless it has been superseded.
    ///
    /// A failure keeps the previously shown items.
    pub fn complete(&mut self, ticket: ReloadTicket, result: ClientResult<Vec<T>>) -> Completion {
        if self.in_flight != Some(ticket)
            || ticket.page_index != self.state.page_index
            || ticket.page_size != self.state.page_size
        {
            debug!(
                page_index = ticket.page_index,
                page_size = ticket.page_size,
                "discarding superseded page"
            );
            return Completion::Superseded;
        }

        self.in_flight = None;
        match result {
            Ok(items) => {
                debug!(count = items.len(), page_index = ticket.page_index, "page loaded");
                self.state.items = items;
                self.status = LoadStatus::Loaded;
            }
            Err(err) => {
                debug!(error = %err, "page reload failed; keeping previous items");
                self.status = LoadStatus::Failed(err);
            }
        }
        Completion::Applied
    }

    /// Empties the list, rewinds to the first page and orphans any in-flight
    /// reload. The page size is kept.
    pub fn clear(&mut self) {
        self.state.items.clear();
        self.state.page_index = 0;
        self.status = LoadStatus::Idle;
        self.in_flight = None;
        self.issued += 1;
    }

    /// Runs the reload described by `ticket` against `source`.
    ///
    /// Returns the failure only when it was actually applied.
    pub async fn run<S>(&mut self, ticket: ReloadTicket, source: &S) -> ClientResult<Completion>
    where
        S: ListSource<T> + ?Sized,
    {
        let result = source.list(ticket.page_request()).await;
        let failure = result.as_ref().err().cloned();
        match (self.complete(ticket, result), failure) {
            (Completion::Applied, Some(err)) => Err(err),
            (completion, _) => Ok(completion),
        }
    }

    pub async fn reload_from<S>(&mut self, source: &S) -> ClientResult<Completion>
    where
        S: ListSource<T> + ?Sized,
    {
        let ticket = self.begin_reload();
        self.run(ticket, source).await
    }
}

fn validate_page_size(page_size: u32) -> ClientResult<()> {
    if page_size == 0 {
        return Err(ClientError::validation("page size must be at least 1"));
    }
    Ok(())
}
