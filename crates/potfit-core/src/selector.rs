//! Selector de filas pendientes.
//!
//! Recorre el store por páginas (keyset sobre `id`) para no materializar
//! toda la cola en memoria. Cada página refleja el estado actual del store;
//! el orden es ascendente por `id`, determinista para un mismo snapshot.

use std::collections::VecDeque;

use crate::constants::DEFAULT_PAGE_SIZE;
use crate::errors::StoreError;
use crate::store::{PendingCalculation, RecordStore};

pub struct PendingSelector<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    client: &'a str,
    page_size: usize,
    last_id: Option<i64>,
    buffered: VecDeque<PendingCalculation>,
    exhausted: bool,
}

impl<'a, S: RecordStore + ?Sized> PendingSelector<'a, S> {
    pub fn new(store: &'a S, client: &'a str) -> Self {
        Self { store,
               client,
               page_size: DEFAULT_PAGE_SIZE,
               last_id: None,
               buffered: VecDeque::new(),
               exhausted: false }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let page = self.store.pending_page(self.client, self.last_id, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.last_id = Some(last.id);
        }
        self.buffered.extend(page);
        Ok(())
    }
}

impl<S: RecordStore + ?Sized> Iterator for PendingSelector<'_, S> {
    type Item = Result<PendingCalculation, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                // Un error de store termina la secuencia.
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}
