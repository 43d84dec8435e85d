//! Lazy key-ordered iteration over a [`ColdStore`].
//!
//! Pages are fetched on demand with a keyset cursor, so a scan never holds a
//! read transaction open across the whole tier and writers are not blocked.
//! A scanner cannot be resumed; start a new one to rescan.

use std::collections::VecDeque;

use super::traits::{ColdStore, StorageError};

pub struct StoreScanner<'a> {
    store: &'a dyn ColdStore,
    page_size: usize,
    cursor: Option<Vec<u8>>,
    buffered: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl<'a> StoreScanner<'a> {
    pub fn new(store: &'a dyn ColdStore, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            cursor: None,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next `(key, value)` pair, or `None` once the end of the store is reached.
    pub async fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError> {
        if self.buffered.is_empty() && !self.exhausted {
            let page = self
                .store
                .scan(self.cursor.as_deref(), self.page_size)
                .await?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some((last, _)) = page.last() {
                self.cursor = Some(last.clone());
            }
            self.buffered.extend(page);
        }
        Ok(self.buffered.pop_front())
    }
}
