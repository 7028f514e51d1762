//! Compact string tables.
//!
//! Entries are stored back to back in one byte buffer; the last byte of each
//! entry has its high bit set, so no length or separator is stored.  An empty
//! entry is a lone `0x80` byte.  The same encoding backs two things:
//!
//! - [`KeywordTable`], a read-only table compiled from a word list and
//!   matched case-insensitively (commands, function names, point tags);
//! - [`Arena`], a mutable, fixed-capacity table holding variable names and
//!   formula text.  Deleting an entry shifts every following byte left.
//!
//! Callers of [`Arena`] hold [`EntryId`] handles rather than raw offsets.
//! The arena keeps its own id → offset index and patches it on delete, so a
//! handle stays valid until its own entry is removed.

const TERM: u8 = 0x80;

// ── Encoding primitives ───────────────────────────────────────────────────────

/// Offset just past the entry that starts at `offset`.
pub fn next(bytes: &[u8], offset: usize) -> usize {
    bytes[offset.min(bytes.len())..]
        .iter()
        .position(|b| b & TERM != 0)
        .map_or(bytes.len(), |i| offset + i + 1)
}

/// Decoded text bytes of the entry starting at `offset`.
fn decode(bytes: &[u8], offset: usize) -> impl Iterator<Item = u8> + '_ {
    bytes[offset..next(bytes, offset)]
        .iter()
        .map(|b| b & !TERM)
        .filter(|b| *b != 0)
}

/// Case-insensitive comparison of one entry against `candidate`.
fn entry_matches(bytes: &[u8], offset: usize, candidate: &[u8]) -> bool {
    let mut text = decode(bytes, offset);
    let mut cand = candidate.iter();
    loop {
        match (text.next(), cand.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => {}
            _ => return false,
        }
    }
}

/// Index of the first entry equal (ASCII case-folded) to `candidate`.
pub fn scan(bytes: &[u8], candidate: &[u8]) -> Option<usize> {
    let mut offset = 0;
    let mut idx = 0;
    while offset < bytes.len() {
        if entry_matches(bytes, offset, candidate) {
            return Some(idx);
        }
        offset = next(bytes, offset);
        idx += 1;
    }
    None
}

/// Encode `text` as one entry, optionally dropping space/tab/newline.
fn encode(text: &[u8], strip_whitespace: bool) -> Vec<u8> {
    let mut out: Vec<u8> = text
        .iter()
        .filter(|b| !(strip_whitespace && matches!(b, b' ' | b'\t' | b'\n' | b'\r')))
        .map(|b| b & !TERM)
        .collect();
    match out.last_mut() {
        Some(last) => *last |= TERM,
        None => out.push(TERM),
    }
    out
}

// ── KeywordTable ──────────────────────────────────────────────────────────────

/// A read-only keyword list.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    bytes: Vec<u8>,
}

impl KeywordTable {
    pub fn new(words: &[&str]) -> Self {
        let bytes = words
            .iter()
            .flat_map(|w| encode(w.as_bytes(), false))
            .collect();
        KeywordTable { bytes }
    }

    /// Zero-based index of `word`, ignoring ASCII case.
    pub fn scan(&self, word: &str) -> Option<usize> {
        scan(&self.bytes, word.as_bytes())
    }
}

// ── Arena ─────────────────────────────────────────────────────────────────────

/// Stable handle to an [`Arena`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

/// A fixed-capacity string arena with delete-compaction.
#[derive(Debug, Clone)]
pub struct Arena {
    bytes: Vec<u8>,
    capacity: usize,
    /// Live entries in storage order.
    index: Vec<(EntryId, usize)>,
    next_id: u32,
}

impl Arena {
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            bytes: Vec::with_capacity(capacity),
            capacity,
            index: Vec::new(),
            next_id: 0,
        }
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.bytes.len()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.index.clear();
    }

    /// Append `text` as a new entry.
    ///
    /// Returns `None` if the encoded entry does not fit in the remaining
    /// capacity; the arena is unchanged in that case.
    pub fn add(&mut self, text: &str, strip_whitespace: bool) -> Option<EntryId> {
        let entry = encode(text.as_bytes(), strip_whitespace);
        if self.bytes.len() + entry.len() > self.capacity {
            return None;
        }
        let id = EntryId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.index.push((id, self.bytes.len()));
        self.bytes.extend_from_slice(&entry);
        Some(id)
    }

    /// Remove an entry, shifting later bytes left.  Returns the number of
    /// bytes removed (zero for an unknown handle).
    pub fn delete(&mut self, id: EntryId) -> usize {
        let Some(slot) = self.index.iter().position(|(e, _)| *e == id) else {
            return 0;
        };
        let (_, offset) = self.index.remove(slot);
        let end = next(&self.bytes, offset);
        let removed = end - offset;
        self.bytes.drain(offset..end);
        for (_, off) in &mut self.index[slot..] {
            *off -= removed;
        }
        removed
    }

    /// Byte offset of an entry.
    pub fn offset(&self, id: EntryId) -> Option<usize> {
        self.index.iter().find(|(e, _)| *e == id).map(|(_, off)| *off)
    }

    /// Offset just past the entry starting at `offset`.
    pub fn next(&self, offset: usize) -> usize {
        next(&self.bytes, offset)
    }

    /// Decoded text of an entry.
    pub fn text(&self, id: EntryId) -> Option<String> {
        let offset = self.offset(id)?;
        Some(decode(&self.bytes, offset).map(char::from).collect())
    }

    /// Storage-order index of the first entry matching `candidate`.
    pub fn scan(&self, candidate: &str) -> Option<usize> {
        scan(&self.bytes, candidate.as_bytes())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
