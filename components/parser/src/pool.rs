use std::rc::Rc;

use crate::tokenizer::Encoding;

/// An interned, committed pool item. Cloning shares the allocation;
/// the bytes never move for the life of the last handle.
pub(crate) type Name = Rc<str>;

/// Incremental string builder with commit semantics.
///
/// The in-progress item lives in `scratch` (the `start..ptr` region);
/// `finish` commits it as an independently owned [`Name`] and starts
/// the next item, `discard` rewinds. Committed items are immutable and
/// stable regardless of later pool operations.
#[derive(Clone, Debug, Default)]
pub(crate) struct StringPool {
    scratch: String,
}

impl StringPool {
    pub(crate) fn new() -> StringPool {
        StringPool {
            scratch: String::new(),
        }
    }

    /// Converts `start..end` from `enc` and appends it to the
    /// in-progress item.
    pub(crate) fn append(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Result<(), ()> {
        enc.convert(buf, start, end, &mut self.scratch)
    }

    pub(crate) fn append_char(&mut self, c: char) {
        self.scratch.push(c);
    }

    pub(crate) fn append_str(&mut self, s: &str) {
        self.scratch.push_str(s);
    }

    /// The in-progress item.
    pub(crate) fn current(&self) -> &str {
        &self.scratch
    }

    pub(crate) fn len(&self) -> usize {
        self.scratch.len()
    }

    pub(crate) fn last_char(&self) -> Option<char> {
        self.scratch.chars().next_back()
    }

    /// Drops the last character of the in-progress item.
    pub(crate) fn chop(&mut self) {
        self.scratch.pop();
    }

    /// Rewinds the in-progress item.
    pub(crate) fn discard(&mut self) {
        self.scratch.clear();
    }

    /// Commits the in-progress item and starts the next one after it.
    pub(crate) fn finish(&mut self) -> Name {
        let name = Name::from(self.scratch.as_str());
        self.scratch.clear();
        name
    }

    /// Converts and commits `start..end` in one step.
    pub(crate) fn store(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Result<Name, ()> {
        self.append(enc, buf, start, end)?;
        Ok(self.finish())
    }

    /// Commits the in-progress item as an owned string, leaving the
    /// pool empty.
    pub(crate) fn take(&mut self) -> String {
        std::mem::take(&mut self.scratch)
    }

    /// Releases everything, including the scratch allocation.
    pub(crate) fn clear(&mut self) {
        self.scratch = String::new();
    }
}
