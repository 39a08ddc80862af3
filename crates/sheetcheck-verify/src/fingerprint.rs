//! Order-sensitive SHA-256 digest over a whole table.

use sha2::{Digest, Sha256};

pub const CELL_SEPARATOR: &[u8] = b"\x1f";
pub const ROW_TERMINATOR: &[u8] = b"\n";

/// Incremental hasher: feed the header, then rows in order.
///
/// Cells are hashed unescaped, so tables are only distinguishable when no
/// cell contains the `\x1f` separator.
#[derive(Clone, Default)]
pub struct TableHasher {
    hasher: Sha256,
}

impl TableHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row<S: AsRef<str>>(&mut self, cells: &[S]) {
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                self.hasher.update(CELL_SEPARATOR);
            }
            self.hasher.update(cell.as_ref().as_bytes());
        }
        self.hasher.update(ROW_TERMINATOR);
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

pub fn fingerprint_table<S: AsRef<str>>(header: &[S], rows: &[Vec<S>]) -> String {
    let mut hasher = TableHasher::new();
    hasher.push_row(header);
    for row in rows {
        hasher.push_row(row);
    }
    hasher.finish()
}
