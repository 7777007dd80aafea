use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// Identifies a [`Srcfile`] owned by a [`SrcManager`](crate::SrcManager).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct SrcfileId(pub(crate) u32);

impl SrcfileId {
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A `(line, column)` pair, both 1-based, the way diagnostics print them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// One source file, owned for the lifetime of the compilation.
///
/// `contents` never changes after [`Srcfile::new`] returns. Line-start
/// offsets are computed on first use and cached, since most files are never
/// the subject of a diagnostic and the scan would otherwise be wasted work.
pub struct Srcfile {
    path: PathBuf,
    contents: String,
    line_starts: OnceCell<Vec<u32>>,
}

impl Srcfile {
    #[must_use]
    pub fn new(path: PathBuf, contents: String) -> Self {
        Self {
            path,
            contents,
            line_starts: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.contents.as_bytes()
    }

    fn line_starts(&self) -> &[u32] {
        self.line_starts.get_or_init(|| {
            let mut starts = vec![0u32];
            for (i, b) in self.contents.bytes().enumerate() {
                if b == b'\n' {
                    starts.push((i + 1) as u32);
                }
            }
            starts
        })
    }

    /// Converts a byte offset into a 1-based `(line, column)` pair. Tab
    /// characters count as four display columns, matching the rendering
    /// rule the diagnostic engine uses for caret alignment.
    #[must_use]
    pub fn line_col(&self, offset: u32) -> LineCol {
        let starts = self.line_starts();
        let line_idx = match starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = starts[line_idx];
        let mut col: u32 = 1;
        for &b in &self.bytes()[line_start as usize..offset as usize] {
            col += if b == b'\t' { 4 } else { 1 };
        }
        LineCol {
            line: (line_idx + 1) as u32,
            col,
        }
    }

    /// Byte range of the line containing `offset`, excluding the trailing
    /// newline.
    #[must_use]
    pub fn line_span(&self, offset: u32) -> (u32, u32) {
        let starts = self.line_starts();
        let line_idx = match starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = starts[line_idx];
        let end = starts
            .get(line_idx + 1)
            .map_or(self.contents.len() as u32, |&next| {
                let mut e = next;
                while e > start && matches!(self.bytes().get(e as usize - 1), Some(b'\n' | b'\r'))
                {
                    e -= 1;
                }
                e
            });
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_accounts_for_tabs() {
        let f = Srcfile::new(PathBuf::from("t.aria"), "ab\n\tcd".to_string());
        let lc = f.line_col(4); // 'c', right after the tab on line 2
        assert_eq!(lc.line, 2);
        assert_eq!(lc.col, 5);
    }

    #[test]
    fn line_span_excludes_newline() {
        let f = Srcfile::new(PathBuf::from("t.aria"), "one\ntwo\nthree".to_string());
        assert_eq!(f.line_span(0), (0, 3));
        assert_eq!(f.line_span(5), (4, 7));
        assert_eq!(f.line_span(10), (8, 13));
    }
}
