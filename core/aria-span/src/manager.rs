use std::path::PathBuf;

use crate::{LineCol, Span, Srcfile, SrcfileId};

/// Owns every [`Srcfile`] for the lifetime of one compilation.
///
/// Srcfiles are appended as input files are read and never removed or
/// mutated afterwards, so a [`SrcfileId`] handed out by [`SrcManager::add`]
/// stays valid for the rest of the run.
#[derive(Default)]
pub struct SrcManager {
    files: Vec<Srcfile>,
}

impl SrcManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf, contents: String) -> SrcfileId {
        let id = SrcfileId(self.files.len() as u32);
        self.files.push(Srcfile::new(path, contents));
        id
    }

    #[must_use]
    pub fn get(&self, id: SrcfileId) -> &Srcfile {
        &self.files[id.0 as usize]
    }

    #[must_use]
    pub fn line_col(&self, span: Span) -> LineCol {
        self.get(span.file).line_col(span.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SrcfileId, &Srcfile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (SrcfileId(i as u32), f))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
