//! Rendered pages and their terminal layout.

pub mod flow;

use std::path::{Path, PathBuf};

use marginalia_core::{html, Document, NodeId};

pub use flow::{Emphasis, Flow, Mark, OnScreen, Segment, SegmentKind};

/// One HTML page: the parsed tree and its current flow.
#[derive(Debug)]
pub struct Page {
    pub path: PathBuf,
    /// Page identity in the comment store.
    pub key: String,
    pub title: String,
    pub doc: Document,
    pub root: NodeId,
    pub flow: Flow,
}

impl Page {
    /// Reads and parses `path`. The store key is the path as given.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let doc = read(path)?;
        let root = doc.root();
        Ok(Self {
            path: path.to_owned(),
            key: path.to_string_lossy().into_owned(),
            title: title_of(&doc, path),
            flow: Flow::new(&doc, root, 80),
            doc,
            root,
        })
    }

    /// Re-reads the file, replacing the tree. Markers from the old tree are
    /// gone; the next highlight sync places them again.
    pub fn reload(&mut self) -> std::io::Result<()> {
        let doc = read(&self.path)?;
        self.root = doc.root();
        self.title = title_of(&doc, &self.path);
        self.doc = doc;
        self.reflow();
        Ok(())
    }

    /// Rebuilds the flow at its current width.
    pub fn reflow(&mut self) {
        self.flow = Flow::new(&self.doc, self.root, self.flow.width());
    }

    /// Rebuilds the flow at `width`. Returns `false` if nothing changed.
    pub fn set_width(&mut self, width: usize) -> bool {
        if width == self.flow.width() {
            return false;
        }
        self.flow = Flow::new(&self.doc, self.root, width);
        true
    }
}

fn read(path: &Path) -> std::io::Result<Document> {
    let source = std::fs::read_to_string(path)?;
    html::parse(&source).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        )
    })
}

/// First `h1`, else the file stem.
fn title_of(doc: &Document, path: &Path) -> String {
    doc.descendants(doc.root())
        .find(|n| doc.tag(*n) == Some("h1"))
        .map(|h| doc.text_content(h).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_page(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_titles_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_page(dir.path(), "intro.html", "<h1> Getting   started </h1><p>hi</p>");
        let mut page = Page::load(&path).unwrap();
        assert_eq!(page.title, "Getting started");
        assert_eq!(page.key, path.to_string_lossy());

        page.set_width(30);
        write_page(dir.path(), "intro.html", "<p>no heading now</p>");
        page.reload().unwrap();
        assert_eq!(page.title, "intro");
        assert_eq!(page.flow.width(), 30);
        assert_eq!(page.flow.line_count(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Page::load(&dir.path().join("gone.html")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
