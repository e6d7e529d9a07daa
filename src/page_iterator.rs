//! Turns an [`ImageSource`] into a sequence of overlapping pages.
//!
//! For byte-addressed sources (`Raw`, `E01`) each page is `pagesize` bytes
//! plus up to `margin` bytes of overlap borrowed from what follows, so a
//! scanner walking a page's content can still see the start of an artifact
//! that straddles the page boundary. The `Directory` source ignores
//! pagesize/margin entirely — each file is already a complete unit and
//! becomes exactly one page.
//!
//! This is a real `Iterator`, not a callback-driven walk, so the producer
//! side of the pipeline is just `par_bridge()` over it (see
//! [`crate::scanner::registry`]).

use crate::error::Result;
use crate::image_source::ImageSource;
use crate::page_buffer::PageBuffer;
use crate::pos0::Pos0;

pub struct PageIterator {
    source: ImageSource,
    path_label: Option<String>,
    pagesize: usize,
    margin: usize,
    cursor: u64,
    file_index: u64,
    done: bool,
}

impl PageIterator {
    #[must_use]
    pub fn new(source: ImageSource, path_label: Option<String>, pagesize: usize, margin: usize) -> Self {
        Self { source, path_label, pagesize, margin, cursor: 0, file_index: 0, done: false }
    }

    #[must_use]
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    fn next_directory(&mut self) -> Option<Result<PageBuffer>> {
        let ImageSource::Directory(dir) = &self.source else { unreachable!() };
        match dir.sbuf_alloc(self.file_index) {
            Ok(Some(page)) => {
                self.file_index += 1;
                Some(Ok(page))
            }
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn next_byte_addressed(&mut self) -> Option<Result<PageBuffer>> {
        let size = self.source.size();
        if self.cursor >= size {
            return None;
        }
        let remaining = (size - self.cursor) as usize;
        let want = (self.pagesize + self.margin).min(remaining);
        let mut buf = vec![0u8; want];

        let read = match &mut self.source {
            ImageSource::Raw(r) => r.pread(&mut buf, self.cursor),
            ImageSource::E01(e) => e.pread(&mut buf, self.cursor),
            ImageSource::Directory(_) => unreachable!(),
        };

        match read {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                let page_pagesize = self.pagesize.min(n);
                let pos0 = match &self.path_label {
                    Some(p) => Pos0::with_path(p.clone(), self.cursor),
                    None => Pos0::new(self.cursor),
                };
                self.cursor += page_pagesize as u64;
                Some(Ok(PageBuffer::from_owned(pos0, buf, page_pagesize)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Iterator for PageIterator {
    type Item = Result<PageBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match &self.source {
            ImageSource::Directory(_) => self.next_directory(),
            ImageSource::Raw(_) | ImageSource::E01(_) => self.next_byte_addressed(),
        }
    }
}
