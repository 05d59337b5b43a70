//! Physical address resolution for the sample buffer
//!
//! The sample buffer is virtually contiguous but may be backed by scattered
//! physical pages. Addresses are linear only inside a page.

/// Resolves byte offsets within the sample buffer to bus addresses
pub trait PhysicalMapper: Send + Sync {
    /// Size of one mapping page in bytes
    fn page_size(&self) -> usize;

    /// Mapped buffer length in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bus address of the byte at `offset`, `None` when unmapped
    fn physical_address(&self, offset: usize) -> Option<u32>;
}

/// Single physically contiguous region
#[derive(Debug, Clone)]
pub struct ContiguousMapper {
    base: u32,
    len: usize,
    page_size: usize,
}

impl ContiguousMapper {
    pub fn new(base: u32, len: usize, page_size: usize) -> Self {
        Self {
            base,
            len,
            page_size: page_size.max(1),
        }
    }
}

impl PhysicalMapper for ContiguousMapper {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len(&self) -> usize {
        self.len
    }

    fn physical_address(&self, offset: usize) -> Option<u32> {
        if offset >= self.len {
            return None;
        }
        self.base.checked_add(u32::try_from(offset).ok()?)
    }
}

/// Buffer backed by one physical page per entry; `None` marks a hole
#[derive(Debug, Clone)]
pub struct PagedMapper {
    pages: Vec<Option<u32>>,
    page_size: usize,
}

impl PagedMapper {
    pub fn new(pages: Vec<Option<u32>>, page_size: usize) -> Self {
        Self {
            pages,
            page_size: page_size.max(1),
        }
    }

    /// Pages laid out in reverse physical order starting at `top`,
    /// so that linear extrapolation across a page boundary is always wrong
    pub fn scattered(top: u32, page_count: usize, page_size: usize) -> Self {
        let pages = (0..page_count)
            .map(|i| top.checked_sub((i * page_size) as u32))
            .collect();
        Self::new(pages, page_size)
    }

    /// Punch a hole at page `index`
    pub fn unmap(&mut self, index: usize) {
        if let Some(page) = self.pages.get_mut(index) {
            *page = None;
        }
    }
}

impl PhysicalMapper for PagedMapper {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn len(&self) -> usize {
        self.pages.len() * self.page_size
    }

    fn physical_address(&self, offset: usize) -> Option<u32> {
        let page = (*self.pages.get(offset / self.page_size)?)?;
        page.checked_add((offset % self.page_size) as u32)
    }
}
