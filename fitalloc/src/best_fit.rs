use core::ptr::NonNull;

mod tree;

pub use self::tree::FreeTree;
use self::tree::TreeNode;

use crate::header::{self, Header};
use crate::mem::{self, FitAlloc, HeapInfo, PAGE_SIZE, PageSource};
use crate::seal::Sealed;

/// Best-fit heap over a size-ordered [`FreeTree`].
///
/// Every request is served from the smallest free block that can hold it.
/// Page donation and splitting behave exactly as in [`FirstFit`](crate::FirstFit).
pub struct BestFit<P: PageSource> {
    source: P,
    tree: FreeTree,
    pages: usize,
}

impl<P: PageSource> BestFit<P> {
    /// Creates an initialized heap drawing its pages from `source`.
    pub fn new(source: P) -> Self {
        let mut heap = Self {
            source,
            tree: FreeTree::new(),
            pages: 0,
        };
        heap.initialize();
        heap
    }

    #[inline]
    pub fn free_tree(&self) -> &FreeTree {
        &self.tree
    }

    fn donate(&mut self) {
        let page = mem::acquire_page(&mut self.source);
        self.pages += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!("[BestFit]: donated page {:p}, pages {}", page, self.pages);

        unsafe {
            let block = header::format_page::<TreeNode>(page);
            self.tree.insert(block);
        }
    }
}

impl<P: PageSource> Sealed for BestFit<P> {}

impl<P: PageSource> FitAlloc for BestFit<P> {
    const HEADER_SIZE: usize = TreeNode::SIZE;

    type Source = P;

    #[inline]
    fn source(&self) -> &P {
        &self.source
    }

    fn initialize(&mut self) {
        self.tree.clear();

        #[cfg(feature = "tracing")]
        tracing::debug!("[BestFit]: initialized, pages {}", self.pages);
    }

    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(mem::is_request(size), "request {} out of contract", size);

        let block = loop {
            if let Some(block) = self.tree.take_best_fit(size) {
                break block;
            }
            self.donate();
        };

        unsafe {
            if let Some(tail) = header::carve(block, size) {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "[BestFit]: split {:p}, tail {}",
                    block,
                    tail.as_ref().size()
                );
                self.tree.insert(tail);
            }
            header::payload(block)
        }
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        unsafe {
            let mut block = header::from_payload::<TreeNode>(ptr);
            block.as_mut().reset();
            self.tree.insert(block);
        }
    }

    fn finalize(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "[BestFit]: finalized, pages {}, tree {:?}",
            self.pages,
            self.tree
        );
    }
}

impl<P: PageSource> HeapInfo for BestFit<P> {
    #[inline]
    fn mapped(&self) -> usize {
        self.pages * PAGE_SIZE
    }

    fn for_each_free(&self, f: &mut dyn FnMut(usize)) {
        self.tree.for_each(f)
    }

    #[inline]
    fn free_blocks(&self) -> usize {
        self.tree.len()
    }
}

impl<P: PageSource> core::fmt::Debug for BestFit<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BestFit")
            .field("pages", &self.pages)
            .field("tree", &self.tree)
            .finish()
    }
}
