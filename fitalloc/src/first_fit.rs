use alloc::boxed::Box;
use core::ptr::NonNull;

use crate::header::{self, Header};
use crate::mem::{self, ALIGN, FitAlloc, HeapInfo, PAGE_SIZE, PageSource};
use crate::seal::Sealed;

type Link = Option<NonNull<ListNode>>;

/// Header of the first-fit strategy.
///
/// For a free block `next` links the following free block. A live block
/// keeps `next` as `None`.
#[repr(C)]
pub(crate) struct ListNode {
    size: usize,
    next: Link,
}

const _: () = assert!(<ListNode as Header>::SIZE % ALIGN == 0);

unsafe impl Header for ListNode {
    #[inline]
    fn detached(size: usize) -> Self {
        Self { size, next: None }
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.size = size
    }
}

/// First-fit heap over an unordered singly linked free list.
///
/// Freed and donated blocks are pushed at the head, so the scan prefers the
/// most recently released memory. The list always ends in (or contains) a
/// zero-size sentinel that no request can match.
pub struct FirstFit<P: PageSource> {
    source: P,
    head: Link,
    sentinel: NonNull<ListNode>,
    pages: usize,
}

impl<P: PageSource> FirstFit<P> {
    /// Creates an initialized heap drawing its pages from `source`.
    pub fn new(source: P) -> Self {
        let sentinel = NonNull::from(Box::leak(Box::new(ListNode::detached(0))));
        let mut heap = Self {
            source,
            head: None,
            sentinel,
            pages: 0,
        };
        heap.initialize();
        heap
    }

    #[inline]
    fn push(&mut self, mut node: NonNull<ListNode>) {
        let n = unsafe { node.as_mut() };
        debug_assert!(n.next.is_none(), "node is already linked");
        n.next = self.head;
        self.head = Some(node);
    }

    /// Unlinks `node` given its predecessor `prev` (`None` for the head).
    #[inline]
    unsafe fn unlink(&mut self, mut node: NonNull<ListNode>, prev: Link) {
        let n = unsafe { node.as_mut() };
        match prev {
            Some(mut prev) => unsafe { prev.as_mut().next = n.next },
            None => self.head = n.next,
        }
        n.next = None;
    }

    /// Scans in list order for the first block of at least `size` bytes.
    ///
    /// ## Returns
    /// (`block`, `prev`) where `prev` precedes `block` in the list.
    fn first_fit(&self, size: usize) -> Option<(NonNull<ListNode>, Link)> {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let n = unsafe { node.as_ref() };
            if n.size >= size {
                return Some((node, prev));
            }
            prev = cursor;
            cursor = n.next;
        }
        None
    }

    fn donate(&mut self) {
        let page = mem::acquire_page(&mut self.source);
        self.pages += 1;
        let block = unsafe { header::format_page::<ListNode>(page) };

        #[cfg(feature = "tracing")]
        tracing::debug!("[FirstFit]: donated page {:p}, pages {}", page, self.pages);

        self.push(block);
    }
}

impl<P: PageSource> Sealed for FirstFit<P> {}

impl<P: PageSource> FitAlloc for FirstFit<P> {
    const HEADER_SIZE: usize = ListNode::SIZE;

    type Source = P;

    #[inline]
    fn source(&self) -> &P {
        &self.source
    }

    fn initialize(&mut self) {
        unsafe { self.sentinel.write(ListNode::detached(0)) };
        self.head = Some(self.sentinel);

        #[cfg(feature = "tracing")]
        tracing::debug!("[FirstFit]: initialized, pages {}", self.pages);
    }

    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(mem::is_request(size), "request {} out of contract", size);

        let (block, prev) = loop {
            if let Some(found) = self.first_fit(size) {
                break found;
            }
            // any request fits a fresh page, the next scan succeeds
            self.donate();
        };

        unsafe {
            self.unlink(block, prev);
            if let Some(tail) = header::carve(block, size) {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "[FirstFit]: split {:p}, tail {}",
                    block,
                    tail.as_ref().size()
                );
                self.push(tail);
            }
            header::payload(block)
        }
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let block = unsafe { header::from_payload::<ListNode>(ptr) };
        unsafe { (*block.as_ptr()).next = None };
        self.push(block);
    }

    fn finalize(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("[FirstFit]: finalized, pages {}", self.pages);
    }
}

impl<P: PageSource> HeapInfo for FirstFit<P> {
    #[inline]
    fn mapped(&self) -> usize {
        self.pages * PAGE_SIZE
    }

    fn for_each_free(&self, f: &mut dyn FnMut(usize)) {
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let n = unsafe { node.as_ref() };
            if node != self.sentinel {
                f(n.size);
            }
            cursor = n.next;
        }
    }
}

impl<P: PageSource> Drop for FirstFit<P> {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.sentinel.as_ptr()) });
    }
}

impl<P: PageSource> core::fmt::Debug for FirstFit<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FirstFit")
            .field("pages", &self.pages)
            .field("free_blocks", &self.free_blocks())
            .finish()
    }
}
