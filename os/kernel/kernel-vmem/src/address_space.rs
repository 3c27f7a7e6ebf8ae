//! # Address Space (AArch64, `TTBR0_EL1`-rooted)
//!
//! The per-task memory descriptor: the root of a lazily built four-level
//! table tree plus the bookkeeping needed to copy and tear it down.
//!
//! ## Highlights
//!
//! - [`ensure_next_level`] installs a missing intermediate table.
//! - [`AddressSpace::map`] installs one user page and records it.
//! - [`AddressSpace::map_guard`] installs an EL1-only leaf at physical 0 so
//!   that user accesses fault deterministically.
//! - [`AddressSpace::translate`] and [`AddressSpace::check_access`] walk without
//!   allocating; `check_access` also applies the permission check an access would.
//! - [`AddressSpace::release`] returns every owned frame to the allocator.
//!
//! ## Design
//!
//! - Tables are reached through a [`PhysMapper`]; `unsafe` is confined to
//!   turning a table frame into a `&mut PageTable`.
//! - Every table frame created for this space (root included) is recorded.
//!   Capacity is checked before the first frame is allocated, so a mapping
//!   either completes or leaves the bookkeeping as it was.
//! - Modifying the tables of the *active* space requires TLB maintenance by
//!   the caller. Installing into a previously invalid slot needs none, since
//!   invalid entries are never cached.

mod bounded;

pub use crate::address_space::bounded::{BoundedVec, CapacityError};
use crate::descriptor::{Descriptor, DescriptorKind};
use crate::fault_status::{Access, FaultStatus};
use crate::page_table::{PageTable, TableLevel};
use crate::{FrameAlloc, FreeError, PhysMapper, table_mut};
use kernel_info::process::{MAX_GUARD_PAGES, MAX_PROCESS_PAGES, MAX_TABLE_PAGES};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use log::trace;

/// A user page owned by an address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UserPage {
    pub virt: VirtualPage<Size4K>,
    pub phys: PhysicalPage<Size4K>,
}

/// Error returned by [`AddressSpace::map`], [`AddressSpace::map_guard`] and
/// [`ensure_next_level`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("out of memory allocating a {0:?} table")]
    OutOfMemory(TableLevel),
    #[error("user page quota exhausted")]
    UserPageQuota,
    #[error("table page quota exhausted")]
    TablePageQuota,
    #[error("guard page quota exhausted")]
    GuardPageQuota,
    #[error("{0} is not a user-space address")]
    NotUserAddress(VirtualAddress),
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("unsupported descriptor in a {0:?} table")]
    UnsupportedDescriptor(TableLevel),
}

impl MapError {
    /// `true` if the request failed for lack of frames or bookkeeping room.
    #[must_use]
    pub const fn is_exhaustion(self) -> bool {
        matches!(
            self,
            Self::OutOfMemory(_) | Self::UserPageQuota | Self::TablePageQuota | Self::GuardPageQuota
        )
    }
}

/// Look up the slot `va` selects in `table` (a table of `level`) and return
/// the next-level table it points to, allocating and linking one if the slot
/// is empty. The flag reports whether a table was created.
///
/// # Errors
/// - [`MapError::OutOfMemory`] if a new table was needed and none is left.
/// - [`MapError::UnsupportedDescriptor`] if the slot holds a block mapping.
pub fn ensure_next_level<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
    table: PhysicalPage<Size4K>,
    level: TableLevel,
    va: VirtualAddress,
) -> Result<(PhysicalPage<Size4K>, bool), MapError> {
    let Some(next_level) = level.next() else {
        return Err(MapError::UnsupportedDescriptor(level));
    };
    let index = level.index_of(va);
    let tbl = unsafe { table_mut(mapper, table) };
    match tbl.get(index).kind(level) {
        DescriptorKind::Table(next) => Ok((next, false)),
        DescriptorKind::Invalid => {
            let next = alloc.alloc_4k().ok_or(MapError::OutOfMemory(next_level))?;
            unsafe { table_mut(mapper, next) }.zero();
            tbl.set(index, Descriptor::table(next));
            Ok((next, true))
        }
        DescriptorKind::Page(..) | DescriptorKind::Unsupported => {
            Err(MapError::UnsupportedDescriptor(level))
        }
    }
}

/// Memory descriptor of one task.
pub struct AddressSpace {
    root: Option<PhysicalPage<Size4K>>,
    user_pages: BoundedVec<UserPage, MAX_PROCESS_PAGES>,
    table_pages: BoundedVec<PhysicalPage<Size4K>, MAX_TABLE_PAGES>,
    guard_pages: BoundedVec<VirtualPage<Size4K>, MAX_GUARD_PAGES>,
}

impl AddressSpace {
    /// An empty space. The root table is allocated on first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            user_pages: BoundedVec::new(),
            table_pages: BoundedVec::new(),
            guard_pages: BoundedVec::new(),
        }
    }

    /// Physical page of the root table, if one has been allocated.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> Option<PhysicalPage<Size4K>> {
        self.root
    }

    pub fn user_pages(&self) -> impl Iterator<Item = UserPage> + '_ {
        self.user_pages.iter()
    }

    pub fn guard_pages(&self) -> impl Iterator<Item = VirtualPage<Size4K>> + '_ {
        self.guard_pages.iter()
    }

    pub fn table_pages(&self) -> impl Iterator<Item = PhysicalPage<Size4K>> + '_ {
        self.table_pages.iter()
    }

    #[inline]
    #[must_use]
    pub const fn user_page_count(&self) -> usize {
        self.user_pages.len()
    }

    #[inline]
    #[must_use]
    pub const fn table_page_count(&self) -> usize {
        self.table_pages.len()
    }

    /// `true` while another user page may be recorded.
    #[inline]
    #[must_use]
    pub const fn has_user_page_capacity(&self) -> bool {
        !self.user_pages.is_full()
    }

    /// `true` if `va` lies in a registered guard page.
    #[must_use]
    pub fn is_guard(&self, va: VirtualAddress) -> bool {
        let page = va.page::<Size4K>();
        self.guard_pages.iter().any(|g| g == page)
    }

    /// Map the 4 KiB page containing `va` to `frame`, read/write for EL0.
    ///
    /// # Errors
    /// - [`MapError::NotUserAddress`] for addresses outside `TTBR0_EL1`.
    /// - [`MapError::UserPageQuota`] / [`MapError::TablePageQuota`] when the
    ///   bookkeeping is full.
    /// - [`MapError::OutOfMemory`] if an intermediate table cannot be allocated.
    /// - [`MapError::AlreadyMapped`] if the leaf slot is in use.
    pub fn map<M: PhysMapper, A: FrameAlloc>(
        &mut self,
        mapper: &M,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
    ) -> Result<(), MapError> {
        if self.user_pages.is_full() {
            return Err(MapError::UserPageQuota);
        }
        self.install_leaf(mapper, alloc, va, Descriptor::user_page(frame))?;
        self.user_pages
            .push(UserPage {
                virt: va.page(),
                phys: frame,
            })
            .map_err(|_| MapError::UserPageQuota)?;
        trace!("mapped {:?} -> {:?}", va.page::<Size4K>(), frame);
        Ok(())
    }

    /// Install a guard leaf for the page containing `va`: physical 0, no
    /// EL0 access.
    ///
    /// # Errors
    /// As [`map`](Self::map), with [`MapError::GuardPageQuota`] in place of the
    /// user page quota.
    pub fn map_guard<M: PhysMapper, A: FrameAlloc>(
        &mut self,
        mapper: &M,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<(), MapError> {
        if self.guard_pages.is_full() {
            return Err(MapError::GuardPageQuota);
        }
        self.install_leaf(mapper, alloc, va, Descriptor::guard())?;
        self.guard_pages
            .push(va.page())
            .map_err(|_| MapError::GuardPageQuota)?;
        trace!("guard at {:?}", va.page::<Size4K>());
        Ok(())
    }

    /// Walk down to the leaf table of `va`, creating tables as needed, and
    /// write `leaf` into its slot.
    fn install_leaf<M: PhysMapper, A: FrameAlloc>(
        &mut self,
        mapper: &M,
        alloc: &mut A,
        va: VirtualAddress,
        leaf: Descriptor,
    ) -> Result<(), MapError> {
        if !va.is_lower_half() {
            return Err(MapError::NotUserAddress(va));
        }
        if self.missing_tables(mapper, va)? > self.table_pages.remaining() {
            return Err(MapError::TablePageQuota);
        }

        let mut table = self.ensure_root(mapper, alloc)?;
        for level in [TableLevel::L0, TableLevel::L1, TableLevel::L2] {
            let (next, created) = ensure_next_level(mapper, alloc, table, level, va)?;
            if created {
                self.record_table(next)?;
            }
            table = next;
        }

        let index = TableLevel::L3.index_of(va);
        let pt = unsafe { table_mut(mapper, table) };
        if pt.get(index).valid() {
            return Err(MapError::AlreadyMapped(va));
        }
        pt.set(index, leaf);
        Ok(())
    }

    fn ensure_root<M: PhysMapper, A: FrameAlloc>(
        &mut self,
        mapper: &M,
        alloc: &mut A,
    ) -> Result<PhysicalPage<Size4K>, MapError> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        let root = alloc.alloc_4k().ok_or(MapError::OutOfMemory(TableLevel::L0))?;
        unsafe { table_mut(mapper, root) }.zero();
        self.record_table(root)?;
        self.root = Some(root);
        Ok(root)
    }

    fn record_table(&mut self, page: PhysicalPage<Size4K>) -> Result<(), MapError> {
        self.table_pages
            .push(page)
            .map_err(|_| MapError::TablePageQuota)
    }

    /// Number of tables a walk to the leaf of `va` would have to create.
    fn missing_tables<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> Result<usize, MapError> {
        let Some(mut table) = self.root else {
            return Ok(TableLevel::WALK.len());
        };
        for (present, level) in [TableLevel::L0, TableLevel::L1, TableLevel::L2].into_iter().enumerate() {
            let tbl = unsafe { table_mut(mapper, table) };
            match tbl.get(level.index_of(va)).kind(level) {
                DescriptorKind::Table(next) => table = next,
                DescriptorKind::Invalid => return Ok(TableLevel::WALK.len() - 1 - present),
                DescriptorKind::Page(..) | DescriptorKind::Unsupported => {
                    return Err(MapError::UnsupportedDescriptor(level));
                }
            }
        }
        Ok(0)
    }

    /// Translate `va` to the physical address its leaf points at.
    #[must_use]
    pub fn translate<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.walk(mapper, va).ok().map(|(frame, _)| frame.join(va.offset::<Size4K>()))
    }

    /// Evaluate `access` at `va` the way the MMU would.
    ///
    /// # Errors
    /// The [`FaultStatus`] the access would raise.
    pub fn check_access<M: PhysMapper>(
        &self,
        mapper: &M,
        va: VirtualAddress,
        access: Access,
    ) -> Result<PhysicalAddress, FaultStatus> {
        if !va.is_lower_half() {
            return Err(FaultStatus::Translation(TableLevel::L0));
        }
        let (frame, descriptor) = self.walk(mapper, va)?;
        if !descriptor.access_flag() {
            return Err(FaultStatus::AccessFlag(TableLevel::L3));
        }
        if !descriptor.access_permissions().permits(access.el0, access.write) {
            return Err(FaultStatus::Permission(TableLevel::L3));
        }
        Ok(frame.join(va.offset::<Size4K>()))
    }

    fn walk<M: PhysMapper>(
        &self,
        mapper: &M,
        va: VirtualAddress,
    ) -> Result<(PhysicalPage<Size4K>, Descriptor), FaultStatus> {
        let mut table = self.root.ok_or(FaultStatus::Translation(TableLevel::L0))?;
        for level in TableLevel::WALK {
            let descriptor = unsafe { table_mut(mapper, table) }.get(level.index_of(va));
            match descriptor.kind(level) {
                DescriptorKind::Invalid => return Err(FaultStatus::Translation(level)),
                DescriptorKind::Table(next) => table = next,
                DescriptorKind::Page(frame, _) => return Ok((frame, descriptor)),
                DescriptorKind::Unsupported => return Err(FaultStatus::Unsupported(level)),
            }
        }
        Err(FaultStatus::Translation(TableLevel::L3))
    }

    /// Return every user frame and table frame to `alloc` and reset the
    /// descriptor to empty. Guard pages own no frame.
    ///
    /// # Errors
    /// The first [`FreeError`] reported; the remaining frames are still freed.
    pub fn release<A: FrameAlloc>(&mut self, alloc: &mut A) -> Result<(), FreeError> {
        let mut result = Ok(());
        self.user_pages.drain_with(|p| {
            if let Err(e) = alloc.free_4k(p.phys) {
                result = result.and(Err(e));
            }
        });
        self.table_pages.drain_with(|t| {
            if let Err(e) = alloc.free_4k(t) {
                result = result.and(Err(e));
            }
        });
        self.guard_pages.drain_with(|_| {});
        self.root = None;
        result
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
