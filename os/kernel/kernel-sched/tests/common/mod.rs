#![allow(dead_code)]

use kernel_alloc::BitmapFrameAlloc;
use kernel_alloc::phys_mapper::HostMemory;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sched::{HostCpu, Kernel, Pid, TaskKind};
use kernel_vmem::PhysMapper;

pub type TestKernel = Kernel<HostCpu, HostMemory>;

pub const RAM_BASE: u64 = 0x0040_0000;

pub fn kernel(frames: usize) -> TestKernel {
    let base = PhysicalAddress::new(RAM_BASE);
    Kernel::new(
        HostCpu::new(),
        BitmapFrameAlloc::new(HostMemory::new(base, frames), base, frames),
    )
}

pub extern "C" fn worker(_arg: u64) {}

pub fn spawn(k: &mut TestKernel, priority: i64) -> Pid {
    k.create(
        TaskKind::KernelThread {
            entry: worker,
            arg: 0,
        },
        priority,
    )
    .unwrap()
}

/// Drop the creation hold the way the return trampoline would.
pub fn settle(k: &mut TestKernel) {
    if k.cpu_mut().take_fresh_entry() {
        k.schedule_tail();
    }
}

/// One timer interrupt, followed by the first-run path of a new task.
pub fn tick(k: &mut TestKernel) {
    k.tick();
    settle(k);
}

/// Switch to `pid` by yielding until it runs.
pub fn run_until(k: &mut TestKernel, pid: Pid) {
    for _ in 0..64 {
        if k.current_pid() == pid {
            return;
        }
        k.schedule();
        settle(k);
    }
    panic!("{pid} never scheduled");
}

pub fn write_user(k: &TestKernel, pid: Pid, va: VirtualAddress, bytes: &[u8]) {
    let mm = &k.task(pid).unwrap().mm;
    for (i, b) in bytes.iter().enumerate() {
        let pa = mm.translate(k.mapper(), va + i as u64).unwrap();
        unsafe { *k.mapper().phys_to_mut::<u8>(pa) = *b };
    }
}

pub fn read_user(k: &TestKernel, pid: Pid, va: VirtualAddress, len: usize) -> Vec<u8> {
    let mm = &k.task(pid).unwrap().mm;
    (0..len)
        .map(|i| {
            let pa = mm.translate(k.mapper(), va + i as u64).unwrap();
            unsafe { *k.mapper().phys_to_mut::<u8>(pa) }
        })
        .collect()
}
