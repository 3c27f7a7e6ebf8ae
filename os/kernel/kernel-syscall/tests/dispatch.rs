use kernel_alloc::BitmapFrameAlloc;
use kernel_alloc::phys_mapper::HostMemory;
use kernel_info::process::MAX_WRITE_LEN;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sched::{HostCpu, Kernel, Pid, TaskKind, TaskState, USER_COPY_CHUNK};
use kernel_syscall::{Console, NR_SYSCALLS, SYSCALL_ERROR, SyscallContext, SyscallTable, Sysno};
use kernel_vmem::PhysMapper;

type TestKernel = Kernel<HostCpu, HostMemory>;
type Table = SyscallTable<HostCpu, HostMemory, Captured>;

/// ESR of a translation fault from EL0.
const ESR_TRANSLATION: u64 = (0x24 << 26) | 0x07;
const TEXT: u64 = 0x0040_0000;

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    writes: usize,
}

impl Console for Captured {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.writes += 1;
    }
}

extern "C" fn worker(_: u64) {}

fn kernel() -> TestKernel {
    let base = PhysicalAddress::new(0x0040_0000);
    Kernel::new(
        HostCpu::new(),
        BitmapFrameAlloc::new(HostMemory::new(base, 64), base, 64),
    )
}

/// A kernel running a task that has entered user mode.
fn user_task() -> (TestKernel, Pid) {
    let mut k = kernel();
    let pid = k
        .create(
            TaskKind::KernelThread {
                entry: worker,
                arg: 0,
            },
            2,
        )
        .unwrap();
    k.schedule();
    if k.cpu_mut().take_fresh_entry() {
        k.schedule_tail();
    }
    assert_eq!(k.current_pid(), pid);
    k.move_to_user_mode(0x0008_0000).unwrap();
    (k, pid)
}

fn poke(k: &TestKernel, va: u64, bytes: &[u8]) {
    let mm = &k.current().mm;
    for (i, b) in bytes.iter().enumerate() {
        let pa = mm.translate(k.mapper(), VirtualAddress::new(va + i as u64)).unwrap();
        unsafe { *k.mapper().phys_to_mut::<u8>(pa) = *b };
    }
}

#[test]
fn numbers_are_fixed() {
    assert_eq!(NR_SYSCALLS, 5);
    assert_eq!(Sysno::try_from(0), Ok(Sysno::Write));
    assert_eq!(Sysno::try_from(4), Ok(Sysno::SetPriority));
    assert_eq!(Sysno::try_from(5), Err(5));
}

#[test]
fn write_prints_the_user_string() {
    let (mut k, _) = user_task();
    k.handle_fault(TEXT, ESR_TRANSLATION).unwrap();
    poke(&k, TEXT, b"hello\0");

    let mut out = Captured::default();
    let table = Table::new();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };
    assert_eq!(table.invoke(&mut cx, Sysno::Write as u64, TEXT), 0);
    assert_eq!(out.bytes, b"hello");
}

#[test]
fn write_streams_the_longest_string_in_chunks() {
    let (mut k, _) = user_task();
    k.handle_fault(TEXT, ESR_TRANSLATION).unwrap();
    let mut text = vec![b'y'; MAX_WRITE_LEN];
    text.push(0);
    poke(&k, TEXT, &text);

    let mut out = Captured::default();
    let table = Table::new();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };
    assert_eq!(table.invoke(&mut cx, Sysno::Write as u64, TEXT), 0);
    assert_eq!(out.bytes, &text[..MAX_WRITE_LEN]);
    assert_eq!(out.writes, MAX_WRITE_LEN.div_ceil(USER_COPY_CHUNK));
}

#[test]
fn write_rejects_unreadable_and_unterminated_strings() {
    let (mut k, _) = user_task();
    k.handle_fault(TEXT, ESR_TRANSLATION).unwrap();
    poke(&k, TEXT, &[b'x'; MAX_WRITE_LEN + 1]);

    let mut out = Captured::default();
    let table = Table::new();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };
    assert_eq!(table.invoke(&mut cx, Sysno::Write as u64, TEXT), SYSCALL_ERROR);
    assert_eq!(table.invoke(&mut cx, Sysno::Write as u64, 0x0090_0000), SYSCALL_ERROR);
    assert!(out.bytes.is_empty());
    assert_eq!(out.writes, 0);
}

#[test]
fn dispatch_uses_x8_and_x0() {
    let (mut k, pid) = user_task();
    let mut out = Captured::default();
    let table = Table::new();
    let mut regs = *k.trap_frame_mut(pid).unwrap();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };

    regs.regs[8] = Sysno::GetPid as u64;
    table.dispatch(&mut cx, &mut regs);
    assert_eq!(regs.regs[0], u64::from(pid.as_u32()));

    regs.regs[8] = 77;
    table.dispatch(&mut cx, &mut regs);
    assert_eq!(regs.regs[0], SYSCALL_ERROR);
}

#[test]
fn fork_returns_the_child_pid() {
    let (mut k, parent) = user_task();
    let mut out = Captured::default();
    let table = Table::new();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };
    let child = table.invoke(&mut cx, Sysno::Fork as u64, 0);
    assert_ne!(child, SYSCALL_ERROR);

    let child = Pid::new(u32::try_from(child).unwrap());
    assert_ne!(child, parent);
    assert_eq!(k.task(child).unwrap().priority, 2);
    assert_eq!(k.trap_frame_mut(child).unwrap().regs[0], 0);
}

#[test]
fn set_priority_and_exit_forward_to_the_scheduler() {
    let (mut k, pid) = user_task();
    let mut out = Captured::default();
    let table = Table::new();
    let mut cx = SyscallContext {
        kernel: &mut k,
        console: &mut out,
    };
    table.invoke(&mut cx, Sysno::SetPriority as u64, 9);
    table.invoke(&mut cx, Sysno::SetPriority as u64, 0);
    assert_eq!(cx.kernel.current().priority, 9);

    table.invoke(&mut cx, Sysno::Exit as u64, 0);
    assert_ne!(k.current_pid(), pid);
    assert_eq!(k.task(pid).unwrap().state, TaskState::Zombie);
}
