mod common;

use common::{kernel, settle, spawn, tick};
use kernel_sched::{Pid, TaskState};

#[test]
fn higher_priority_gets_more_slices() {
    let mut k = kernel(16);
    let low = spawn(&mut k, 1);
    let high = spawn(&mut k, 2);

    let (mut low_slices, mut high_slices) = (0u32, 0u32);
    for _ in 0..4000 {
        tick(&mut k);
        match k.current_pid() {
            pid if pid == low => low_slices += 1,
            pid if pid == high => high_slices += 1,
            _ => {}
        }
    }
    assert!(low_slices > 0);
    assert!(high_slices > low_slices, "high {high_slices}, low {low_slices}");
}

#[test]
fn every_task_runs_eventually() {
    let mut k = kernel(16);
    let pids: Vec<Pid> = (1..=4).map(|p| spawn(&mut k, p)).collect();
    let mut seen = Vec::new();
    for _ in 0..200 {
        tick(&mut k);
        if !seen.contains(&k.current_pid()) {
            seen.push(k.current_pid());
        }
    }
    for pid in pids {
        assert!(seen.contains(&pid), "{pid} starved");
    }
    assert!(seen.contains(&Pid::INIT));
}

#[test]
fn yield_hands_over_and_comes_back() {
    let mut k = kernel(16);
    let a = spawn(&mut k, 1);
    k.schedule();
    settle(&mut k);
    assert_eq!(k.current_pid(), a);

    // a has used its slice; the boot task is refilled and wins the tie
    k.schedule();
    assert_eq!(k.current_pid(), Pid::INIT);
    assert_eq!(k.cpu().switches(), 2);
}

#[test]
fn exit_leaves_a_zombie_that_is_reaped() {
    let mut k = kernel(16);
    let before = k.frames().used_frames();
    let a = spawn(&mut k, 3);
    k.schedule();
    settle(&mut k);
    assert_eq!(k.current_pid(), a);

    k.exit();
    assert_ne!(k.current_pid(), a);
    assert_eq!(k.task(a).unwrap().state, TaskState::Zombie);
    assert_eq!(k.tasks().len(), 2);

    assert_eq!(k.reap_zombies(), Ok(1));
    assert!(k.task(a).is_none());
    assert!(!k.pids().is_allocated(a));
    assert_eq!(k.tasks().len(), 1);
    assert_eq!(k.frames().used_frames(), before);

    // zombies never come back
    for _ in 0..50 {
        tick(&mut k);
        assert_eq!(k.current_pid(), Pid::INIT);
    }
}

#[test]
fn switching_installs_the_incoming_address_space() {
    let mut k = kernel(16);
    let a = spawn(&mut k, 1);
    k.schedule();
    settle(&mut k);
    assert_eq!(k.current_pid(), a);
    assert_eq!(k.cpu().root(), None);

    k.move_to_user_mode(0x1000).unwrap();
    let root = k.current().mm.root();
    assert!(root.is_some());
    assert_eq!(k.cpu().root(), root);

    k.schedule();
    assert_eq!(k.current_pid(), Pid::INIT);
    assert_eq!(k.cpu().root(), None);
}
