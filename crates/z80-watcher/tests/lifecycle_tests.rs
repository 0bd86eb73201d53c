//! Removing watches and disposing of the watcher.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{Machine, hello_world, record_reads};
use emu_core::{CpuEvents, EventFeed};
use z80_watcher::Error;

fn register_printer_and_reader(machine: &mut Machine) -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let printed = Rc::new(Cell::new(0));
    let sink = Rc::clone(&printed);
    machine
        .watcher
        .before_fetching_instruction_at("CHPUT")
        .unwrap()
        .run(move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        })
        .execute_ret();
    let reads = record_reads(&mut machine.watcher);
    (printed, reads)
}

#[test]
fn remove_all_watches_removes_watches() {
    let mut machine = Machine::new();
    let (printed, reads) = register_printer_and_reader(&mut machine);

    machine.watcher.remove_all_watches().unwrap();
    // CHPUT is now a real call; give it a body.
    machine.bus.load(0x00A2, &[0xC9]);
    machine.execute(&hello_world()).unwrap();

    assert_eq!(printed.get(), 0);
    assert_eq!(reads.get(), 0);
}

#[test]
fn watcher_stays_usable_after_removal() {
    let mut machine = Machine::new();
    let _ = register_printer_and_reader(&mut machine);
    machine.watcher.remove_all_watches().unwrap();

    let reads = record_reads(&mut machine.watcher);
    machine.bus.load(0x00A2, &[0xC9]);
    machine.execute(&hello_world()).unwrap();

    assert!(reads.get() > 0);
}

#[test]
fn dispose_removes_watches() {
    let mut machine = Machine::new();
    let (printed, reads) = register_printer_and_reader(&mut machine);

    machine.watcher.dispose();
    machine.bus.load(0x00A2, &[0xC9]);
    machine.execute(&hello_world()).unwrap();

    assert_eq!(printed.get(), 0);
    assert_eq!(reads.get(), 0);
    for feed in EventFeed::ALL {
        assert!(!machine.watcher.is_attached(feed));
    }
}

#[test]
fn after_dispose_all_methods_fail() {
    let mut machine = Machine::new();
    let watcher = &mut machine.watcher;
    watcher.dispose();
    watcher.dispose();

    assert!(matches!(watcher.before_fetching_instruction(), Err(Error::Disposed)));
    assert!(matches!(watcher.before_fetching_instruction_at("CHPUT"), Err(Error::Disposed)));
    assert!(matches!(watcher.before_executing(), Err(Error::Disposed)));
    assert!(matches!(watcher.before_executing_at(0xFFFF), Err(Error::Disposed)));
    assert!(matches!(watcher.after_executing_where(|_| Ok(true)), Err(Error::Disposed)));
    assert!(matches!(watcher.before_reading_memory(), Err(Error::Disposed)));
    assert!(matches!(watcher.before_writing_memory(), Err(Error::Disposed)));
    assert!(matches!(watcher.before_reading_port(), Err(Error::Disposed)));
    assert!(matches!(watcher.before_writing_port(), Err(Error::Disposed)));
    assert!(matches!(watcher.verify_all_expectations(), Err(Error::Disposed)));
    assert!(matches!(watcher.expectation_failures(), Err(Error::Disposed)));
    assert!(matches!(watcher.reset_all_reach_counts(), Err(Error::Disposed)));
    assert!(matches!(watcher.remove_all_watches(), Err(Error::Disposed)));
    assert!(matches!(watcher.symbols(), Err(Error::Disposed)));
    assert_eq!(
        watcher.verify_all_expectations().unwrap_err().to_string(),
        "the watcher has been disposed"
    );
}
