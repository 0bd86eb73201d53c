//! Reach counting and verification.

mod common;

use common::{HELLO_WORLD, Machine, hello_world, write_ports};
use z80_watcher::{Error, ExpectationError};

#[test]
fn can_set_and_verify_expectations() {
    let mut machine = Machine::new();
    let watcher = &mut machine.watcher;
    watcher
        .before_fetching_instruction_at("CHPUT")
        .unwrap()
        .expected_exactly(HELLO_WORLD.len() as u64)
        .execute_ret();
    watcher
        .before_fetching_instruction_at("LOOP")
        .unwrap()
        .expected_at_least(1);
    watcher
        .before_fetching_instruction_at(0xFFFF)
        .unwrap()
        .not_expected();

    machine.execute(&hello_world()).unwrap();

    machine.watcher.verify_all_expectations().unwrap();
}

#[test]
fn unmet_expectations_are_reported() {
    let mut machine = Machine::new();
    machine
        .watcher
        .before_fetching_instruction_at("CHPUT")
        .unwrap()
        .expected_between(100, 200)
        .execute_ret();

    machine.execute(&hello_world()).unwrap();

    let Err(Error::Expectation(failure)) = machine.watcher.verify_all_expectations() else {
        panic!("expectation should have failed");
    };
    assert_eq!(failure.min, 100);
    assert_eq!(failure.max, Some(200));
    assert_eq!(failure.actual, HELLO_WORLD.len() as u64);
    assert_eq!(failure.watch_name, "BeforeInstructionFetch");
}

#[test]
fn named_watches_report_their_name() {
    let mut machine = Machine::new();
    machine
        .watcher
        .before_fetching_instruction_at("CHPUT")
        .unwrap()
        .not_expected()
        .execute_ret()
        .named("BeforeCHPUT");

    machine.execute(&hello_world()).unwrap();

    let err = machine.watcher.verify_all_expectations().unwrap_err();
    assert!(matches!(&err, Error::Expectation(e) if e.watch_name == "BeforeCHPUT"));
    assert_eq!(
        err.to_string(),
        "Expectation failed for watch \"BeforeCHPUT\": expected no reaches, but got 13."
    );
}

#[test]
fn exact_count_mismatch_reports_both_bounds() {
    let mut machine = Machine::new();
    machine
        .watcher
        .before_writing_port_where(|ctx| Ok(ctx.address() >= 12))
        .unwrap()
        .expected_exactly(3);

    machine.execute(&write_ports()).unwrap();

    let err = machine.watcher.verify_all_expectations().unwrap_err();
    let Error::Expectation(failure) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        failure,
        ExpectationError {
            watch_name: "BeforePortWrite".to_owned(),
            min: 3,
            max: Some(3),
            actual: 2,
        }
    );
}

#[test]
fn last_bound_setting_wins() {
    let mut machine = Machine::new();
    machine
        .watcher
        .after_writing_port()
        .unwrap()
        .not_expected()
        .expected_at_most(4)
        .expected();

    machine.execute(&write_ports()).unwrap();

    machine.watcher.verify_all_expectations().unwrap();
}

#[test]
fn failures_are_listed_in_registration_order() {
    let mut machine = Machine::new();
    let watcher = &mut machine.watcher;
    watcher.before_writing_port().unwrap().expected_at_most(1).named("first");
    watcher.before_writing_port().unwrap().expected_at_least(2).named("fine");
    watcher.after_writing_port().unwrap().expected_exactly(5).named("second");
    watcher.before_executing_at(0x0000).unwrap().expected().named("third");

    machine.execute(&write_ports()).unwrap();

    let failures = machine.watcher.expectation_failures().unwrap();
    let names: Vec<_> = failures.iter().map(|f| f.watch_name.as_str()).collect();
    // Categories are checked in a fixed order: execution before ports.
    assert_eq!(names, ["third", "first", "second"]);
    assert_eq!(
        failures[1].to_string(),
        "Expectation failed for watch \"first\": expected at most 1 reaches, but got 4."
    );
    assert_eq!(failures[0].actual, 0);
}

#[test]
fn unconfigured_watches_never_fail() {
    let mut machine = Machine::new();
    machine.watcher.before_executing().unwrap();
    machine.watcher.after_reading_memory_at(0xFFFF).unwrap();

    machine.execute(&write_ports()).unwrap();

    machine.watcher.verify_all_expectations().unwrap();
    assert!(machine.watcher.expectation_failures().unwrap().is_empty());
}

#[test]
fn counts_can_be_reset_between_runs() {
    let mut machine = Machine::new();
    let id = machine
        .watcher
        .after_writing_port()
        .unwrap()
        .expected_exactly(4)
        .id();

    machine.execute(&write_ports()).unwrap();
    machine.watcher.verify_all_expectations().unwrap();
    assert_eq!(machine.watcher.times_reached(id).unwrap(), 4);

    machine.watcher.reset_all_reach_counts().unwrap();
    assert_eq!(machine.watcher.times_reached(id).unwrap(), 0);

    machine.execute(&write_ports()).unwrap();
    machine.watcher.verify_all_expectations().unwrap();
    assert_eq!(machine.watcher.times_reached(id).unwrap(), 4);
}

#[test]
fn reach_count_equals_matches_regardless_of_callbacks() {
    let mut machine = Machine::new();
    let bare = machine.watcher.before_writing_port().unwrap().id();
    let busy = machine
        .watcher
        .before_writing_port()
        .unwrap()
        .run(|_| Ok(()))
        .run(|_| Ok(()))
        .run(|_| Ok(()))
        .id();

    machine.execute(&write_ports()).unwrap();

    assert_eq!(machine.watcher.times_reached(bare).unwrap(), 4);
    assert_eq!(machine.watcher.times_reached(busy).unwrap(), 4);
}
