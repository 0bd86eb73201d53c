//! Shared programs and a small machine for the watcher tests.
//!
//! Programs are hand-assembled and loaded at 0x0100. They end with a RET
//! on an empty stack, which stops the run.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use emu_core::{Bus, Cpu, IoBus, SimpleBus, StopReason};
use z80_watcher::{EventContext, EventDetail, WatchExecutionError, Z80Watcher};
use zilog_z80::Z80;

pub const PROGRAM_ADDRESS: u16 = 0x0100;

pub const HELLO_WORLD: &str = "Hello, world!";

/// Machine code plus the symbols its assembler would have produced.
pub struct Program {
    pub code: Vec<u8>,
    pub symbols: Vec<(&'static str, u16)>,
}

/// Prints a zero-terminated string through CHPUT.
pub fn hello_world() -> Program {
    let mut code = vec![
        0x21, 0x0C, 0x01,       //       LD HL, DATA
        0x7E,                   // LOOP: LD A, (HL)
        0xB7,                   //       OR A
        0xC8,                   //       RET Z
        0xCD, 0xA2, 0x00,       //       CALL CHPUT
        0x23,                   //       INC HL
        0x18, 0xF7,             //       JR LOOP
    ];
    code.extend_from_slice(HELLO_WORLD.as_bytes()); // DATA
    code.push(0);
    Program {
        code,
        symbols: vec![("CHPUT", 0x00A2), ("LOOP", 0x0103), ("DATA", 0x010C)],
    }
}

/// Writes 10, 20, 30, 40 over DATA.
pub fn write_memory() -> Program {
    Program {
        code: vec![
            0xDD, 0x21, 0x15, 0x01, //       LD IX, DATA
            0xDD, 0x36, 0x00, 0x0A, //       LD (IX+0), 10
            0xDD, 0x36, 0x01, 0x14, //       LD (IX+1), 20
            0xDD, 0x36, 0x02, 0x1E, //       LD (IX+2), 30
            0xDD, 0x36, 0x03, 0x28, //       LD (IX+3), 40
            0xC9,                   //       RET
            0x01, 0x02, 0x03, 0x04, // DATA: DB 1, 2, 3, 4
        ],
        symbols: vec![("DATA", 0x0115)],
    }
}

/// Copies ports 10 to 13 into DATA.
pub fn read_ports() -> Program {
    Program {
        code: vec![
            0xDD, 0x21, 0x19, 0x01, //       LD IX, DATA
            0xDB, 0x0A,             //       IN A, (10)
            0xDD, 0x77, 0x00,       //       LD (IX+0), A
            0xDB, 0x0B,             //       IN A, (11)
            0xDD, 0x77, 0x01,       //       LD (IX+1), A
            0xDB, 0x0C,             //       IN A, (12)
            0xDD, 0x77, 0x02,       //       LD (IX+2), A
            0xDB, 0x0D,             //       IN A, (13)
            0xDD, 0x77, 0x03,       //       LD (IX+3), A
            0xC9,                   //       RET
            0x00, 0x00, 0x00, 0x00, // DATA: DB 0, 0, 0, 0
        ],
        symbols: vec![("DATA", 0x0119)],
    }
}

/// Writes 1, 2, 3, 4 to ports 10 to 13.
pub fn write_ports() -> Program {
    Program {
        code: vec![
            0x3E, 0x01,             // LD A, 1
            0xD3, 0x0A,             // OUT (10), A
            0x3C,                   // INC A
            0xD3, 0x0B,             // OUT (11), A
            0x3C,                   // INC A
            0xD3, 0x0C,             // OUT (12), A
            0x3C,                   // INC A
            0xD3, 0x0D,             // OUT (13), A
            0xC9,                   // RET
        ],
        symbols: vec![],
    }
}

/// A `SimpleBus` that counts the memory reads reaching it.
#[derive(Default)]
pub struct CountingBus {
    inner: SimpleBus,
    reads: HashMap<u16, u32>,
}

impl CountingBus {
    /// How many times the CPU actually read `address` from memory.
    pub fn reads_of(&self, address: u16) -> u32 {
        self.reads.get(&address).copied().unwrap_or(0)
    }
}

impl Deref for CountingBus {
    type Target = SimpleBus;

    fn deref(&self) -> &SimpleBus {
        &self.inner
    }
}

impl DerefMut for CountingBus {
    fn deref_mut(&mut self) -> &mut SimpleBus {
        &mut self.inner
    }
}

impl Bus for CountingBus {
    fn read(&mut self, address: u16) -> u8 {
        *self.reads.entry(address).or_default() += 1;
        self.inner.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.inner.write(address, value);
    }
}

impl IoBus for CountingBus {
    fn read_io(&mut self, port: u16) -> u8 {
        self.inner.read_io(port)
    }

    fn write_io(&mut self, port: u16, value: u8) {
        self.inner.write_io(port, value);
    }
}

pub struct Machine {
    pub cpu: Z80,
    pub bus: CountingBus,
    pub watcher: Z80Watcher,
}

impl Machine {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            cpu: Z80::new(),
            bus: CountingBus::default(),
            watcher: Z80Watcher::new(),
        }
    }

    /// Load `program` and its symbols, reset the CPU and run to completion.
    pub fn execute(&mut self, program: &Program) -> Result<StopReason, WatchExecutionError> {
        if let Ok(symbols) = self.watcher.symbols_mut() {
            symbols.extend(program.symbols.iter().copied());
        }
        self.bus.load(PROGRAM_ADDRESS, &program.code);
        self.cpu.reset();
        self.cpu.set_pc(PROGRAM_ADDRESS);
        self.cpu.run(&mut self.bus, &mut self.watcher)
    }
}

/// True for addresses inside the `HELLO_WORLD` sized block at DATA.
pub fn is_data_byte<D: EventDetail>(ctx: &EventContext<'_, D>) -> anyhow::Result<bool> {
    let data = ctx.symbols().get("DATA")?;
    let end = data + HELLO_WORLD.len() as u16;
    Ok((data..end).contains(&ctx.address()))
}

/// Byte buffer shared between a test and its callbacks.
pub fn shared_bytes() -> Rc<RefCell<Vec<u8>>> {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn ascii(bytes: &RefCell<Vec<u8>>) -> String {
    String::from_utf8_lossy(&bytes.borrow()).into_owned()
}

/// Count every memory read the watcher sees.
pub fn record_reads(watcher: &mut Z80Watcher) -> Rc<Cell<u32>> {
    let reads = Rc::new(Cell::new(0));
    let counter = Rc::clone(&reads);
    watcher.before_reading_memory().unwrap().run(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    reads
}
