//! Memory and I/O bus interface.

/// Memory bus interface.
///
/// Components access memory through this trait. The bus handles address
/// decoding and routing to the appropriate device.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// A bus that also supports a separate I/O port space.
///
/// The Z80 reaches peripherals through IN and OUT instructions, which
/// address a space of their own rather than memory.
pub trait IoBus: Bus {
    /// Read a byte from the given I/O port.
    fn read_io(&mut self, port: u16) -> u8;

    /// Write a byte to the given I/O port.
    fn write_io(&mut self, port: u16, value: u8);
}

/// Flat 64 KiB of RAM plus a 64 KiB port space with no side effects.
///
/// Writes to a port are latched and read back unchanged, which is enough
/// for tests that want to see what a program sent out.
pub struct SimpleBus {
    memory: Box<[u8]>,
    ports: Box<[u8]>,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x1_0000].into_boxed_slice(),
            ports: vec![0; 0x1_0000].into_boxed_slice(),
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at 0xFFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.memory[usize::from(addr)] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    /// Read memory without going through the CPU.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    /// Read `len` consecutive memory bytes starting at `address`.
    #[must_use]
    pub fn peek_range(&self, address: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|offset| self.memory[(usize::from(address) + offset) & 0xFFFF])
            .collect()
    }

    /// Last value latched on a port.
    #[must_use]
    pub fn port(&self, port: u16) -> u8 {
        self.ports[usize::from(port)]
    }

    /// Preset the value a port will return to IN instructions.
    pub fn set_port(&mut self, port: u16, value: u8) {
        self.ports[usize::from(port)] = value;
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[usize::from(address)] = value;
    }
}

impl IoBus for SimpleBus {
    fn read_io(&mut self, port: u16) -> u8 {
        self.ports[usize::from(port)]
    }

    fn write_io(&mut self, port: u16, value: u8) {
        self.ports[usize::from(port)] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_wraps_at_top_of_memory() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFF, &[0xAA, 0xBB]);

        assert_eq!(bus.peek(0xFFFF), 0xAA);
        assert_eq!(bus.peek(0x0000), 0xBB);
        assert_eq!(bus.peek_range(0xFFFF, 2), vec![0xAA, 0xBB]);
    }

    #[test]
    fn ports_are_separate_from_memory() {
        let mut bus = SimpleBus::new();
        bus.write(0x0010, 1);
        bus.write_io(0x0010, 2);

        assert_eq!(bus.read(0x0010), 1);
        assert_eq!(bus.read_io(0x0010), 2);
        assert_eq!(bus.port(0x0010), 2);
    }
}
