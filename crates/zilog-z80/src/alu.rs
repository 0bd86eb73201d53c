//! Z80 arithmetic and logic, returning the result together with its flags.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

/// Result of an 8-bit ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// ADD/ADC
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u16::from(carry);
    let sum = u16::from(a) + u16::from(b) + c;
    let value = sum as u8;
    let mut flags = sz53(value);
    if (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F {
        flags |= HF;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if sum > 0xFF {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// SUB/SBC
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u16::from(carry);
    let value = u16::from(a).wrapping_sub(u16::from(b)).wrapping_sub(c) as u8;
    let mut flags = sz53(value) | NF;
    if u16::from(a & 0x0F) < u16::from(b & 0x0F) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + c {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// CP leaves A untouched; bits 5 and 3 come from the operand.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let r = sub8(a, b, false);
    AluResult {
        value: a,
        flags: (r.flags & !(YF | XF)) | (b & (YF | XF)),
    }
}

#[must_use]
pub const fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult { value, flags: sz53p(value) | HF }
}

#[must_use]
pub const fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult { value, flags: sz53p(value) }
}

#[must_use]
pub const fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult { value, flags: sz53p(value) }
}

/// INC r. Carry is not affected, so the caller merges the old CF.
#[must_use]
pub const fn inc8(v: u8) -> AluResult {
    let value = v.wrapping_add(1);
    let mut flags = sz53(value);
    if v & 0x0F == 0x0F {
        flags |= HF;
    }
    if v == 0x7F {
        flags |= PF;
    }
    AluResult { value, flags }
}

/// DEC r. Carry is not affected, so the caller merges the old CF.
#[must_use]
pub const fn dec8(v: u8) -> AluResult {
    let value = v.wrapping_sub(1);
    let mut flags = sz53(value) | NF;
    if v & 0x0F == 0 {
        flags |= HF;
    }
    if v == 0x80 {
        flags |= PF;
    }
    AluResult { value, flags }
}

/// CB-prefixed rotate and shift group, selected by bits 5-3 of the opcode.
#[must_use]
pub const fn shift(op: u8, v: u8, carry: bool) -> AluResult {
    let c = carry as u8;
    let (value, out) = match op & 7 {
        0 => (v.rotate_left(1), v >> 7),
        1 => (v.rotate_right(1), v & 1),
        2 => ((v << 1) | c, v >> 7),
        3 => ((v >> 1) | (c << 7), v & 1),
        4 => (v << 1, v >> 7),
        5 => ((v >> 1) | (v & 0x80), v & 1),
        6 => ((v << 1) | 1, v >> 7),
        _ => (v >> 1, v & 1),
    };
    AluResult { value, flags: sz53p(value) | out }
}

/// ADD HL,rr. Only H, N, C and the undocumented bits change.
#[must_use]
pub fn add16(a: u16, b: u16, flags: u8) -> (u16, u8) {
    let sum = u32::from(a) + u32::from(b);
    let value = sum as u16;
    let mut f = (flags & (SF | ZF | PF)) | ((value >> 8) as u8 & (YF | XF));
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        f |= HF;
    }
    if sum > 0xFFFF {
        f |= CF;
    }
    (value, f)
}

/// ADC HL,rr
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u32::from(carry);
    let sum = u32::from(a) + u32::from(b) + c;
    let value = sum as u16;
    let mut f = flags16(value);
    if u32::from(a & 0x0FFF) + u32::from(b & 0x0FFF) + c > 0x0FFF {
        f |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0 {
        f |= PF;
    }
    if sum > 0xFFFF {
        f |= CF;
    }
    (value, f)
}

/// SBC HL,rr
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u32::from(carry);
    let value = u32::from(a).wrapping_sub(u32::from(b)).wrapping_sub(c) as u16;
    let mut f = flags16(value) | NF;
    if u32::from(a & 0x0FFF) < u32::from(b & 0x0FFF) + c {
        f |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ value) & 0x8000 != 0 {
        f |= PF;
    }
    if u32::from(a) < u32::from(b) + c {
        f |= CF;
    }
    (value, f)
}

fn flags16(value: u16) -> u8 {
    let high = (value >> 8) as u8;
    let mut f = high & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// DAA, given the accumulator and current flags.
#[must_use]
pub const fn daa(a: u8, flags: u8) -> AluResult {
    let subtract = flags & NF != 0;
    let mut carry = flags & CF != 0;
    let mut correction = 0;
    if flags & HF != 0 || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }
    let value = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    let half = if subtract {
        flags & HF != 0 && a & 0x0F < 6
    } else {
        a & 0x0F > 9
    };
    let mut f = sz53p(value) | (flags & NF);
    if half {
        f |= HF;
    }
    if carry {
        f |= CF;
    }
    AluResult { value, flags: f }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sets_overflow_on_sign_change() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_ne!(r.flags & PF, 0);
        assert_ne!(r.flags & HF, 0);
        assert_ne!(r.flags & SF, 0);
        assert_eq!(r.flags & CF, 0);
    }

    #[test]
    fn sub_borrows_into_carry() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_ne!(r.flags & CF, 0);
        assert_ne!(r.flags & NF, 0);
    }

    #[test]
    fn cp_keeps_accumulator() {
        let r = cp8(0x42, 0x42);
        assert_eq!(r.value, 0x42);
        assert_ne!(r.flags & ZF, 0);
    }

    #[test]
    fn daa_corrects_bcd_addition() {
        // 0x19 + 0x28 = 0x41, adjusted to 0x47
        let sum = add8(0x19, 0x28, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x47);
    }

    #[test]
    fn sbc16_sets_zero_on_equal_operands() {
        let (value, f) = sbc16(0x1234, 0x1234, false);
        assert_eq!(value, 0);
        assert_ne!(f & ZF, 0);
        assert_eq!(f & CF, 0);
    }

    #[test]
    fn srl_moves_bit_zero_into_carry() {
        let r = shift(7, 0x81, false);
        assert_eq!(r.value, 0x40);
        assert_eq!(r.flags & CF, CF);
    }
}
