//! Instruction decode/execute.
//!
//! Opcodes are decomposed the standard way (see Young, "Decoding Z80
//! Opcodes"): `x = opcode[7:6]`, `y = opcode[5:3]`, `z = opcode[2:0]`,
//! `p = y[2:1]`, `q = y[0]`. `step()` in `mod.rs` dispatches on `x` for the
//! unprefixed table; this module holds the per-block handlers plus the
//! CB/ED/DD/FD prefix tables.

use super::daa;
use super::flags;
use super::{Cpu, InterruptMode};
use crate::bus::Bus;

/// Which index register (if any) the current instruction indexes through.
/// Plain HL-based instructions use `None`; DD/FD-prefixed instructions
/// substitute IX/IY for HL (and, for `(HL)`-style operands, `(IX+d)`/`(IY+d)`).
#[derive(Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

impl Cpu {
    fn index_reg(&self, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.hl,
            Index::Ix => self.ix,
            Index::Iy => self.iy,
        }
    }

    fn set_index_reg(&mut self, idx: Index, val: u16) {
        match idx {
            Index::Hl => self.hl = val,
            Index::Ix => self.ix = val,
            Index::Iy => self.iy = val,
        }
    }

    /// Effective address for `(HL)` / `(IX+d)` / `(IY+d)`. For indexed forms
    /// this also fetches the displacement byte and updates WZ, matching
    /// real hardware's MEMPTR behavior.
    fn index_addr(&mut self, bus: &mut Bus, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.hl,
            Index::Ix | Index::Iy => {
                let d = self.fetch_byte(bus) as i8 as i16;
                let base = self.index_reg(idx);
                let addr = base.wrapping_add(d as u16);
                self.wz = addr;
                addr
            }
        }
    }

    // ========== x=0 block ==========

    pub(super) fn execute_x0(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => match y {
                0 => { /* NOP */ }
                1 => self.ex_af(),
                2 => {
                    // DJNZ d
                    let b = self.b().wrapping_sub(1);
                    self.set_b(b);
                    let d = self.fetch_byte(bus) as i8 as i16;
                    if b != 0 {
                        self.pc = self.pc.wrapping_add(d as u16);
                        bus.add_cycles(1);
                    }
                }
                3 => {
                    // JR d
                    let d = self.fetch_byte(bus) as i8 as i16;
                    self.pc = self.pc.wrapping_add(d as u16);
                }
                4..=7 => {
                    // JR cc,d
                    let d = self.fetch_byte(bus) as i8 as i16;
                    if self.check_cc(y - 4) {
                        self.pc = self.pc.wrapping_add(d as u16);
                        bus.add_cycles(1);
                    }
                }
                _ => unreachable!(),
            },
            1 => {
                if q == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                } else {
                    // ADD HL,rp
                    let hl = self.hl;
                    let rp = self.get_rp(p);
                    self.wz = hl.wrapping_add(1);
                    self.hl = self.alu_add16(hl, rp);
                }
            }
            2 => match (p, q) {
                (0, 0) => {
                    bus.write_byte(self.bc as u32, self.a);
                    self.wz = (self.bc & 0x00FF) | ((self.a as u16) << 8).wrapping_add(0x0100);
                    self.wz = (self.bc.wrapping_add(1) & 0x00FF) | ((self.a as u16) << 8);
                }
                (0, 1) => {
                    self.a = bus.read_byte(self.bc as u32);
                    self.wz = self.bc.wrapping_add(1);
                }
                (1, 0) => {
                    bus.write_byte(self.de as u32, self.a);
                    self.wz = (self.de.wrapping_add(1) & 0x00FF) | ((self.a as u16) << 8);
                }
                (1, 1) => {
                    self.a = bus.read_byte(self.de as u32);
                    self.wz = self.de.wrapping_add(1);
                }
                (2, 0) => {
                    let nn = self.fetch_word(bus);
                    bus.write_word(nn as u32, self.hl);
                    self.wz = nn.wrapping_add(1);
                }
                (2, 1) => {
                    let nn = self.fetch_word(bus);
                    self.hl = bus.read_word(nn as u32);
                    self.wz = nn.wrapping_add(1);
                }
                (3, 0) => {
                    let nn = self.fetch_word(bus);
                    bus.write_byte(nn as u32, self.a);
                    self.wz = (nn.wrapping_add(1) & 0x00FF) | ((self.a as u16) << 8);
                }
                (3, 1) => {
                    let nn = self.fetch_word(bus);
                    self.a = bus.read_byte(nn as u32);
                    self.wz = nn.wrapping_add(1);
                }
                _ => unreachable!(),
            },
            3 => {
                // INC/DEC rp
                let rp = self.get_rp(p);
                if q == 0 {
                    self.set_rp(p, rp.wrapping_add(1));
                } else {
                    self.set_rp(p, rp.wrapping_sub(1));
                }
            }
            4 => {
                // INC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_inc(val);
                self.set_reg8(y, result, bus);
            }
            5 => {
                // DEC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_dec(val);
                self.set_reg8(y, result, bus);
            }
            6 => {
                // LD r,n
                let n = self.fetch_byte(bus);
                self.set_reg8(y, n, bus);
            }
            7 => match y {
                0 => {
                    // RLCA
                    let c = self.a & 0x80 != 0;
                    self.a = self.a.rotate_left(1);
                    self.f &= !(flags::N | flags::H);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(c);
                }
                1 => {
                    // RRCA
                    let c = self.a & 0x01 != 0;
                    self.a = self.a.rotate_right(1);
                    self.f &= !(flags::N | flags::H);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(c);
                }
                2 => {
                    // RLA
                    let old_c = self.flag_c();
                    let c = self.a & 0x80 != 0;
                    self.a = (self.a << 1) | (old_c as u8);
                    self.f &= !(flags::N | flags::H);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(c);
                }
                3 => {
                    // RRA
                    let old_c = self.flag_c();
                    let c = self.a & 0x01 != 0;
                    self.a = (self.a >> 1) | ((old_c as u8) << 7);
                    self.f &= !(flags::N | flags::H);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(c);
                }
                4 => {
                    // DAA
                    let (a, f) = daa::lookup(self.a, self.f);
                    self.a = a;
                    self.f = f;
                }
                5 => {
                    // CPL
                    self.a = !self.a;
                    self.f |= flags::N | flags::H;
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                }
                6 => {
                    // SCF
                    self.f &= !(flags::N | flags::H);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(true);
                }
                7 => {
                    // CCF
                    let old_c = self.flag_c();
                    self.f &= !flags::N;
                    self.set_flag_h(old_c);
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (self.a & (flags::F3 | flags::F5));
                    self.set_flag_c(!old_c);
                }
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }
    }

    // ========== ALU dispatch (x=2 and x=3,z=6) ==========

    pub(super) fn execute_alu(&mut self, y: u8, val: u8) {
        match y {
            0 => self.a = self.alu_add(val, false),
            1 => self.a = self.alu_add(val, true),
            2 => self.a = self.alu_sub(val, false),
            3 => self.a = self.alu_sub(val, true),
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            7 => {
                let saved = self.a;
                let _ = self.alu_sub(val, false);
                self.a = saved;
            }
            _ => unreachable!(),
        }
    }

    // ========== x=3 block ==========

    pub(super) fn execute_x3(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                // RET cc
                if self.check_cc(y) {
                    self.pc = self.pop_word(bus);
                    self.wz = self.pc;
                    bus.add_cycles(1);
                }
            }
            1 => {
                if q == 0 {
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                } else {
                    match p {
                        0 => {
                            // RET
                            self.pc = self.pop_word(bus);
                            self.wz = self.pc;
                        }
                        1 => self.exx(),
                        2 => self.pc = self.hl, // JP (HL)
                        3 => self.sp = self.hl, // LD SP,HL
                        _ => unreachable!(),
                    }
                }
            }
            2 => {
                // JP cc,nn
                let nn = self.fetch_word(bus);
                self.wz = nn;
                if self.check_cc(y) {
                    self.pc = nn;
                }
            }
            3 => match y {
                0 => {
                    // JP nn
                    let nn = self.fetch_word(bus);
                    self.wz = nn;
                    self.pc = nn;
                }
                1 => self.execute_cb(bus),
                2 => {
                    // OUT (n),A
                    let n = self.fetch_byte(bus);
                    let port = ((self.a as u16) << 8) | (n as u16);
                    bus.port_write(port, self.a);
                    self.wz = (self.bc & 0xFF00) | (n.wrapping_add(1) as u16);
                }
                3 => {
                    // IN A,(n)
                    let n = self.fetch_byte(bus);
                    let port = ((self.a as u16) << 8) | (n as u16);
                    self.a = bus.port_read(port);
                    self.wz = port.wrapping_add(1);
                }
                4 => {
                    // EX (SP),HL
                    let sp_val = bus.read_word(self.sp as u32);
                    bus.write_word(self.sp as u32, self.hl);
                    self.hl = sp_val;
                    self.wz = self.hl;
                }
                5 => self.ex_de_hl(),
                6 => {
                    self.iff1 = false;
                    self.iff2 = false;
                }
                7 => self.request_ei(),
                _ => unreachable!(),
            },
            4 => {
                // CALL cc,nn
                let nn = self.fetch_word(bus);
                self.wz = nn;
                if self.check_cc(y) {
                    bus.add_cycles(1);
                    self.push_word(bus, self.pc);
                    self.pc = nn;
                }
            }
            5 => {
                if q == 0 {
                    let val = self.get_rp2(p);
                    bus.add_cycles(1);
                    self.push_word(bus, val);
                } else {
                    match p {
                        0 => {
                            // CALL nn
                            let nn = self.fetch_word(bus);
                            self.wz = nn;
                            bus.add_cycles(1);
                            self.push_word(bus, self.pc);
                            self.pc = nn;
                        }
                        1 => self.execute_index(bus, Index::Ix),
                        2 => self.execute_ed(bus),
                        3 => self.execute_index(bus, Index::Iy),
                        _ => unreachable!(),
                    }
                }
            }
            6 => {
                // ALU A,n
                let n = self.fetch_byte(bus);
                self.execute_alu(y, n);
            }
            7 => {
                // RST y*8
                bus.add_cycles(1);
                self.push_word(bus, self.pc);
                self.pc = (y as u16) * 8;
                self.wz = self.pc;
            }
            _ => unreachable!(),
        }
    }

    // ========== CB prefix (bit operations) ==========

    pub(super) fn execute_cb(&mut self, bus: &mut Bus) {
        let opcode = self.fetch_opcode(bus);
        self.execute_cb_op(bus, opcode, Index::Hl, None);
    }

    /// Shared CB-table body, reused by the indexed DDCB/FDCB forms where
    /// `idx` selects `(IX+d)`/`(IY+d)` instead of `(HL)` and `reg_copy`, when
    /// present, also writes the result into an 8-bit register (the
    /// undocumented "shift and store" encodings).
    fn execute_cb_op(&mut self, bus: &mut Bus, opcode: u8, idx: Index, reg_copy: Option<u8>) {
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let addr = if idx == Index::Hl { self.hl } else { self.index_reg(idx) };
        let val = if z == 6 || idx != Index::Hl {
            bus.read_byte(addr as u32)
        } else {
            self.get_reg8(z, bus)
        };

        match x {
            0 => {
                // rotate/shift
                let (result, carry) = self.execute_rot(y, val);
                self.f &= !(flags::N | flags::H);
                self.set_sz_flags(result);
                self.set_flag_pv(Self::parity(result));
                self.set_flag_c(carry);
                self.store_cb_result(bus, addr, z, result, idx, reg_copy);
            }
            1 => {
                // BIT y,r
                let bit = val & (1 << y) != 0;
                self.f &= !flags::Z;
                if !bit {
                    self.f |= flags::Z;
                }
                self.set_flag_pv(!bit);
                self.set_flag_s(y == 7 && bit);
                self.set_flag_h(true);
                self.f &= !flags::N;
                // Undocumented F3/F5: for (HL)/(IX+d)/(IY+d) they come from
                // WZ's high byte; for plain registers, from the value tested.
                if idx != Index::Hl || z == 6 {
                    self.f = (self.f & !(flags::F3 | flags::F5))
                        | ((self.wz >> 8) as u8 & (flags::F3 | flags::F5));
                } else {
                    self.f = (self.f & !(flags::F3 | flags::F5)) | (val & (flags::F3 | flags::F5));
                }
            }
            2 => {
                // RES y,r
                let result = val & !(1 << y);
                self.store_cb_result(bus, addr, z, result, idx, reg_copy);
            }
            3 => {
                // SET y,r
                let result = val | (1 << y);
                self.store_cb_result(bus, addr, z, result, idx, reg_copy);
            }
            _ => unreachable!(),
        }
    }

    fn store_cb_result(
        &mut self,
        bus: &mut Bus,
        addr: u16,
        z: u8,
        result: u8,
        idx: Index,
        reg_copy: Option<u8>,
    ) {
        if idx != Index::Hl {
            bus.write_byte(addr as u32, result);
            if let Some(reg) = reg_copy {
                self.set_reg8(reg, result, bus);
            }
        } else if z == 6 {
            bus.write_byte(addr as u32, result);
        } else {
            self.set_reg8(z, result, bus);
        }
    }

    /// Rotate/shift dispatch for the CB x=0 block. Returns `(result, carry_out)`.
    fn execute_rot(&self, y: u8, val: u8) -> (u8, bool) {
        match y {
            0 => (val.rotate_left(1), val & 0x80 != 0), // RLC
            1 => (val.rotate_right(1), val & 0x01 != 0), // RRC
            2 => {
                // RL
                let c = self.flag_c() as u8;
                ((val << 1) | c, val & 0x80 != 0)
            }
            3 => {
                // RR
                let c = self.flag_c() as u8;
                ((val >> 1) | (c << 7), val & 0x01 != 0)
            }
            4 => (val << 1, val & 0x80 != 0), // SLA
            5 => (((val as i8) >> 1) as u8, val & 0x01 != 0), // SRA (arithmetic)
            6 => ((val << 1) | 0x01, val & 0x80 != 0), // SLL (undocumented)
            7 => (val >> 1, val & 0x01 != 0), // SRL
            _ => unreachable!(),
        }
    }

    // ========== ED prefix (extended instructions) ==========

    pub(super) fn execute_ed(&mut self, bus: &mut Bus) {
        let opcode = self.fetch_opcode(bus);
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            1 => self.execute_ed_x1(bus, y, z, p, q),
            2 => self.execute_bli(bus, y, z),
            _ => { /* ED NOP: all other ED-prefixed opcodes act as an 8-cycle NOP */ }
        }
    }

    fn execute_ed_x1(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                // IN r,(C)  (y==6 reads but discards into flags only)
                let port = self.bc;
                let val = bus.port_read(port);
                self.wz = port.wrapping_add(1);
                if y != 6 {
                    self.set_reg8(y, val, bus);
                }
                self.f &= !(flags::N | flags::H);
                self.set_sz_flags(val);
                self.set_flag_pv(Self::parity(val));
            }
            1 => {
                // OUT (C),r (y==6 outputs 0)
                let port = self.bc;
                let val = if y == 6 { 0 } else { self.get_reg8(y, bus) };
                bus.port_write(port, val);
                self.wz = port.wrapping_add(1);
            }
            2 => {
                let hl = self.hl;
                let rp = self.get_rp(p);
                self.wz = hl.wrapping_add(1);
                if q == 0 {
                    self.hl = self.alu_sbc16(hl, rp);
                } else {
                    self.hl = self.alu_adc16(hl, rp);
                }
            }
            3 => {
                let nn = self.fetch_word(bus);
                self.wz = nn.wrapping_add(1);
                if q == 0 {
                    let rp = self.get_rp(p);
                    bus.write_word(nn as u32, rp);
                } else {
                    let rp = bus.read_word(nn as u32);
                    self.set_rp(p, rp);
                }
            }
            4 => {
                // NEG
                let val = self.a;
                self.a = 0;
                self.a = self.alu_sub(val, false);
            }
            5 => {
                // RETN / RETI
                self.pc = self.pop_word(bus);
                self.wz = self.pc;
                self.iff1 = self.iff2;
            }
            6 => {
                // IM 0/1/2
                self.im = match y & 0x03 {
                    0 | 1 => InterruptMode::Mode0,
                    2 => InterruptMode::Mode1,
                    _ => InterruptMode::Mode2,
                };
                if y >= 2 {
                    self.im = if y & 1 == 0 {
                        InterruptMode::Mode1
                    } else {
                        InterruptMode::Mode2
                    };
                }
            }
            7 => match y {
                0 => self.i = self.a,       // LD I,A
                1 => { /* LD R,A */ self.r = self.a; }
                2 => {
                    // LD A,I
                    self.a = self.i;
                    self.f &= !(flags::N | flags::H);
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(self.iff2);
                }
                3 => {
                    // LD A,R
                    self.a = self.r;
                    self.f &= !(flags::N | flags::H);
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(self.iff2);
                }
                4 => {
                    // RRD
                    let mem = bus.read_byte(self.hl as u32);
                    let new_mem = (self.a << 4) | (mem >> 4);
                    let new_a = (self.a & 0xF0) | (mem & 0x0F);
                    bus.write_byte(self.hl as u32, new_mem);
                    self.a = new_a;
                    self.wz = self.hl.wrapping_add(1);
                    self.f &= !(flags::N | flags::H);
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(Self::parity(self.a));
                }
                5 => {
                    // RLD
                    let mem = bus.read_byte(self.hl as u32);
                    let new_mem = (mem << 4) | (self.a & 0x0F);
                    let new_a = (self.a & 0xF0) | (mem >> 4);
                    bus.write_byte(self.hl as u32, new_mem);
                    self.a = new_a;
                    self.wz = self.hl.wrapping_add(1);
                    self.f &= !(flags::N | flags::H);
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(Self::parity(self.a));
                }
                _ => { /* NOP (ED 0x77 / 0x7F) */ }
            },
            _ => unreachable!(),
        }
    }

    /// Block transfer/search/IO instructions (ED x=2, z<4, y>=4).
    fn execute_bli(&mut self, bus: &mut Bus, y: u8, z: u8) {
        if y < 4 || z > 3 {
            return; // unassigned ED x=2 slots act as NOP
        }
        match (y, z) {
            (4, 0) => self.ldi(bus),
            (5, 0) => self.ldd(bus),
            (6, 0) => self.ldir(bus),
            (7, 0) => self.lddr(bus),
            (4, 1) => self.cpi(bus),
            (5, 1) => self.cpd(bus),
            (6, 1) => self.cpir(bus),
            (7, 1) => self.cpdr(bus),
            (4, 2) => self.ini(bus),
            (5, 2) => self.ind(bus),
            (6, 2) => self.inir(bus),
            (7, 2) => self.indr(bus),
            (4, 3) => self.outi(bus),
            (5, 3) => self.outd(bus),
            (6, 3) => self.otir(bus),
            (7, 3) => self.otdr(bus),
            _ => {}
        }
    }

    fn ldi(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        bus.write_byte(self.de as u32, val);
        self.hl = self.hl.wrapping_add(1);
        self.de = self.de.wrapping_add(1);
        self.bc = self.bc.wrapping_sub(1);
        self.f &= !(flags::N | flags::H);
        self.set_flag_pv(self.bc != 0);
        let n = val.wrapping_add(self.a);
        self.f = (self.f & !(flags::F3 | flags::F5)) | (n & flags::F3) | (((n << 4) & flags::F5));
    }

    fn ldd(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        bus.write_byte(self.de as u32, val);
        self.hl = self.hl.wrapping_sub(1);
        self.de = self.de.wrapping_sub(1);
        self.bc = self.bc.wrapping_sub(1);
        self.f &= !(flags::N | flags::H);
        self.set_flag_pv(self.bc != 0);
        let n = val.wrapping_add(self.a);
        self.f = (self.f & !(flags::F3 | flags::F5)) | (n & flags::F3) | ((n << 4) & flags::F5);
    }

    fn ldir(&mut self, bus: &mut Bus) {
        self.ldi(bus);
        if self.bc != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.wz = self.pc.wrapping_add(1);
            bus.add_cycles(5);
        }
    }

    fn lddr(&mut self, bus: &mut Bus) {
        self.ldd(bus);
        if self.bc != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.wz = self.pc.wrapping_add(1);
            bus.add_cycles(5);
        }
    }

    fn cpi(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        let a = self.a;
        let result = a.wrapping_sub(val);
        let half = (a & 0x0F) < (val & 0x0F);
        self.hl = self.hl.wrapping_add(1);
        self.bc = self.bc.wrapping_sub(1);
        self.wz = self.wz.wrapping_add(1);
        self.set_sz_flags(result);
        self.set_flag_h(half);
        self.f |= flags::N;
        self.set_flag_pv(self.bc != 0);
        let n = result.wrapping_sub(half as u8);
        self.f = (self.f & !(flags::F3 | flags::F5)) | (n & flags::F3) | ((n << 4) & flags::F5);
    }

    fn cpd(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        let a = self.a;
        let result = a.wrapping_sub(val);
        let half = (a & 0x0F) < (val & 0x0F);
        self.hl = self.hl.wrapping_sub(1);
        self.bc = self.bc.wrapping_sub(1);
        self.wz = self.wz.wrapping_sub(1);
        self.set_sz_flags(result);
        self.set_flag_h(half);
        self.f |= flags::N;
        self.set_flag_pv(self.bc != 0);
        let n = result.wrapping_sub(half as u8);
        self.f = (self.f & !(flags::F3 | flags::F5)) | (n & flags::F3) | ((n << 4) & flags::F5);
    }

    fn cpir(&mut self, bus: &mut Bus) {
        self.cpi(bus);
        if self.bc != 0 && !self.flag_z() {
            self.pc = self.pc.wrapping_sub(2);
            self.wz = self.pc.wrapping_add(1);
            bus.add_cycles(5);
        }
    }

    fn cpdr(&mut self, bus: &mut Bus) {
        self.cpd(bus);
        if self.bc != 0 && !self.flag_z() {
            self.pc = self.pc.wrapping_sub(2);
            self.wz = self.pc.wrapping_add(1);
            bus.add_cycles(5);
        }
    }

    fn ini(&mut self, bus: &mut Bus) {
        let val = bus.port_read(self.bc);
        bus.write_byte(self.hl as u32, val);
        self.wz = self.bc.wrapping_add(1);
        self.hl = self.hl.wrapping_add(1);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        self.f |= flags::N;
        self.set_flag_z(b == 0);
    }

    fn ind(&mut self, bus: &mut Bus) {
        let val = bus.port_read(self.bc);
        bus.write_byte(self.hl as u32, val);
        self.wz = self.bc.wrapping_sub(1);
        self.hl = self.hl.wrapping_sub(1);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        self.f |= flags::N;
        self.set_flag_z(b == 0);
    }

    fn inir(&mut self, bus: &mut Bus) {
        self.ini(bus);
        if self.b() != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.add_cycles(5);
        }
    }

    fn indr(&mut self, bus: &mut Bus) {
        self.ind(bus);
        if self.b() != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.add_cycles(5);
        }
    }

    fn outi(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        bus.port_write(self.bc, val);
        self.wz = self.bc.wrapping_add(1);
        self.hl = self.hl.wrapping_add(1);
        self.f |= flags::N;
        self.set_flag_z(b == 0);
    }

    fn outd(&mut self, bus: &mut Bus) {
        let val = bus.read_byte(self.hl as u32);
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        bus.port_write(self.bc, val);
        self.wz = self.bc.wrapping_sub(1);
        self.hl = self.hl.wrapping_sub(1);
        self.f |= flags::N;
        self.set_flag_z(b == 0);
    }

    fn otir(&mut self, bus: &mut Bus) {
        self.outi(bus);
        if self.b() != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.add_cycles(5);
        }
    }

    fn otdr(&mut self, bus: &mut Bus) {
        self.outd(bus);
        if self.b() != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.add_cycles(5);
        }
    }

    // ========== DD/FD prefix (IX/IY-indexed instructions) ==========

    /// Execute an instruction with HL replaced by IX or IY. Most of the
    /// unprefixed table is reused verbatim; only the handful of opcodes that
    /// reference H/L/`(HL)` directly are special-cased here.
    fn execute_index(&mut self, bus: &mut Bus, idx: Index) {
        let opcode = self.fetch_opcode(bus);

        if opcode == 0xCB {
            let d = self.fetch_byte(bus) as i8 as i16;
            let addr = self.index_reg(idx).wrapping_add(d as u16);
            self.wz = addr;
            let cb_op = self.fetch_opcode(bus);
            let z = cb_op & 0x07;
            let reg_copy = if z != 6 { Some(z) } else { None };
            self.execute_cb_op(bus, cb_op, if idx == Index::Ix { Index::Ix } else { Index::Iy }, reg_copy);
            return;
        }

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        let is_hl_ref = |v: u8| v == 4 || v == 5 || v == 6;

        match x {
            0 if z == 1 && q == 1 => {
                // ADD IX/IY,rp (rp=2 means the index register itself)
                let base = self.index_reg(idx);
                let rp = if p == 2 { base } else { self.get_rp(p) };
                self.wz = base.wrapping_add(1);
                let result = self.alu_add16(base, rp);
                self.set_index_reg(idx, result);
            }
            0 if z == 1 && q == 0 && p == 2 => {
                let nn = self.fetch_word(bus);
                self.set_index_reg(idx, nn);
            }
            0 if z == 2 && p == 2 => {
                // LD (nn),IX / LD IX,(nn)
                let nn = self.fetch_word(bus);
                self.wz = nn.wrapping_add(1);
                if q == 0 {
                    bus.write_word(nn as u32, self.index_reg(idx));
                } else {
                    let val = bus.read_word(nn as u32);
                    self.set_index_reg(idx, val);
                }
            }
            0 if z == 3 && p == 2 => {
                let base = self.index_reg(idx);
                self.set_index_reg(idx, if q == 0 { base.wrapping_add(1) } else { base.wrapping_sub(1) });
            }
            0 if (z == 4 || z == 5) && (y == 4 || y == 5) => {
                // INC/DEC IXH/IXL/IYH/IYL
                let base = self.index_reg(idx);
                let mut hi = (base >> 8) as u8;
                let mut lo = base as u8;
                let inc = z == 4;
                match y {
                    4 if inc => hi = self.alu_inc(hi),
                    4 => hi = self.alu_dec(hi),
                    5 if inc => lo = self.alu_inc(lo),
                    5 => lo = self.alu_dec(lo),
                    _ => {}
                }
                self.set_index_reg(idx, ((hi as u16) << 8) | lo as u16);
            }
            0 if z == 4 && y == 6 => {
                let addr = self.index_addr(bus, idx);
                let val = bus.read_byte(addr as u32);
                let result = self.alu_inc(val);
                bus.write_byte(addr as u32, result);
            }
            0 if z == 5 && y == 6 => {
                let addr = self.index_addr(bus, idx);
                let val = bus.read_byte(addr as u32);
                let result = self.alu_dec(val);
                bus.write_byte(addr as u32, result);
            }
            0 if z == 6 && y == 6 => {
                let addr = self.index_addr(bus, idx);
                let n = self.fetch_byte(bus);
                bus.write_byte(addr as u32, n);
            }
            0 if z == 6 && (y == 4 || y == 5) => {
                let n = self.fetch_byte(bus);
                let base = self.index_reg(idx);
                let val = if y == 4 {
                    ((n as u16) << 8) | (base & 0x00FF)
                } else {
                    (base & 0xFF00) | n as u16
                };
                self.set_index_reg(idx, val);
            }
            1 if y == 6 && z == 6 => {
                self.halted = true;
            }
            1 if y == 6 || z == 6 => {
                // LD r,(IX+d) / LD (IX+d),r - one side references memory
                if z == 6 {
                    let addr = self.index_addr(bus, idx);
                    let val = bus.read_byte(addr as u32);
                    self.set_reg8_plain(y, val);
                } else {
                    let val = self.get_reg8_plain(z);
                    let addr = self.index_addr(bus, idx);
                    bus.write_byte(addr as u32, val);
                }
            }
            1 => {
                // LD r,r' among B/C/D/E/IXH/IXL/A with index substitution
                let src = self.get_indexed_reg8(z, bus, idx);
                self.set_indexed_reg8(y, src, idx);
            }
            2 if is_hl_ref(z) && z != 6 => {
                let val = self.get_indexed_reg8(z, bus, idx);
                self.execute_alu(y, val);
            }
            2 if z == 6 => {
                let addr = self.index_addr(bus, idx);
                let val = bus.read_byte(addr as u32);
                self.execute_alu(y, val);
            }
            2 => {
                let val = self.get_reg8(z, bus);
                self.execute_alu(y, val);
            }
            3 if z == 1 && q == 1 && p == 0 => {
                self.pc = self.pop_word(bus);
                self.wz = self.pc;
                self.set_index_reg(idx, self.index_reg(idx));
            }
            3 if z == 1 && q == 0 => {
                let val = self.pop_word(bus);
                self.set_index_reg(idx, val);
            }
            3 if z == 1 && q == 1 && p == 2 => {
                self.pc = self.index_reg(idx); // JP (IX)
            }
            3 if z == 1 && q == 1 && p == 3 => {
                self.sp = self.index_reg(idx); // LD SP,IX
            }
            3 if z == 3 && y == 4 => {
                // EX (SP),IX
                let sp_val = bus.read_word(self.sp as u32);
                bus.write_word(self.sp as u32, self.index_reg(idx));
                self.set_index_reg(idx, sp_val);
                self.wz = self.index_reg(idx);
            }
            3 if z == 5 && q == 0 => {
                bus.add_cycles(1);
                self.push_word(bus, self.index_reg(idx));
            }
            _ => {
                // Any opcode that doesn't touch H/L/(HL) behaves exactly like
                // the unprefixed table; the DD/FD prefix is then a no-op and
                // decodes the *next* instruction normally (documented Z80
                // behavior for "non-indexed" DD/FD-prefixed opcodes).
                match x {
                    0 => self.execute_x0(bus, y, z, p, q),
                    1 => {
                        let val = self.get_reg8(z, bus);
                        self.set_reg8(y, val, bus);
                    }
                    2 => {
                        let val = self.get_reg8(z, bus);
                        self.execute_alu(y, val);
                    }
                    3 => self.execute_x3(bus, y, z, p, q),
                    _ => unreachable!(),
                }
            }
        }
    }

    /// Register access for the 8-bit halves of the *current* index register
    /// (used inside DD/FD decoding, where `4`/`5` mean IXH/IXL or IYH/IYL
    /// rather than H/L, and `6` means `(IX+d)`/`(IY+d)`).
    fn get_indexed_reg8(&mut self, idx_field: u8, bus: &mut Bus, idx: Index) -> u8 {
        match idx_field {
            4 => (self.index_reg(idx) >> 8) as u8,
            5 => self.index_reg(idx) as u8,
            6 => {
                let addr = self.index_addr(bus, idx);
                bus.read_byte(addr as u32)
            }
            other => self.get_reg8(other, bus),
        }
    }

    fn set_indexed_reg8(&mut self, idx_field: u8, val: u8, idx: Index) {
        match idx_field {
            4 => {
                let base = self.index_reg(idx);
                self.set_index_reg(idx, (base & 0x00FF) | ((val as u16) << 8));
            }
            5 => {
                let base = self.index_reg(idx);
                self.set_index_reg(idx, (base & 0xFF00) | val as u16);
            }
            other => {
                if other != 6 {
                    // (HL)-style writes through the index are handled by the
                    // caller (needs displacement fetch + bus access).
                    self.set_reg8_plain(other, val);
                }
            }
        }
    }

    fn get_reg8_plain(&self, idx_field: u8) -> u8 {
        match idx_field {
            0 => self.b(),
            1 => self.c(),
            2 => self.d(),
            3 => self.e(),
            7 => self.a,
            _ => 0,
        }
    }

    fn set_reg8_plain(&mut self, idx_field: u8, val: u8) {
        match idx_field {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            7 => self.a = val,
            _ => {}
        }
    }
}
