use super::bank::{CPU_PAGE_SHIFT, CPU_PAGE_SIZE, Page, PageTable, Region};
use super::cartridge::Rom;
use super::{
    FLAG_BREAK, FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE, FLAG_OVERFLOW,
    FLAG_UNUSED, FLAG_ZERO, Nes,
};

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

pub const INT_CYCLES: i32 = 7;
pub const RESET_CYCLES: i32 = 6;
pub const RAM_SIZE: usize = 0x800;

/// 6502 register file, internal RAM and the CPU-side page table.
#[derive(Clone)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub s: u8,
    pub pc: u16,
    pub(crate) ram: [u8; RAM_SIZE],
    pub(crate) pages: PageTable,
    pub(crate) int_pending: bool,
    pub(crate) jammed: bool,
    pub(crate) burn_cycles: i32,
    pub(crate) remaining_cycles: i32,
    pub(crate) total_cycles: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        let mut pages = [Page::DEAD; 16];
        pages[0] = Page::new(Region::Ram, 0);
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_ZERO | FLAG_UNUSED | FLAG_INTERRUPT,
            s: 0xFF,
            pc: 0,
            ram: [0; RAM_SIZE],
            pages,
            int_pending: false,
            jammed: false,
            burn_cycles: 0,
            remaining_cycles: 0,
            total_cycles: 0,
        }
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn jammed(&self) -> bool {
        self.jammed
    }

    pub(crate) fn read_page(&self, rom: &Rom, addr: u16) -> u8 {
        let page = self.pages[(addr >> CPU_PAGE_SHIFT) as usize];
        let index = page.offset + (addr as usize & (CPU_PAGE_SIZE - 1));
        match page.region {
            Region::Ram => self.ram[index & (RAM_SIZE - 1)],
            Region::Dead => 0,
            region => rom.read(region, index),
        }
    }

    pub(crate) fn write_page(&mut self, rom: &mut Rom, addr: u16, value: u8) {
        let page = self.pages[(addr >> CPU_PAGE_SHIFT) as usize];
        let index = page.offset + (addr as usize & (CPU_PAGE_SIZE - 1));
        match page.region {
            Region::Ram => self.ram[index & (RAM_SIZE - 1)] = value,
            Region::Dead => {}
            region => rom.write(region, index, value),
        }
    }

    pub(crate) fn read_word(&self, rom: &Rom, addr: u16) -> u16 {
        let lo = self.read_page(rom, addr) as u16;
        let hi = self.read_page(rom, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub(crate) fn push(&mut self, value: u8) {
        self.ram[0x100 | self.s as usize] = value;
        self.s = self.s.wrapping_sub(1);
    }

    pub(crate) fn pull(&mut self) -> u8 {
        self.s = self.s.wrapping_add(1);
        self.ram[0x100 | self.s as usize]
    }

    pub(crate) fn push_word(&mut self, value: u16) {
        self.push((value >> 8) as u8);
        self.push(value as u8);
    }

    pub(crate) fn pull_word(&mut self) -> u16 {
        let lo = self.pull() as u16;
        let hi = self.pull() as u16;
        (hi << 8) | lo
    }

    pub(crate) fn add_cycles(&mut self, cycles: i32) {
        self.remaining_cycles -= cycles;
        self.total_cycles = self.total_cycles.wrapping_add(cycles as u64);
    }

    pub(crate) fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    pub(crate) fn get_flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    pub(crate) fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    /// Hardware interrupt entry: pushes PC and P with B clear, then sets I.
    fn interrupt(&mut self, rom: &Rom, vector: u16) {
        self.push_word(self.pc);
        self.p &= !FLAG_BREAK;
        self.push(self.p | FLAG_UNUSED);
        self.p |= FLAG_INTERRUPT;
        self.pc = self.read_word(rom, vector);
    }

    pub fn reset(&mut self, rom: &Rom) {
        self.p = FLAG_ZERO | FLAG_UNUSED | FLAG_INTERRUPT;
        self.int_pending = false;
        self.pc = self.read_word(rom, RESET_VECTOR);
        self.burn_cycles = RESET_CYCLES;
        self.jammed = false;
    }

    pub fn nmi(&mut self, rom: &Rom) {
        if !self.jammed {
            self.interrupt(rom, NMI_VECTOR);
            self.burn_cycles += INT_CYCLES;
        }
    }

    pub fn irq(&mut self, rom: &Rom) {
        if self.jammed {
            return;
        }
        if self.get_flag(FLAG_INTERRUPT) {
            self.int_pending = true;
        } else {
            self.interrupt(rom, IRQ_VECTOR);
            self.burn_cycles += INT_CYCLES;
        }
    }

    /// Charges cycles consumed outside instruction execution (DMA).
    pub fn burn(&mut self, cycles: i32) {
        self.burn_cycles += cycles;
    }

    /// Ends the current `execute` slice after the running instruction.
    pub fn release(&mut self) {
        self.remaining_cycles = 0;
    }

    fn service_pending_irq(&mut self, rom: &Rom) {
        if !self.get_flag(FLAG_INTERRUPT) && self.int_pending && self.remaining_cycles > 0 {
            self.int_pending = false;
            self.interrupt(rom, IRQ_VECTOR);
            self.add_cycles(INT_CYCLES);
        }
    }
}

impl Nes {
    /// Runs at least `timeslice` cycles and returns how many actually elapsed.
    pub fn execute(&mut self, timeslice: i32) -> i32 {
        let old_cycles = self.cpu.total_cycles;
        self.cpu.remaining_cycles = timeslice;

        if self.cpu.burn_cycles > 0 && self.cpu.remaining_cycles > 0 {
            let burn = self.cpu.burn_cycles.min(self.cpu.remaining_cycles);
            self.cpu.add_cycles(burn);
            self.cpu.burn_cycles -= burn;
        }

        // A jammed CPU keeps re-fetching its JAM opcode, so the slice just drains.
        if self.cpu.jammed && self.cpu.remaining_cycles > 0 {
            let idle = self.cpu.remaining_cycles;
            self.cpu.add_cycles(idle);
        }

        self.cpu.service_pending_irq(&self.rom);

        while self.cpu.remaining_cycles > 0 {
            self.step_instruction();
        }

        self.cpu.total_cycles.wrapping_sub(old_cycles) as i32
    }

    fn step_instruction(&mut self) {
        let opcode_pc = self.cpu.pc;
        let opcode = self.fetch_byte();

        if matches!(
            opcode,
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2
        ) {
            self.jam(opcode, opcode_pc);
            return;
        }

        let aaa = opcode >> 5;
        let bbb = (opcode >> 2) & 0x07;
        let cycles = match opcode & 0x03 {
            0x00 => self.exec_group0(opcode),
            0x01 => self.exec_group1(aaa, bbb),
            0x02 => self.exec_group2(opcode, aaa, bbb),
            _ => self.exec_unofficial(aaa, bbb),
        };
        self.cpu.add_cycles(cycles);

        // CLI and RTI let a latched IRQ in right away.
        if matches!(opcode, 0x40 | 0x58) {
            self.cpu.service_pending_irq(&self.rom);
        }
    }

    fn jam(&mut self, opcode: u8, opcode_pc: u16) {
        self.cpu.pc = opcode_pc;
        self.cpu.jammed = true;
        self.cpu.int_pending = false;
        self.cpu.add_cycles(2);
        self.cpu.release();
        self.push_debug_event(format!("CPU jammed by ${opcode:02X} @ ${opcode_pc:04X}"));
    }

    fn fetch_byte(&mut self) -> u8 {
        let value = self.cpu.read_page(&self.rom, self.cpu.pc);
        self.cpu.pc = self.cpu.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self) -> u16 {
        let value = self.cpu.read_word(&self.rom, self.cpu.pc);
        self.cpu.pc = self.cpu.pc.wrapping_add(2);
        value
    }

    fn exec_group1(&mut self, aaa: u8, bbb: u8) -> i32 {
        let is_store = aaa == 4;

        if bbb == 2 {
            let value = self.fetch_byte();
            // STA #imm decodes as a two-byte NOP
            if !is_store {
                self.exec_group1_alu(aaa, value);
            }
            return 2;
        }

        let (addr, page_crossed, cycles) = match bbb {
            0 => (self.addr_indx(), false, 6),
            1 => (self.addr_zp(), false, 3),
            3 => (self.addr_abs(), false, 4),
            4 => {
                let (addr, crossed) = self.addr_indy();
                (addr, crossed, 5)
            }
            5 => (self.addr_zpx(), false, 4),
            6 => {
                let (addr, crossed) = self.addr_absy();
                (addr, crossed, 4)
            }
            _ => {
                let (addr, crossed) = self.addr_absx();
                (addr, crossed, 4)
            }
        };

        if is_store {
            self.bus_write(addr, self.cpu.a);
            return match bbb {
                4 => 6,
                6 | 7 => 5,
                _ => cycles,
            };
        }

        let value = self.bus_read(addr);
        self.exec_group1_alu(aaa, value);
        cycles + page_crossed as i32
    }

    fn exec_group1_alu(&mut self, aaa: u8, value: u8) {
        match aaa {
            0 => self.ora(value),
            1 => self.and(value),
            2 => self.eor(value),
            3 => self.adc(value),
            5 => {
                self.cpu.a = value;
                self.cpu.update_zn(value);
            }
            6 => self.compare(self.cpu.a, value),
            7 => self.sbc(value),
            _ => {}
        }
    }

    fn exec_group2(&mut self, opcode: u8, aaa: u8, bbb: u8) -> i32 {
        match opcode {
            // NOP #imm
            0x82 | 0xC2 | 0xE2 => {
                self.fetch_byte();
                return 2;
            }
            0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xEA | 0xFA => return 2,
            0x8A => {
                self.cpu.a = self.cpu.x;
                self.cpu.update_zn(self.cpu.a);
                return 2;
            }
            0x9A => {
                self.cpu.s = self.cpu.x;
                return 2;
            }
            0xAA => {
                self.cpu.x = self.cpu.a;
                self.cpu.update_zn(self.cpu.x);
                return 2;
            }
            0xBA => {
                self.cpu.x = self.cpu.s;
                self.cpu.update_zn(self.cpu.x);
                return 2;
            }
            0xCA => {
                self.cpu.x = self.cpu.x.wrapping_sub(1);
                self.cpu.update_zn(self.cpu.x);
                return 2;
            }
            // SHX abs,Y
            0x9E => {
                let (addr, _) = self.addr_absy();
                let value = self.cpu.x & ((addr >> 8) as u8).wrapping_add(1);
                self.bus_write(addr, value);
                return 5;
            }
            _ => {}
        }

        match aaa {
            4 => self.exec_stx(bbb),
            5 => self.exec_ldx(bbb),
            0 => self.exec_rmw(bbb, RmwOp::Asl),
            1 => self.exec_rmw(bbb, RmwOp::Rol),
            2 => self.exec_rmw(bbb, RmwOp::Lsr),
            3 => self.exec_rmw(bbb, RmwOp::Ror),
            6 => self.exec_rmw(bbb, RmwOp::Dec),
            _ => self.exec_rmw(bbb, RmwOp::Inc),
        }
    }

    fn exec_stx(&mut self, bbb: u8) -> i32 {
        let (addr, cycles) = match bbb {
            1 => (self.addr_zp(), 3),
            3 => (self.addr_abs(), 4),
            _ => (self.addr_zpy(), 4),
        };
        self.bus_write(addr, self.cpu.x);
        cycles
    }

    fn exec_ldx(&mut self, bbb: u8) -> i32 {
        let (value, cycles) = match bbb {
            0 => (self.fetch_byte(), 2),
            1 => {
                let addr = self.addr_zp();
                (self.bus_read(addr), 3)
            }
            3 => {
                let addr = self.addr_abs();
                (self.bus_read(addr), 4)
            }
            5 => {
                let addr = self.addr_zpy();
                (self.bus_read(addr), 4)
            }
            _ => {
                let (addr, crossed) = self.addr_absy();
                (self.bus_read(addr), 4 + crossed as i32)
            }
        };
        self.cpu.x = value;
        self.cpu.update_zn(value);
        cycles
    }

    fn exec_rmw(&mut self, bbb: u8, op: RmwOp) -> i32 {
        if bbb == 2 {
            self.cpu.a = self.apply_rmw(op, self.cpu.a);
            return 2;
        }

        let (addr, cycles) = match bbb {
            1 => (self.addr_zp(), 5),
            3 => (self.addr_abs(), 6),
            5 => (self.addr_zpx(), 6),
            _ => (self.addr_absx().0, 7),
        };

        let value = self.bus_read(addr);
        let out = self.apply_rmw(op, value);
        self.bus_write(addr, out);
        cycles
    }

    fn apply_rmw(&mut self, op: RmwOp, value: u8) -> u8 {
        match op {
            RmwOp::Asl => self.asl(value),
            RmwOp::Rol => self.rol(value),
            RmwOp::Lsr => self.lsr(value),
            RmwOp::Ror => self.ror(value),
            RmwOp::Dec => {
                let out = value.wrapping_sub(1);
                self.cpu.update_zn(out);
                out
            }
            RmwOp::Inc => {
                let out = value.wrapping_add(1);
                self.cpu.update_zn(out);
                out
            }
        }
    }

    fn exec_unofficial(&mut self, aaa: u8, bbb: u8) -> i32 {
        if bbb == 2 {
            let imm = self.fetch_byte();
            match aaa {
                // ANC
                0 | 1 => {
                    self.cpu.a &= imm;
                    self.cpu.update_zn(self.cpu.a);
                    self.cpu.set_flag(FLAG_CARRY, (self.cpu.a & 0x80) != 0);
                }
                // ASR
                2 => {
                    let value = self.cpu.a & imm;
                    self.cpu.a = self.lsr(value);
                }
                // ARR
                3 => {
                    let carry_in = if self.cpu.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
                    self.cpu.a = ((self.cpu.a & imm) >> 1) | carry_in;
                    self.cpu.update_zn(self.cpu.a);
                    self.cpu.set_flag(FLAG_CARRY, (self.cpu.a & 0x40) != 0);
                    self.cpu.set_flag(
                        FLAG_OVERFLOW,
                        (((self.cpu.a >> 6) ^ (self.cpu.a >> 5)) & 0x01) != 0,
                    );
                }
                // ANE
                4 => {
                    self.cpu.a = (self.cpu.a | 0xEE) & self.cpu.x & imm;
                    self.cpu.update_zn(self.cpu.a);
                }
                // LXA
                5 => {
                    self.cpu.a = (self.cpu.a | 0xEE) & imm;
                    self.cpu.x = self.cpu.a;
                    self.cpu.update_zn(self.cpu.a);
                }
                // SBX
                6 => {
                    let ax = self.cpu.a & self.cpu.x;
                    self.cpu.set_flag(FLAG_CARRY, ax >= imm);
                    self.cpu.x = ax.wrapping_sub(imm);
                    self.cpu.update_zn(self.cpu.x);
                }
                // SBC #imm ($EB)
                _ => self.sbc(imm),
            }
            return 2;
        }

        match aaa {
            4 => self.exec_sax(bbb),
            5 => self.exec_lax(bbb),
            _ => {
                let (addr, cycles) = match bbb {
                    0 => (self.addr_indx(), 8),
                    1 => (self.addr_zp(), 5),
                    3 => (self.addr_abs(), 6),
                    4 => (self.addr_indy().0, 8),
                    5 => (self.addr_zpx(), 6),
                    6 => (self.addr_absy().0, 7),
                    _ => (self.addr_absx().0, 7),
                };
                let op = match aaa {
                    0 => UnofficialRmwOp::Slo,
                    1 => UnofficialRmwOp::Rla,
                    2 => UnofficialRmwOp::Sre,
                    3 => UnofficialRmwOp::Rra,
                    6 => UnofficialRmwOp::Dcp,
                    _ => UnofficialRmwOp::Isb,
                };
                self.exec_unofficial_rmw(addr, op);
                cycles
            }
        }
    }

    fn exec_sax(&mut self, bbb: u8) -> i32 {
        match bbb {
            // SHA (zp),Y
            4 => {
                let (addr, _) = self.addr_indy();
                let value = self.cpu.a & self.cpu.x & ((addr >> 8) as u8).wrapping_add(1);
                self.bus_write(addr, value);
                6
            }
            // SHS abs,Y
            6 => {
                let (addr, _) = self.addr_absy();
                self.cpu.s = self.cpu.a & self.cpu.x;
                let value = self.cpu.s & ((addr >> 8) as u8).wrapping_add(1);
                self.bus_write(addr, value);
                5
            }
            // SHA abs,Y
            7 => {
                let (addr, _) = self.addr_absy();
                let value = self.cpu.a & self.cpu.x & ((addr >> 8) as u8).wrapping_add(1);
                self.bus_write(addr, value);
                5
            }
            _ => {
                let (addr, cycles) = match bbb {
                    0 => (self.addr_indx(), 6),
                    1 => (self.addr_zp(), 3),
                    3 => (self.addr_abs(), 4),
                    _ => (self.addr_zpy(), 4),
                };
                self.bus_write(addr, self.cpu.a & self.cpu.x);
                cycles
            }
        }
    }

    fn exec_lax(&mut self, bbb: u8) -> i32 {
        let (value, cycles) = match bbb {
            0 => {
                let addr = self.addr_indx();
                (self.bus_read(addr), 6)
            }
            1 => {
                let addr = self.addr_zp();
                (self.bus_read(addr), 3)
            }
            3 => {
                let addr = self.addr_abs();
                (self.bus_read(addr), 4)
            }
            4 => {
                let (addr, crossed) = self.addr_indy();
                (self.bus_read(addr), 5 + crossed as i32)
            }
            5 => {
                let addr = self.addr_zpy();
                (self.bus_read(addr), 4)
            }
            // LAS abs,Y
            6 => {
                let (addr, crossed) = self.addr_absy();
                let value = self.bus_read(addr) & self.cpu.s;
                self.cpu.s = value;
                (value, 4 + crossed as i32)
            }
            _ => {
                let (addr, crossed) = self.addr_absy();
                (self.bus_read(addr), 4 + crossed as i32)
            }
        };
        self.cpu.a = value;
        self.cpu.x = value;
        self.cpu.update_zn(value);
        cycles
    }

    fn exec_unofficial_rmw(&mut self, addr: u16, op: UnofficialRmwOp) {
        let value = self.bus_read(addr);
        let out = match op {
            UnofficialRmwOp::Slo => {
                let shifted = self.asl(value);
                self.ora(shifted);
                shifted
            }
            UnofficialRmwOp::Rla => {
                let shifted = self.rol(value);
                self.and(shifted);
                shifted
            }
            UnofficialRmwOp::Sre => {
                let shifted = self.lsr(value);
                self.eor(shifted);
                shifted
            }
            UnofficialRmwOp::Rra => {
                let shifted = self.ror(value);
                self.adc(shifted);
                shifted
            }
            UnofficialRmwOp::Dcp => {
                let decremented = value.wrapping_sub(1);
                self.compare(self.cpu.a, decremented);
                decremented
            }
            UnofficialRmwOp::Isb => {
                let incremented = value.wrapping_add(1);
                self.sbc(incremented);
                incremented
            }
        };
        self.bus_write(addr, out);
    }

    fn exec_group0(&mut self, opcode: u8) -> i32 {
        match opcode {
            0x00 => {
                self.cpu.pc = self.cpu.pc.wrapping_add(1);
                self.cpu.push_word(self.cpu.pc);
                self.cpu.p |= FLAG_BREAK;
                self.cpu.push(self.cpu.p | FLAG_UNUSED);
                self.cpu.set_flag(FLAG_INTERRUPT, true);
                self.cpu.pc = self.cpu.read_word(&self.rom, IRQ_VECTOR);
                7
            }
            0x08 => {
                self.cpu.push(self.cpu.p | FLAG_BREAK | FLAG_UNUSED);
                3
            }
            0x10 => self.branch(!self.cpu.get_flag(FLAG_NEGATIVE)),
            0x18 => {
                self.cpu.set_flag(FLAG_CARRY, false);
                2
            }
            0x20 => {
                let addr = self.cpu.read_word(&self.rom, self.cpu.pc);
                self.cpu.push_word(self.cpu.pc.wrapping_add(1));
                self.cpu.pc = addr;
                6
            }
            0x24 => {
                let addr = self.addr_zp();
                let value = self.bus_read(addr);
                self.bit(value);
                3
            }
            0x28 => {
                self.cpu.p = self.cpu.pull() | FLAG_UNUSED;
                4
            }
            0x2C => {
                let addr = self.addr_abs();
                let value = self.bus_read(addr);
                self.bit(value);
                4
            }
            0x30 => self.branch(self.cpu.get_flag(FLAG_NEGATIVE)),
            0x38 => {
                self.cpu.set_flag(FLAG_CARRY, true);
                2
            }
            0x40 => {
                self.cpu.p = self.cpu.pull() | FLAG_UNUSED;
                self.cpu.pc = self.cpu.pull_word();
                6
            }
            0x48 => {
                self.cpu.push(self.cpu.a);
                3
            }
            0x4C => {
                self.cpu.pc = self.fetch_word();
                3
            }
            0x50 => self.branch(!self.cpu.get_flag(FLAG_OVERFLOW)),
            0x58 => {
                self.cpu.set_flag(FLAG_INTERRUPT, false);
                2
            }
            0x60 => {
                self.cpu.pc = self.cpu.pull_word().wrapping_add(1);
                6
            }
            0x68 => {
                self.cpu.a = self.cpu.pull();
                self.cpu.update_zn(self.cpu.a);
                4
            }
            0x6C => {
                let ptr = self.fetch_word();
                // the high byte never carries into the next page
                self.cpu.pc = if ptr & 0x00FF == 0x00FF {
                    let lo = self.cpu.read_page(&self.rom, ptr) as u16;
                    let hi = self.cpu.read_page(&self.rom, ptr & 0xFF00) as u16;
                    (hi << 8) | lo
                } else {
                    self.cpu.read_word(&self.rom, ptr)
                };
                5
            }
            0x70 => self.branch(self.cpu.get_flag(FLAG_OVERFLOW)),
            0x78 => {
                self.cpu.set_flag(FLAG_INTERRUPT, true);
                2
            }
            0x84 => {
                let addr = self.addr_zp();
                self.bus_write(addr, self.cpu.y);
                3
            }
            0x88 => {
                self.cpu.y = self.cpu.y.wrapping_sub(1);
                self.cpu.update_zn(self.cpu.y);
                2
            }
            0x8C => {
                let addr = self.addr_abs();
                self.bus_write(addr, self.cpu.y);
                4
            }
            0x90 => self.branch(!self.cpu.get_flag(FLAG_CARRY)),
            0x94 => {
                let addr = self.addr_zpx();
                self.bus_write(addr, self.cpu.y);
                4
            }
            0x98 => {
                self.cpu.a = self.cpu.y;
                self.cpu.update_zn(self.cpu.a);
                2
            }
            // SHY abs,X
            0x9C => {
                let (addr, _) = self.addr_absx();
                let value = self.cpu.y & ((addr >> 8) as u8).wrapping_add(1);
                self.bus_write(addr, value);
                5
            }
            0xA0 => {
                self.cpu.y = self.fetch_byte();
                self.cpu.update_zn(self.cpu.y);
                2
            }
            0xA4 => {
                let addr = self.addr_zp();
                self.cpu.y = self.bus_read(addr);
                self.cpu.update_zn(self.cpu.y);
                3
            }
            0xA8 => {
                self.cpu.y = self.cpu.a;
                self.cpu.update_zn(self.cpu.y);
                2
            }
            0xAC => {
                let addr = self.addr_abs();
                self.cpu.y = self.bus_read(addr);
                self.cpu.update_zn(self.cpu.y);
                4
            }
            0xB0 => self.branch(self.cpu.get_flag(FLAG_CARRY)),
            0xB4 => {
                let addr = self.addr_zpx();
                self.cpu.y = self.bus_read(addr);
                self.cpu.update_zn(self.cpu.y);
                4
            }
            0xB8 => {
                self.cpu.set_flag(FLAG_OVERFLOW, false);
                2
            }
            0xBC => {
                let (addr, crossed) = self.addr_absx();
                self.cpu.y = self.bus_read(addr);
                self.cpu.update_zn(self.cpu.y);
                4 + crossed as i32
            }
            0xC0 => {
                let value = self.fetch_byte();
                self.compare(self.cpu.y, value);
                2
            }
            0xC4 => {
                let addr = self.addr_zp();
                let value = self.bus_read(addr);
                self.compare(self.cpu.y, value);
                3
            }
            0xC8 => {
                self.cpu.y = self.cpu.y.wrapping_add(1);
                self.cpu.update_zn(self.cpu.y);
                2
            }
            0xCC => {
                let addr = self.addr_abs();
                let value = self.bus_read(addr);
                self.compare(self.cpu.y, value);
                4
            }
            0xD0 => self.branch(!self.cpu.get_flag(FLAG_ZERO)),
            0xD8 => {
                self.cpu.set_flag(FLAG_DECIMAL, false);
                2
            }
            0xE0 => {
                let value = self.fetch_byte();
                self.compare(self.cpu.x, value);
                2
            }
            0xE4 => {
                let addr = self.addr_zp();
                let value = self.bus_read(addr);
                self.compare(self.cpu.x, value);
                3
            }
            0xE8 => {
                self.cpu.x = self.cpu.x.wrapping_add(1);
                self.cpu.update_zn(self.cpu.x);
                2
            }
            0xEC => {
                let addr = self.addr_abs();
                let value = self.bus_read(addr);
                self.compare(self.cpu.x, value);
                4
            }
            0xF0 => self.branch(self.cpu.get_flag(FLAG_ZERO)),
            0xF8 => {
                self.cpu.set_flag(FLAG_DECIMAL, true);
                2
            }

            // NOP #imm / zp / zp,X: operand skipped, never read
            0x80 => {
                self.fetch_byte();
                2
            }
            0x04 | 0x44 | 0x64 => {
                self.fetch_byte();
                3
            }
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                self.fetch_byte();
                4
            }
            // NOP abs / abs,X
            _ => {
                self.cpu.pc = self.cpu.pc.wrapping_add(2);
                4
            }
        }
    }

    fn addr_zp(&mut self) -> u16 {
        self.fetch_byte() as u16
    }

    fn addr_zpx(&mut self) -> u16 {
        self.fetch_byte().wrapping_add(self.cpu.x) as u16
    }

    fn addr_zpy(&mut self) -> u16 {
        self.fetch_byte().wrapping_add(self.cpu.y) as u16
    }

    fn addr_abs(&mut self) -> u16 {
        self.fetch_word()
    }

    fn addr_absx(&mut self) -> (u16, bool) {
        let addr = self.fetch_word().wrapping_add(self.cpu.x as u16);
        (addr, self.cpu.x > addr as u8)
    }

    fn addr_absy(&mut self) -> (u16, bool) {
        let addr = self.fetch_word().wrapping_add(self.cpu.y as u16);
        (addr, self.cpu.y > addr as u8)
    }

    fn addr_indx(&mut self) -> u16 {
        let zp = self.fetch_byte().wrapping_add(self.cpu.x);
        self.read_zp_word(zp)
    }

    fn addr_indy(&mut self) -> (u16, bool) {
        let zp = self.fetch_byte();
        let addr = self.read_zp_word(zp).wrapping_add(self.cpu.y as u16);
        (addr, self.cpu.y > addr as u8)
    }

    fn read_zp_word(&self, addr: u8) -> u16 {
        let lo = self.cpu.ram[addr as usize] as u16;
        let hi = self.cpu.ram[addr.wrapping_add(1) as usize] as u16;
        (hi << 8) | lo
    }

    fn branch(&mut self, condition: bool) -> i32 {
        let offset = self.fetch_byte() as i8;
        if !condition {
            return 2;
        }
        let crossed = (((self.cpu.pc & 0x00FF) as i32 + offset as i32) & 0x100) != 0;
        self.cpu.pc = self.cpu.pc.wrapping_add(offset as i16 as u16);
        3 + crossed as i32
    }

    fn ora(&mut self, value: u8) {
        self.cpu.a |= value;
        self.cpu.update_zn(self.cpu.a);
    }

    fn and(&mut self, value: u8) {
        self.cpu.a &= value;
        self.cpu.update_zn(self.cpu.a);
    }

    fn eor(&mut self, value: u8) {
        self.cpu.a ^= value;
        self.cpu.update_zn(self.cpu.a);
    }

    fn bit(&mut self, value: u8) {
        self.cpu.set_flag(FLAG_ZERO, (self.cpu.a & value) == 0);
        self.cpu.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
        self.cpu.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.cpu.set_flag(FLAG_CARRY, register >= value);
        self.cpu.update_zn(register.wrapping_sub(value));
    }

    // no decimal mode on the 2A03
    fn adc(&mut self, value: u8) {
        let carry_in = self.cpu.get_flag(FLAG_CARRY) as u16;
        let result = self.cpu.a as u16 + value as u16 + carry_in;
        let out = result as u8;
        self.cpu.set_flag(FLAG_CARRY, result > 0xFF);
        self.cpu
            .set_flag(FLAG_OVERFLOW, ((self.cpu.a ^ out) & (value ^ out) & 0x80) != 0);
        self.cpu.a = out;
        self.cpu.update_zn(out);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.cpu.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.cpu.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.cpu.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.cpu.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.cpu.get_flag(FLAG_CARRY) as u8;
        self.cpu.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.cpu.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.cpu.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.cpu.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.cpu.update_zn(result);
        result
    }
}

#[derive(Clone, Copy)]
enum RmwOp {
    Asl,
    Rol,
    Lsr,
    Ror,
    Dec,
    Inc,
}

#[derive(Clone, Copy)]
enum UnofficialRmwOp {
    Slo,
    Rla,
    Sre,
    Rra,
    Dcp,
    Isb,
}
