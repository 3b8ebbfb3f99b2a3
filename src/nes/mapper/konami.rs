use super::{IrqCounter, LAST_BANK, Mapper, MapperCtx, MapperState};
use crate::nes::apu::ext::ExtKind;

const ROM_WINDOW: &[(u16, u16)] = &[(0x8000, 0xFFFF)];

/// The Konami boards share one encoding for the 2-bit mirroring field.
fn vrc_mirror(ctx: &mut MapperCtx, mode: u8) {
    match mode & 3 {
        0 => ctx.mirror(0, 1, 0, 1),
        1 => ctx.mirror(0, 0, 1, 1),
        2 => ctx.mirror(0, 0, 0, 0),
        _ => ctx.mirror(1, 1, 1, 1),
    }
}

/// Counts up once per scanline and fires when it wraps past $FF.
fn vrc_hblank(irq: &mut IrqCounter, ctx: &mut MapperCtx) {
    if !irq.enabled {
        return;
    }
    irq.counter += 1;
    if irq.counter == 256 {
        irq.counter = irq.latch;
        ctx.irq();
        irq.enabled = irq.wait_state;
    }
}

/// VRC2 and VRC4 in the wirings used by boards 21, 22, 23 and 25.
pub struct Vrc2And4 {
    number: u8,
    select_c000: bool,
    low: [u8; 8],
    high: [u8; 8],
    irq: IrqCounter,
}

impl Vrc2And4 {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            select_c000: false,
            low: [0; 8],
            high: [0; 8],
            irq: IrqCounter::default(),
        }
    }

    fn chr_nybble(&mut self, ctx: &mut MapperCtx, bank: usize, value: u8, high: bool) {
        if high {
            self.high[bank] = value & 0x0F;
        } else {
            self.low[bank] = value & 0x0F;
        }
        let page = ((self.high[bank] as i32) << 4) + self.low[bank] as i32;
        ctx.bank_chr(1, (bank as u16) << 10, page);
    }

    /// CHR port decode for boards 21 and 25: which 1KB bank and which nybble.
    fn vrc4_chr_port(addr: u16) -> Option<(usize, bool)> {
        let base = ((addr >> 12) as usize).checked_sub(0xB)? * 2;
        match addr & 0x0FFF {
            0x000 => Some((base, false)),
            0x002 | 0x040 => Some((base, true)),
            0x001 | 0x004 | 0x080 => Some((base + 1, false)),
            0x003 | 0x006 | 0x0C0 => Some((base + 1, true)),
            _ => None,
        }
    }

    fn vrc2b_chr_port(addr: u16) -> Option<(usize, bool)> {
        let base = ((addr >> 12) as usize).checked_sub(0xB)? * 2;
        match addr & 0x0FFF {
            0x000 => Some((base, false)),
            0x001 | 0x004 => Some((base, true)),
            0x002 | 0x008 => Some((base + 1, false)),
            0x003 | 0x00C => Some((base + 1, true)),
            _ => None,
        }
    }

    fn write_vrc4(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr {
            0x8000 => {
                let window = if self.select_c000 { 0xC000 } else { 0x8000 };
                ctx.bank_prg(8, window, value as i32);
            }
            0x9000 => vrc_mirror(ctx, value),
            0x9002 => self.select_c000 = value & 0x02 != 0,
            0xA000 => ctx.bank_prg(8, 0xA000, value as i32),
            0xB000..=0xEFFF => {
                if let Some((bank, high)) = Self::vrc4_chr_port(addr) {
                    self.chr_nybble(ctx, bank, value, high);
                }
            }
            0xF000 => self.irq.latch = (self.irq.latch & 0xF0) | (value & 0x0F) as i32,
            0xF002 | 0xF040 => {
                self.irq.latch = (self.irq.latch & 0x0F) | (((value & 0x0F) as i32) << 4);
            }
            0xF004 | 0xF001 | 0xF080 => {
                self.irq.enabled = (value >> 1) & 1 != 0;
                self.irq.wait_state = value & 1 != 0;
                self.irq.counter = self.irq.latch;
            }
            0xF006 | 0xF003 | 0xF0C0 => self.irq.enabled = self.irq.wait_state,
            _ => {}
        }
    }

    fn write_vrc2a(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let reg = addr >> 12;
        match reg {
            0x8 => ctx.bank_prg(8, 0x8000, value as i32),
            0xA => ctx.bank_prg(8, 0xA000, value as i32),
            0x9 => match value & 3 {
                0 => ctx.mirror(0, 1, 0, 1),
                1 => ctx.mirror(0, 0, 1, 1),
                2 => ctx.mirror(1, 1, 1, 1),
                _ => ctx.mirror(0, 0, 0, 0),
            },
            0xB..=0xE => {
                let loc = ((((reg - 0xB) << 1) + (addr & 1)) << 10) as u16;
                ctx.bank_chr(1, loc, (value >> 1) as i32);
            }
            _ => {}
        }
    }

    fn write_vrc2b(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr {
            0x8000 | 0x8FFF => ctx.bank_prg(8, 0x8000, value as i32),
            0xA000 | 0xAFFF => ctx.bank_prg(8, 0xA000, value as i32),
            0x9000 | 0x9004 | 0x9008 => vrc_mirror(ctx, value),
            0xB000..=0xEFFF => {
                if let Some((bank, high)) = Self::vrc2b_chr_port(addr) {
                    self.chr_nybble(ctx, bank, value, high);
                }
            }
            0xF000 => self.irq.latch = (self.irq.latch & 0xF0) | (value & 0x0F) as i32,
            0xF004 => {
                self.irq.latch = (self.irq.latch & 0x0F) | (((value & 0x0F) as i32) << 4);
            }
            0xF008 => {
                self.irq.enabled = (value >> 1) & 1 != 0;
                self.irq.wait_state = value & 1 != 0;
                self.irq.counter = self.irq.latch;
            }
            0xF00C => self.irq.enabled = self.irq.wait_state,
            _ => {}
        }
    }
}

impl Mapper for Vrc2And4 {
    fn number(&self) -> u8 {
        self.number
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        if self.number != 25 {
            self.irq = IrqCounter::default();
        }
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match self.number {
            22 => self.write_vrc2a(ctx, addr, value),
            23 => self.write_vrc2b(ctx, addr, value),
            _ => self.write_vrc4(ctx, addr, value),
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if self.number != 22 {
            vrc_hblank(&mut self.irq, ctx);
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        if self.number == 21 {
            state[0] = self.irq.counter as u8;
            state[1] = self.irq.enabled as u8;
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if self.number == 21 {
            self.irq.counter = state[0] as i32;
            self.irq.enabled = state[1] != 0;
        }
    }
}

/// VRC6: 16KB + 8KB PRG, eight 1KB CHR banks and three extra sound channels.
#[derive(Default)]
pub struct Vrc6 {
    irq: IrqCounter,
}

impl Mapper for Vrc6 {
    fn number(&self) -> u8 {
        24
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        self.irq = IrqCounter::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x8000, 0xF002)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr & 0xF003 {
            0x8000 => ctx.bank_prg(16, 0x8000, value as i32),
            0x9003 => {}
            0xB003 => vrc_mirror(ctx, (value & 0x0C) >> 2),
            0xC000 => ctx.bank_prg(8, 0xC000, value as i32),
            port @ 0xD000..=0xD003 => ctx.bank_chr(1, (port & 3) << 10, value as i32),
            port @ 0xE000..=0xE003 => {
                ctx.bank_chr(1, 0x1000 | ((port & 3) << 10), value as i32);
            }
            0xF000 => self.irq.latch = value as i32,
            0xF001 => {
                self.irq.enabled = (value >> 1) & 1 != 0;
                self.irq.wait_state = value & 1 != 0;
                if self.irq.enabled {
                    self.irq.counter = self.irq.latch;
                }
            }
            0xF002 => self.irq.enabled = self.irq.wait_state,
            _ => ctx.log(format!("invalid VRC6 write: ${value:02X} to ${addr:04X}")),
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        vrc_hblank(&mut self.irq, ctx);
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.irq.counter as u8;
        state[1] = self.irq.enabled as u8;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.irq.counter = state[0] as i32;
        self.irq.enabled = state[1] != 0;
    }

    fn sound_ext(&self) -> Option<ExtKind> {
        Some(ExtKind::Vrc6)
    }
}

/// VRC3 (Salamander): a 16-bit CPU-cycle counter loaded a nybble at a time.
#[derive(Default)]
pub struct Vrc3 {
    enabled: bool,
    counter: u32,
}

impl Mapper for Vrc3 {
    fn number(&self) -> u8 {
        73
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        self.enabled = false;
        self.counter = 0;
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let value = value as u32;
        match addr & 0xF000 {
            0x8000 => self.counter = (self.counter & 0xFFF0) | value,
            0x9000 => self.counter = (self.counter & 0xFF0F) | (value << 4),
            0xA000 => self.counter = (self.counter & 0xF0FF) | (value << 8),
            0xB000 => self.counter = (self.counter & 0x0FFF) | (value << 12),
            0xC000 => self.enabled = value & 0x02 != 0,
            0xF000 => ctx.bank_prg(16, 0x8000, value as i32),
            _ => {}
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if !self.enabled {
            return;
        }
        self.counter += 114;
        if self.counter & 0x10000 != 0 {
            self.counter &= 0xFFFF;
            ctx.irq();
            self.enabled = false;
        }
    }
}

/// VRC1: 8KB PRG banks and two 4KB CHR banks whose top bit lives in $9000.
#[derive(Default)]
pub struct Vrc1 {
    latch: [u8; 2],
    high_bits: u8,
}

impl Vrc1 {
    fn bank_low(&self, ctx: &mut MapperCtx) {
        let bank = ((self.high_bits & 0x02) << 3) | self.latch[0];
        ctx.bank_chr(4, 0x0000, bank as i32);
    }

    fn bank_high(&self, ctx: &mut MapperCtx) {
        let bank = ((self.high_bits & 0x04) << 2) | self.latch[1];
        ctx.bank_chr(4, 0x1000, bank as i32);
    }
}

impl Mapper for Vrc1 {
    fn number(&self) -> u8 {
        75
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr >> 12 {
            0x8 => ctx.bank_prg(8, 0x8000, value as i32),
            0x9 => {
                self.high_bits = value & 0x06;
                self.bank_low(ctx);
                self.bank_high(ctx);
                if value & 1 != 0 {
                    ctx.mirror(0, 1, 0, 1);
                } else {
                    ctx.mirror(0, 0, 1, 1);
                }
            }
            0xA => ctx.bank_prg(8, 0xA000, value as i32),
            0xC => ctx.bank_prg(8, 0xC000, value as i32),
            0xE => {
                self.latch[0] = value & 0x0F;
                self.bank_low(ctx);
            }
            0xF => {
                self.latch[1] = value & 0x0F;
                self.bank_high(ctx);
            }
            _ => {}
        }
    }
}

/// VRC7. The FM synth registers at $9010/$9030 are claimed by the sound expansion first.
#[derive(Default)]
pub struct Vrc7 {
    irq: IrqCounter,
}

impl Mapper for Vrc7 {
    fn number(&self) -> u8 {
        85
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(16, 0x8000, 0);
        ctx.bank_prg(16, 0xC000, LAST_BANK);
        ctx.bank_chr(8, 0x0000, 0);
        self.irq = IrqCounter::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let odd = (addr & 0x10) | ((addr & 0x08) << 1) == 0x10;
        let v = value as i32;
        match addr >> 12 {
            0x8 => ctx.bank_prg(8, if odd { 0xA000 } else { 0x8000 }, v),
            0x9 => ctx.bank_prg(8, 0xC000, v),
            0xA => ctx.bank_chr(1, if odd { 0x0400 } else { 0x0000 }, v),
            0xB => ctx.bank_chr(1, if odd { 0x0C00 } else { 0x0800 }, v),
            0xC => ctx.bank_chr(1, if odd { 0x1400 } else { 0x1000 }, v),
            0xD => ctx.bank_chr(1, if odd { 0x1C00 } else { 0x1800 }, v),
            0xE => {
                if odd {
                    self.irq.latch = v;
                } else {
                    vrc_mirror(ctx, value);
                }
            }
            0xF => {
                if odd {
                    self.irq.enabled = self.irq.wait_state;
                } else {
                    self.irq.wait_state = value & 1 != 0;
                    self.irq.enabled = value & 2 != 0;
                    if self.irq.enabled {
                        self.irq.counter = self.irq.latch;
                    }
                }
            }
            _ => ctx.log(format!("unhandled vrc7 write: ${value:02X} to ${addr:04X}")),
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if !self.irq.enabled {
            return;
        }
        self.irq.counter += 1;
        if self.irq.counter > 0xFF {
            self.irq.counter = self.irq.latch;
            ctx.irq();
        }
    }

    fn sound_ext(&self) -> Option<ExtKind> {
        Some(ExtKind::Vrc7)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Board;
    use super::super::MAPPER_STATE_LEN;

    #[test]
    fn vrc4_chr_nybbles_combine() {
        let mut board = Board::new(21, 8, 32);
        board.write(0xC000, 0x05);
        board.write(0xC040, 0x01);
        assert_eq!(board.chr_at(0x0800), 0x15);
        board.write(0xE0C0, 0x02);
        board.write(0xE080, 0x03);
        assert_eq!(board.chr_at(0x1C00), 0x23);
    }

    #[test]
    fn vrc4_prg_swap_mode() {
        let mut board = Board::new(25, 8, 8);
        board.write(0x9002, 0x02);
        board.write(0x8000, 4);
        assert_eq!(board.prg_at(0xC000), 4);
        assert_eq!(board.prg_at(0x8000), 0);
    }

    #[test]
    fn vrc4_irq_reloads_and_follows_wait_state() {
        let mut board = Board::new(21, 8, 8);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        board.write(0xF000, 0x0E);
        board.write(0xF002, 0x0F);
        board.write(0xF001, 0x02);
        board.hblank(0, false);
        assert!(!board.irq_pending());
        board.hblank(1, false);
        assert!(board.irq_pending());

        // Wait state was clear, so the counter is now disabled.
        board.cpu.int_pending = false;
        for line in 0..300 {
            board.hblank(line, false);
        }
        assert!(!board.irq_pending());

        let mut state = [0u8; MAPPER_STATE_LEN];
        board.mapper.save_state(&mut state);
        assert_eq!(state[0], 0xFE);
        assert_eq!(state[1], 0);
    }

    #[test]
    fn vrc2a_chr_drops_low_bit() {
        let mut board = Board::new(22, 8, 16);
        board.write(0xD001, 0x0B);
        assert_eq!(board.chr_at(0x1400), 5);
        board.write(0x9000, 2);
        assert!(board.ppu.pages[8..12].iter().all(|p| p.offset == 0x400));
    }

    #[test]
    fn vrc2b_decodes_its_own_port_layout() {
        let mut board = Board::new(23, 8, 32);
        board.write(0xB008, 0x07);
        board.write(0xB00C, 0x01);
        assert_eq!(board.chr_at(0x0400), 0x17);
        board.write(0x8FFF, 9);
        assert_eq!(board.prg_at(0x8000), 9);
    }

    #[test]
    fn vrc6_banks_and_irq() {
        let mut board = Board::new(24, 8, 8);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        board.write(0x8000, 2);
        assert_eq!(board.prg_at(0x8000), 4);
        board.write(0xC000, 9);
        assert_eq!(board.prg_at(0xC000), 9);
        board.write(0xE002, 17);
        assert_eq!(board.chr_at(0x1800), 17);

        board.write(0xF000, 0xFF);
        board.write(0xF001, 0x03);
        board.hblank(0, false);
        assert!(board.irq_pending());
        assert_eq!(board.mapper.sound_ext(), Some(crate::nes::apu::ext::ExtKind::Vrc6));
    }

    #[test]
    fn vrc3_counts_cpu_cycles() {
        let mut board = Board::new(73, 8, 0);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        board.write(0x8000, 0x0);
        board.write(0x9000, 0x0);
        board.write(0xA000, 0x0);
        board.write(0xB000, 0xF);
        board.write(0xC000, 0x02);
        for line in 0..35 {
            board.hblank(line, false);
        }
        assert!(!board.irq_pending());
        board.hblank(35, false);
        assert!(board.irq_pending());
    }

    #[test]
    fn vrc1_high_bits_extend_chr_banks() {
        let mut board = Board::new(75, 8, 16);
        board.write(0xE000, 0x03);
        board.write(0x9000, 0x02);
        assert_eq!(board.chr_at(0x0000), (0x13 * 4) as u8);
        assert_eq!(board.ppu.pages[9].offset, 0);
    }

    #[test]
    fn vrc7_register_pairs() {
        let mut board = Board::new(85, 8, 8);
        board.write(0x8010, 3);
        assert_eq!(board.prg_at(0xA000), 3);
        board.write(0xA008, 6);
        assert_eq!(board.chr_at(0x0400), 6);
        board.write(0xD000, 7);
        assert_eq!(board.chr_at(0x1800), 7);
    }
}
