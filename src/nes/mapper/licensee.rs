use super::{LAST_BANK, Mapper, MapperCtx, MapperState};

const ROM_WINDOW: &[(u16, u16)] = &[(0x8000, 0xFFFF)];

fn mirror_hv(ctx: &mut MapperCtx, horizontal: bool) {
    if horizontal {
        ctx.mirror(0, 0, 1, 1);
    } else {
        ctx.mirror(0, 1, 0, 1);
    }
}

/// Bandai FCG: registers repeat at $6000, $7FF0 and $8000; 16-bit down-counter IRQ.
#[derive(Default)]
pub struct Bandai {
    counter: u16,
    enabled: bool,
}

impl Mapper for Bandai {
    fn number(&self) -> u8 {
        16
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(16, 0x8000, 0);
        ctx.bank_prg(16, 0xC000, LAST_BANK);
        self.counter = 0;
        self.enabled = false;
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x6000, 0x600D), (0x7FF0, 0x7FFD), (0x8000, 0x800D)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let reg = addr & 0x0F;
        match reg {
            0..=7 => ctx.bank_chr(1, reg << 10, value as i32),
            0x8 => ctx.bank_prg(16, 0x8000, value as i32),
            0x9 => match value & 3 {
                0 => ctx.mirror(0, 0, 1, 1),
                1 => ctx.mirror(0, 1, 0, 1),
                2 => ctx.mirror(0, 0, 0, 0),
                _ => ctx.mirror(1, 1, 1, 1),
            },
            0xA => self.enabled = value & 1 != 0,
            0xB => self.counter = (self.counter & 0xFF00) | value as u16,
            0xC => self.counter = ((value as u16) << 8) | (self.counter & 0xFF),
            // $D is the serial EEPROM port.
            _ => {}
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if self.enabled && self.counter != 0 {
            self.counter -= 1;
            if self.counter == 0 {
                ctx.irq();
            }
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.counter as u8;
        state[1] = (self.counter >> 8) as u8;
        state[2] = self.enabled as u8;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.counter = ((state[1] as u16) << 8) | state[0] as u16;
        self.enabled = state[2] != 0;
    }
}

/// Jaleco SS8806: every bank number is written as two nybbles.
#[derive(Default)]
pub struct Jaleco {
    prg_low: [u8; 3],
    prg_high: [u8; 3],
    chr_low: [u8; 8],
    chr_high: [u8; 8],
    irq_nybbles: [u8; 4],
    counter: u8,
    enabled: bool,
}

impl Jaleco {
    fn prg_nybble(&mut self, ctx: &mut MapperCtx, bank: usize, value: u8, high: bool) {
        if high {
            self.prg_high[bank] = value & 0x0F;
        } else {
            self.prg_low[bank] = value & 0x0F;
        }
        let page = ((self.prg_high[bank] as i32) << 4) + self.prg_low[bank] as i32;
        ctx.bank_prg(8, 0x8000 + ((bank as u16) << 13), page);
    }

    fn chr_nybble(&mut self, ctx: &mut MapperCtx, bank: usize, value: u8, high: bool) {
        if high {
            self.chr_high[bank] = value & 0x0F;
        } else {
            self.chr_low[bank] = value & 0x0F;
        }
        let page = ((self.chr_high[bank] as i32) << 4) + self.chr_low[bank] as i32;
        ctx.bank_chr(1, (bank as u16) << 10, page);
    }

    fn irq_nybble(&mut self, index: usize, value: u8) {
        self.irq_nybbles[index] = value & 0x0F;
        let ticks = self
            .irq_nybbles
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &n)| acc | ((n as u32) << (4 * i)));
        self.counter = (ticks / 114) as u8;
        if self.counter > 15 {
            self.counter -= 16;
        }
    }
}

impl Mapper for Jaleco {
    fn number(&self) -> u8 {
        18
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        self.counter = 0;
        self.enabled = false;
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let high = addr & 1 != 0;
        match addr {
            0x8000..=0x8003 => self.prg_nybble(ctx, ((addr & 2) >> 1) as usize, value, high),
            0x9000 | 0x9001 => self.prg_nybble(ctx, 2, value, high),
            0xA000..=0xA003 | 0xB000..=0xB003 | 0xC000..=0xC003 | 0xD000..=0xD003 => {
                let bank = ((((addr >> 12) - 0xA) << 1) | ((addr & 2) >> 1)) as usize;
                self.chr_nybble(ctx, bank, value, high);
            }
            0xE000..=0xE003 => self.irq_nybble((addr & 3) as usize, value),
            0xF000 => {
                if value & 1 != 0 {
                    self.enabled = true;
                }
            }
            0xF001 => self.enabled = value & 1 != 0,
            0xF002 => match value & 3 {
                0 => ctx.mirror(0, 0, 1, 1),
                1 => ctx.mirror(0, 1, 0, 1),
                _ => ctx.mirror(1, 1, 1, 1),
            },
            _ => {}
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.counter;
        state[1] = 0;
        state[2] = self.enabled as u8;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.counter = state[0];
        self.enabled = state[2] != 0;
    }
}

/// Namco 129/163: 1KB CHR banks, ROM-backed nametables and a 15-bit IRQ counter.
#[derive(Default)]
pub struct Namco {
    counter: u16,
    enabled: bool,
}

impl Mapper for Namco {
    fn number(&self) -> u8 {
        19
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        self.counter = 0;
        self.enabled = false;
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x5000, 0x5FFF), (0x8000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let reg = addr >> 11;
        match reg {
            0x0A => self.counter = (self.counter & !0xFF) | value as u16,
            0x0B => {
                self.counter = (((value & 0x7F) as u16) << 8) | (self.counter & 0xFF);
                self.enabled = value & 0x80 != 0;
            }
            0x10..=0x17 => ctx.bank_chr(1, (reg & 7) << 10, value as i32),
            0x18..=0x1B => ctx.set_nametable_page((reg & 3) as usize, value),
            0x1C => ctx.bank_prg(8, 0x8000, value as i32),
            0x1D => ctx.bank_prg(8, 0xA000, value as i32),
            0x1E => ctx.bank_prg(8, 0xC000, value as i32),
            _ => {}
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.counter as u8;
        state[1] = (self.counter >> 8) as u8;
        state[2] = self.enabled as u8;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.counter = ((state[1] as u16) << 8) | state[0] as u16;
        self.enabled = state[2] != 0;
    }
}

/// Irem G-101.
#[derive(Default)]
pub struct IremG101 {
    select_c000: bool,
}

impl Mapper for IremG101 {
    fn number(&self) -> u8 {
        32
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr >> 12 {
            0x8 => {
                let window = if self.select_c000 { 0xC000 } else { 0x8000 };
                ctx.bank_prg(8, window, value as i32);
            }
            0x9 => {
                mirror_hv(ctx, value & 1 != 0);
                self.select_c000 = value & 0x02 != 0;
            }
            0xA => ctx.bank_prg(8, 0xA000, value as i32),
            0xB => ctx.bank_chr(1, (addr & 7) << 10, value as i32),
            _ => {}
        }
    }
}

/// Taito TC0190.
pub struct Taito;

impl Mapper for Taito {
    fn number(&self) -> u8 {
        33
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let reg = addr & 3;
        match (addr >> 13) & 3 {
            0 => match reg {
                0 => ctx.bank_prg(8, 0x8000, value as i32),
                1 => ctx.bank_prg(8, 0xA000, value as i32),
                2 => ctx.bank_chr(2, 0x0000, value as i32),
                _ => ctx.bank_chr(2, 0x0800, value as i32),
            },
            1 => ctx.bank_chr(1, 0x1000 + (reg << 10), value as i32),
            _ => {
                if reg < 2 {
                    mirror_hv(ctx, value & 1 != 0);
                }
            }
        }
    }
}

/// Tengen RAMBO-1: an MMC3 relative with extra bank registers.
#[derive(Default)]
pub struct Rambo1 {
    command: u8,
    vrom_base: u16,
    counter: i32,
    latch: i32,
    enabled: bool,
    reset: bool,
}

impl Mapper for Rambo1 {
    fn number(&self) -> u8 {
        64
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        for window in [0x8000, 0xA000, 0xC000, 0xE000] {
            ctx.bank_prg(8, window, LAST_BANK);
        }
        *self = Self::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let v = value as i32;
        match addr & 0xE001 {
            0x8000 => {
                self.command = value;
                self.vrom_base = if value & 0x80 != 0 { 0x1000 } else { 0 };
            }
            0x8001 => {
                let base = self.vrom_base;
                let swap = self.command & 0x40 != 0;
                match self.command & 0x0F {
                    0 => {
                        ctx.bank_chr(1, base, v);
                        ctx.bank_chr(1, 0x0400 ^ base, v);
                    }
                    1 => {
                        ctx.bank_chr(1, 0x0800 ^ base, v);
                        ctx.bank_chr(1, 0x0C00 ^ base, v);
                    }
                    2 => ctx.bank_chr(1, 0x1000 ^ base, v),
                    3 => ctx.bank_chr(1, 0x1400 ^ base, v),
                    4 => ctx.bank_chr(1, 0x1800 ^ base, v),
                    5 => ctx.bank_chr(1, 0x1C00 ^ base, v),
                    6 => ctx.bank_prg(8, if swap { 0xA000 } else { 0x8000 }, v),
                    7 => ctx.bank_prg(8, if swap { 0xC000 } else { 0xA000 }, v),
                    8 => ctx.bank_chr(1, 0x0400, v),
                    9 => ctx.bank_chr(1, 0x0C00, v),
                    15 => ctx.bank_prg(8, if swap { 0x8000 } else { 0xC000 }, v),
                    other => ctx.log(format!("mapper 64: unknown command #{other}")),
                }
            }
            0xA000 => mirror_hv(ctx, value & 1 != 0),
            0xC000 => self.latch = v,
            0xC001 => self.reset = true,
            0xE000 => self.enabled = false,
            0xE001 => self.enabled = true,
            _ => {}
        }

        if self.reset {
            self.counter = self.latch;
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, vblank: bool) {
        if vblank {
            return;
        }
        self.reset = false;
        if ctx.ppu_enabled() {
            let expired = self.counter == 0;
            self.counter -= 1;
            if expired {
                self.counter = self.latch;
                if self.enabled {
                    ctx.irq();
                }
                self.reset = true;
            }
        }
    }
}

/// Irem H-3001. The IRQ registers are latched but the counter is never clocked.
#[derive(Default)]
pub struct IremH3001 {
    counter: u8,
    enabled: bool,
    low: u8,
    high: u8,
}

impl IremH3001 {
    fn reload(&mut self) {
        let cycles = ((self.high as u32) << 8) | self.low as u32;
        self.counter = (cycles / 128) as u8;
    }
}

impl Mapper for IremH3001 {
    fn number(&self) -> u8 {
        65
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        *self = Self::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let reg = addr & 7;
        match addr & 0xF000 {
            range @ (0x8000 | 0xA000 | 0xC000) => ctx.bank_prg(8, range, value as i32),
            0xB000 => ctx.bank_chr(1, reg << 10, value as i32),
            0x9000 => match reg {
                4 => self.enabled = value & 1 == 0,
                5 => {
                    self.high = value;
                    self.reload();
                }
                6 => {
                    self.low = value;
                    self.reload();
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.counter;
        state[1] = self.enabled as u8;
        state[2] = self.low;
        state[3] = self.high;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.counter = state[0];
        self.enabled = state[1] != 0;
        self.low = state[2];
        self.high = state[3];
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Board;
    use super::super::MAPPER_STATE_LEN;

    #[test]
    fn bandai_counts_down_to_zero() {
        let mut board = Board::new(16, 8, 8);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        board.write(0x6003, 9);
        assert_eq!(board.chr_at(0x0C00), 9);
        board.write(0x7FF8, 3);
        assert_eq!(board.prg_at(0x8000), 6);

        board.write(0x800B, 2);
        board.write(0x800C, 0);
        board.write(0x800A, 1);
        board.hblank(0, false);
        assert!(!board.irq_pending());
        board.hblank(1, false);
        assert!(board.irq_pending());

        let mut state = [0u8; MAPPER_STATE_LEN];
        board.mapper.save_state(&mut state);
        assert_eq!(&state[..3], &[0, 0, 1]);
    }

    #[test]
    fn jaleco_nybble_banks() {
        let mut board = Board::new(18, 16, 32);
        board.write(0x8002, 0x05);
        board.write(0x8003, 0x01);
        assert_eq!(board.prg_at(0xA000), 0x15);
        board.write(0xD002, 0x04);
        board.write(0xD003, 0x02);
        assert_eq!(board.chr_at(0x1C00), 0x24);
    }

    #[test]
    fn jaleco_irq_counter_from_clock_ticks() {
        let mut board = Board::new(18, 4, 4);
        board.write(0xE001, 0x0);
        board.write(0xE002, 0x4);
        board.write(0xF001, 1);
        let mut state = [0u8; MAPPER_STATE_LEN];
        board.mapper.save_state(&mut state);
        // 0x400 ticks / 114 = 8
        assert_eq!(state[0], 8);
        assert_eq!(state[2], 1);
    }

    #[test]
    fn namco_prg_and_irq_registers() {
        let mut board = Board::new(19, 8, 8);
        board.write(0xE800, 5);
        assert_eq!(board.prg_at(0xA000), 5);
        board.write(0x5000, 0x34);
        board.write(0x5800, 0x92);
        let mut state = [0u8; MAPPER_STATE_LEN];
        board.mapper.save_state(&mut state);
        assert_eq!(&state[..3], &[0x34, 0x12, 1]);
    }

    #[test]
    fn irem_g101_select_swaps_prg_window() {
        let mut board = Board::new(32, 8, 8);
        board.write(0x9000, 0x02);
        board.write(0x8000, 7);
        assert_eq!(board.prg_at(0xC000), 7);
        board.write(0xB005, 11);
        assert_eq!(board.chr_at(0x1400), 11);
    }

    #[test]
    fn taito_chr_pairs() {
        let mut board = Board::new(33, 8, 8);
        board.write(0x8002, 3);
        assert_eq!(board.chr_at(0x0000), 6);
        assert_eq!(board.chr_at(0x0400), 7);
        board.write(0xA003, 20);
        assert_eq!(board.chr_at(0x1C00), 20);
        board.write(0xC000, 1);
        assert_eq!(board.ppu.pages[10].offset, 0x400);
    }

    #[test]
    fn rambo1_fires_when_counter_passes_zero() {
        let mut board = Board::new(64, 8, 8);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        assert_eq!(board.prg_at(0x8000), 15);
        board.write(0xC000, 2);
        board.write(0xC001, 0);
        board.write(0xE001, 0);
        board.hblank(0, false);
        board.hblank(1, false);
        assert!(!board.irq_pending());
        board.hblank(2, false);
        assert!(board.irq_pending());
    }

    #[test]
    fn rambo1_extra_registers() {
        let mut board = Board::new(64, 8, 8);
        board.write(0x8000, 0x0F);
        board.write(0x8001, 3);
        assert_eq!(board.prg_at(0xC000), 3);
        board.write(0x8000, 0x08);
        board.write(0x8001, 12);
        assert_eq!(board.chr_at(0x0400), 12);
    }

    #[test]
    fn irem_h3001_banks() {
        let mut board = Board::new(65, 8, 8);
        board.write(0xC000, 4);
        assert_eq!(board.prg_at(0xC000), 4);
        board.write(0xB003, 30);
        assert_eq!(board.chr_at(0x0C00), 30);
        board.write(0x9005, 0x02);
        board.write(0x9004, 0x00);
        let mut state = [0u8; MAPPER_STATE_LEN];
        board.mapper.save_state(&mut state);
        assert_eq!(state[0], 4);
        assert_eq!(state[1], 1);
    }
}
