//! Multicarts and the pirate/bootleg boards.

use super::{Mapper, MapperCtx, MapperState};

const ROM_WINDOW: &[(u16, u16)] = &[(0x8000, 0xFFFF)];

/// CPU cycles in one scanline, for boards whose IRQ counts M2 instead of lines.
const SCANLINE_CPU_CYCLES: u32 = 114;

fn mirror_hv(ctx: &mut MapperCtx, horizontal: bool) {
    if horizontal {
        ctx.mirror(0, 0, 1, 1);
    } else {
        ctx.mirror(0, 1, 0, 1);
    }
}

/// 100-in-1 Contra Function 16.
pub struct Contra100;

impl Mapper for Contra100 {
    fn number(&self) -> u8 {
        15
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let bank = ((value & 0x3F) as i32) << 1;
        let swap = ((value & 0x80) >> 7) as i32;
        match addr & 3 {
            0 => {
                ctx.bank_prg(8, 0x8000, bank + swap);
                ctx.bank_prg(8, 0xA000, bank + (swap ^ 1));
                ctx.bank_prg(8, 0xC000, bank + 2 + swap);
                ctx.bank_prg(8, 0xE000, bank + 2 + (swap ^ 1));
                mirror_hv(ctx, value & 0x40 != 0);
            }
            1 => {
                ctx.bank_prg(8, 0xC000, bank + swap);
                ctx.bank_prg(8, 0xE000, bank + (swap ^ 1));
            }
            2 => {
                for window in [0x8000, 0xA000, 0xC000, 0xE000] {
                    ctx.bank_prg(8, window, bank + swap);
                }
            }
            _ => {
                ctx.bank_prg(8, 0xC000, bank + swap);
                ctx.bank_prg(8, 0xE000, bank + (swap ^ 1));
                mirror_hv(ctx, value & 0x40 != 0);
            }
        }
    }
}

/// About 4096 CPU cycles, expressed in scanlines.
const SMB2J_IRQ_PERIOD: i32 = (4096.0 / 113.666666) as i32;

/// Super Mario Bros. 2j pirate cart: FDS image with a cycle-timer IRQ.
#[derive(Default)]
pub struct Smb2jPirate {
    enabled: bool,
    counter: i32,
}

impl Mapper for Smb2jPirate {
    fn number(&self) -> u8 {
        40
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(8, 0x6000, 6);
        ctx.bank_prg(8, 0x8000, 4);
        ctx.bank_prg(8, 0xA000, 5);
        ctx.bank_prg(8, 0xE000, 7);
        self.enabled = false;
        self.counter = SMB2J_IRQ_PERIOD;
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match (addr >> 13) - 4 {
            0 => {
                self.enabled = false;
                self.counter = SMB2J_IRQ_PERIOD;
            }
            1 => self.enabled = true,
            3 => ctx.bank_prg(8, 0xC000, (value & 7) as i32),
            _ => {}
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if self.enabled && self.counter != 0 {
            self.counter -= 1;
            if self.counter == 0 {
                ctx.irq();
                self.enabled = false;
            }
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.counter as u8;
        state[1] = self.enabled as u8;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.counter = state[0] as i32;
        self.enabled = state[1] != 0;
    }
}

/// Caltron 6-in-1: the outer register is the low address bits of a $6000 write.
#[derive(Default)]
pub struct Caltron {
    low: u8,
    high: u8,
}

impl Caltron {
    fn set_chr(&self, ctx: &mut MapperCtx) {
        ctx.bank_chr(8, 0x0000, (((self.low >> 1) & 0x0C) | self.high) as i32);
    }
}

impl Mapper for Caltron {
    fn number(&self) -> u8 {
        41
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        self.low = 0;
        self.high = 0;
        ctx.bank_prg(32, 0x8000, 0);
        self.set_chr(ctx);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x6000, 0x67FF), (0x8000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if addr < 0x8000 {
            self.low = (addr & 0x3F) as u8;
            ctx.bank_prg(32, 0x8000, (self.low & 7) as i32);
            self.set_chr(ctx);
            mirror_hv(ctx, self.low & 0x20 != 0);
        } else if self.low & 0x04 != 0 {
            self.high = value & 3;
            self.set_chr(ctx);
        }
    }
}

/// Baby Mario bootleg: switchable 8KB at $6000 and a cycle-counting IRQ.
#[derive(Default)]
pub struct BabyMario {
    enabled: bool,
    counter: u32,
}

impl BabyMario {
    fn reset_irq(&mut self) {
        self.enabled = false;
        self.counter = 0;
    }
}

impl Mapper for BabyMario {
    fn number(&self) -> u8 {
        42
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(8, 0x8000, 0x0C);
        ctx.bank_prg(8, 0xA000, 0x0D);
        ctx.bank_prg(8, 0xC000, 0x0E);
        ctx.bank_prg(8, 0xE000, 0x0F);
        self.reset_irq();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0xE000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr & 3 {
            0 => ctx.bank_prg(8, 0x6000, (value & 0x0F) as i32),
            1 => mirror_hv(ctx, value & 0x08 != 0),
            2 => {
                if value & 0x02 != 0 {
                    self.enabled = true;
                } else {
                    self.reset_irq();
                }
            }
            _ => {}
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if !self.enabled {
            return;
        }
        self.counter += SCANLINE_CPU_CYCLES;
        if self.counter >= 0x6000 {
            ctx.irq();
            self.reset_irq();
        }
    }
}

/// Pelican Game Station: outer bank bits at $6000, inner bits in ROM space.
#[derive(Default)]
pub struct Pelican {
    prg_low: u8,
    prg_high: u8,
    chr_low: u8,
    chr_high: u8,
}

impl Pelican {
    fn set_banks(&self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, ((self.prg_high << 1) | self.prg_low) as i32);
        ctx.bank_chr(8, 0x0000, ((self.chr_high << 3) | self.chr_low) as i32);
    }
}

impl Mapper for Pelican {
    fn number(&self) -> u8 {
        46
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        *self = Self::default();
        self.set_banks(ctx);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x6000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if addr & 0x8000 != 0 {
            self.prg_low = value & 0x01;
            self.chr_low = (value >> 4) & 0x07;
        } else {
            self.prg_high = value & 0x0F;
            self.chr_high = (value >> 4) & 0x0F;
        }
        self.set_banks(ctx);
    }
}

/// The third SMB2j conversion: registers live in the expansion area with scrambled bits.
#[derive(Default)]
pub struct Smb2jVariant {
    enabled: bool,
    counter: u32,
}

impl Smb2jVariant {
    fn reset_irq(&mut self) {
        self.enabled = false;
        self.counter = 0;
    }
}

impl Mapper for Smb2jVariant {
    fn number(&self) -> u8 {
        50
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(8, 0x6000, 0x0F);
        ctx.bank_prg(8, 0x8000, 0x08);
        ctx.bank_prg(8, 0xA000, 0x09);
        ctx.bank_prg(8, 0xE000, 0x0B);
        self.reset_irq();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x4000, 0x5FFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if addr & 0x60 != 0x20 {
            return;
        }
        if addr & 0x100 != 0 {
            if value & 0x01 != 0 {
                self.enabled = true;
            } else {
                self.reset_irq();
            }
            return;
        }

        let mut bank = value & 0x08;
        if value & 0x04 != 0 {
            bank |= 0x02;
        }
        if value & 0x02 != 0 {
            bank |= 0x01;
        }
        if value & 0x01 != 0 {
            bank |= 0x04;
        }
        ctx.bank_prg(8, 0xC000, bank as i32);
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if !self.enabled {
            return;
        }
        self.counter += SCANLINE_CPU_CYCLES;
        if self.counter & 0x1000 != 0 {
            ctx.irq();
            self.reset_irq();
        }
    }
}

/// Aladdin pirate cart.
#[derive(Default)]
pub struct Aladdin {
    enabled: bool,
    expired: bool,
    counter: i32,
    latch_c003: i32,
    latch_c005: i32,
}

impl Mapper for Aladdin {
    fn number(&self) -> u8 {
        160
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        *self = Self::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr {
            0x8000..=0x8003 => ctx.bank_prg(8, 0x8000 + 0x2000 * (addr & 3), value as i32),
            0x9000..=0x9007 => ctx.bank_chr(1, 0x400 * (addr & 7), value as i32),
            0xC002 => {
                self.enabled = false;
                self.latch_c005 = self.latch_c003;
            }
            0xC003 => {
                if self.expired {
                    self.expired = false;
                    self.enabled = true;
                    self.counter = self.latch_c005;
                } else {
                    self.counter = value as i32;
                }
            }
            0xC005 => {
                self.latch_c005 = value as i32;
                self.counter = value as i32;
            }
            _ => ctx.log(format!(
                "mapper 160: untrapped write ${value:02X} to ${addr:04X}"
            )),
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, vblank: bool) {
        if vblank || !ctx.ppu_enabled() || !self.enabled {
            return;
        }
        if self.counter == 0 && !self.expired {
            self.expired = true;
            ctx.irq();
        } else {
            self.counter -= 1;
        }
    }
}

/// 31-in-1: the bank number is the low five bits of the written address.
pub struct Bootleg31In1;

impl Mapper for Bootleg31In1 {
    fn number(&self) -> u8 {
        229
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
        ctx.bank_chr(8, 0x0000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, _value: u8) {
        let bank = (addr & 0x1F) as i32;
        ctx.bank_chr(8, 0x0000, bank);
        if addr & 0x1E == 0 {
            ctx.bank_prg(32, 0x8000, 0);
        } else {
            ctx.bank_prg(16, 0x8000, bank);
            ctx.bank_prg(16, 0xC000, bank);
        }
        mirror_hv(ctx, addr & 0x20 != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Board;
    use super::SMB2J_IRQ_PERIOD;

    #[test]
    fn contra100_mode_zero_maps_consecutive_halves() {
        let mut board = Board::new(15, 16, 0);
        board.write(0x8000, 0x81);
        assert_eq!(board.prg_at(0x8000), 3);
        assert_eq!(board.prg_at(0xA000), 2);
        assert_eq!(board.prg_at(0xC000), 5);
        assert_eq!(board.prg_at(0xE000), 4);
        board.write(0x8002, 0x02);
        assert!([0x8000, 0xA000, 0xC000, 0xE000]
            .iter()
            .all(|&a| board.prg_at(a) == 4));
    }

    #[test]
    fn smb2j_pirate_timer() {
        assert_eq!(SMB2J_IRQ_PERIOD, 36);
        let mut board = Board::new(40, 4, 1);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        assert_eq!(board.prg_at(0x6000), 6);
        board.write(0xA000, 0);
        for line in 0..35 {
            board.hblank(line, false);
        }
        assert!(!board.irq_pending());
        board.hblank(35, false);
        assert!(board.irq_pending());
    }

    #[test]
    fn caltron_chr_needs_outer_enable() {
        let mut board = Board::new(41, 16, 16);
        board.write(0x8000, 3);
        assert_eq!(board.chr_at(0), 0);
        board.write(0x6000 | 0x24 | 0x02, 0);
        assert_eq!(board.prg_at(0x8000), 24);
        board.write(0x8000, 3);
        assert_eq!(board.chr_at(0), 24);
        assert_eq!(board.ppu.pages[9].offset, 0);
    }

    #[test]
    fn baby_mario_switches_cart_ram_window() {
        let mut board = Board::new(42, 8, 1);
        board.write(0xE000, 3);
        assert_eq!(board.prg_at(0x6000), 3);
        assert_eq!(board.prg_at(0x8000), 12);
    }

    #[test]
    fn pelican_combines_inner_and_outer_bits() {
        let mut board = Board::new(46, 16, 16);
        board.write(0x6000, 0x12);
        board.write(0x8000, 0x21);
        assert_eq!(board.prg_at(0x8000), 20);
        assert_eq!(board.chr_at(0x0000), 80);
    }

    #[test]
    fn smb2j_variant_descrambles_bank_bits() {
        let mut board = Board::new(50, 8, 1);
        board.write(0x4020, 0x01);
        assert_eq!(board.prg_at(0xC000), 4);
        board.write(0x4000, 0x02);
        assert_eq!(board.prg_at(0xC000), 4);
        board.write(0x4120, 0x01);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        for line in 0..35 {
            board.hblank(line, false);
        }
        assert!(!board.irq_pending());
        board.hblank(35, false);
        assert!(board.irq_pending());
    }

    #[test]
    fn aladdin_ports_and_idle_irq() {
        let mut board = Board::new(160, 8, 8);
        board.cpu.p |= crate::nes::FLAG_INTERRUPT;
        board.write(0x8002, 7);
        assert_eq!(board.prg_at(0xC000), 7);
        board.write(0x9005, 9);
        assert_eq!(board.chr_at(0x1400), 9);

        // The counter only arms after expiring, so a cold board never raises IRQ.
        board.write(0xC005, 1);
        board.write(0xC003, 0);
        for line in 0..10 {
            board.hblank(line, false);
        }
        assert!(!board.irq_pending());

        board.write(0xD000, 1);
        assert_eq!(board.events.len(), 1);
    }

    #[test]
    fn bootleg_31in1_address_banking() {
        let mut board = Board::new(229, 16, 32);
        board.write(0x8000 | 0x20 | 0x05, 0);
        assert_eq!(board.prg_at(0x8000), 10);
        assert_eq!(board.prg_at(0xC000), 10);
        assert_eq!(board.chr_at(0x0000), 40);
        assert_eq!(board.ppu.pages[9].offset, 0);
        board.write(0x8001, 0);
        assert_eq!(board.prg_at(0xE000), 3);
    }
}
