use super::{IrqCounter, LAST_BANK, Mapper, MapperCtx, MapperState};
use crate::nes::apu::ext::ExtKind;
use crate::nes::bank::{self, PageTable};
use crate::nes::cartridge::{ROM_FLAG_FOURSCREEN, Rom};

/// MMC1: five serial writes fill one of four internal registers.
#[derive(Default)]
pub struct Mmc1 {
    regs: [u8; 4],
    latch: u8,
    bit_count: u8,
    last_reg: usize,
}

impl Mmc1 {
    fn reset_shift(&mut self) {
        self.bit_count = 0;
        self.latch = 0;
    }

    /// 256KB bank group for the 512KB and 1MB SUROM/SXROM variants.
    fn bank_select(&self, ctx: &MapperCtx) -> i32 {
        match ctx.prg_banks_16k() {
            0x20 => {
                if self.regs[1] & 0x10 != 0 {
                    0
                } else {
                    0x10
                }
            }
            0x40 => {
                if self.regs[0] & 0x10 != 0 {
                    ((self.regs[1] & 0x10) | ((self.regs[2] & 0x10) << 1)) as i32
                } else {
                    ((self.regs[1] & 0x10) << 1) as i32
                }
            }
            _ => 0,
        }
    }

    fn commit(&mut self, ctx: &mut MapperCtx, regnum: usize, value: u8) {
        match regnum {
            0 => {
                if value & 0x02 == 0 {
                    let screen = (value & 1) as usize;
                    ctx.mirror(screen, screen, screen, screen);
                } else if value & 0x01 != 0 {
                    ctx.mirror(0, 0, 1, 1);
                } else {
                    ctx.mirror(0, 1, 0, 1);
                }
            }
            1 => {
                if self.regs[0] & 0x10 != 0 {
                    ctx.bank_chr(4, 0x0000, value as i32);
                } else {
                    ctx.bank_chr(8, 0x0000, (value >> 1) as i32);
                }
            }
            2 => {
                if self.regs[0] & 0x10 != 0 {
                    ctx.bank_chr(4, 0x1000, value as i32);
                }
            }
            _ => {
                let select = self.bank_select(ctx);
                if self.regs[0] & 0x08 == 0 {
                    ctx.bank_prg(32, 0x8000, ((value >> 1) as i32) + (select >> 1));
                } else if self.regs[0] & 0x04 != 0 {
                    ctx.bank_prg(16, 0x8000, ((value & 0x0F) as i32) + select);
                } else {
                    ctx.bank_prg(16, 0xC000, ((value & 0x0F) as i32) + select);
                }
            }
        }
    }
}

impl Mapper for Mmc1 {
    fn number(&self) -> u8 {
        1
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        self.regs = [0; 4];
        self.reset_shift();
        if ctx.prg_banks_16k() == 0x20 {
            ctx.bank_prg(16, 0xC000, 0x0F);
        }
        self.write(ctx, 0x8000, 0x80);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x8000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        let regnum = ((addr >> 13) - 4) as usize & 3;

        if value & 0x80 != 0 {
            self.regs[0] |= 0x0C;
            self.reset_shift();
            return;
        }

        if self.last_reg != regnum {
            self.reset_shift();
            self.last_reg = regnum;
        }

        self.latch |= (value & 1) << self.bit_count;
        self.bit_count += 1;
        if self.bit_count != 5 {
            return;
        }

        let committed = self.latch;
        self.regs[regnum] = committed;
        self.reset_shift();
        self.commit(ctx, regnum, committed);
    }

    fn save_state(&self, state: &mut MapperState) {
        state[..4].copy_from_slice(&self.regs);
        state[4] = self.latch;
        state[5] = self.bit_count;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.regs.copy_from_slice(&state[..4]);
        self.latch = state[4];
        self.bit_count = state[5].min(4);
    }
}

/// MMC3: eight bank registers behind a command port plus the A12 scanline counter.
#[derive(Default)]
pub struct Mmc3 {
    command: u8,
    vrom_base: u16,
    prg_swap: u8,
    irq: IrqCounter,
}

impl Mapper for Mmc3 {
    fn number(&self) -> u8 {
        4
    }

    fn init(&mut self, _ctx: &mut MapperCtx) {
        *self = Self::default();
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x8000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr & 0xE001 {
            0x8000 => {
                self.command = value;
                self.vrom_base = if value & 0x80 != 0 { 0x1000 } else { 0 };
                if self.prg_swap != value & 0x40 {
                    let second_last = ctx.prg_banks_8k() - 2;
                    if value & 0x40 != 0 {
                        ctx.bank_prg(8, 0x8000, second_last);
                    } else {
                        ctx.bank_prg(8, 0xC000, second_last);
                    }
                    self.prg_swap = value & 0x40;
                }
            }
            0x8001 => {
                let base = self.vrom_base;
                match self.command & 0x07 {
                    0 => {
                        let v = (value & 0xFE) as i32;
                        ctx.bank_chr(1, base, v);
                        ctx.bank_chr(1, base ^ 0x0400, v + 1);
                    }
                    1 => {
                        let v = (value & 0xFE) as i32;
                        ctx.bank_chr(1, base ^ 0x0800, v);
                        ctx.bank_chr(1, base ^ 0x0C00, v + 1);
                    }
                    2 => ctx.bank_chr(1, base ^ 0x1000, value as i32),
                    3 => ctx.bank_chr(1, base ^ 0x1400, value as i32),
                    4 => ctx.bank_chr(1, base ^ 0x1800, value as i32),
                    5 => ctx.bank_chr(1, base ^ 0x1C00, value as i32),
                    6 => {
                        let window = if self.command & 0x40 != 0 {
                            0xC000
                        } else {
                            0x8000
                        };
                        ctx.bank_prg(8, window, value as i32);
                    }
                    _ => ctx.bank_prg(8, 0xA000, value as i32),
                }
            }
            0xA000 => {
                if !ctx.has_flag(ROM_FLAG_FOURSCREEN) {
                    if value & 1 != 0 {
                        ctx.mirror(0, 0, 1, 1);
                    } else {
                        ctx.mirror(0, 1, 0, 1);
                    }
                }
            }
            0xC000 => self.irq.latch = value as i32,
            0xC001 => {
                self.irq.reset = true;
                self.irq.counter = self.irq.latch;
            }
            0xE000 => self.irq.enabled = false,
            0xE001 => self.irq.enabled = true,
            _ => {}
        }

        if self.irq.reset {
            self.irq.counter = self.irq.latch;
        }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, vblank: bool) {
        if vblank || !ctx.ppu_enabled() || self.irq.counter < 0 {
            return;
        }
        self.irq.reset = false;
        self.irq.counter -= 1;
        if self.irq.counter < 0 && self.irq.enabled {
            self.irq.reset = true;
            ctx.irq();
        }
    }

    fn save_state(&self, state: &mut MapperState) {
        state[0] = self.irq.counter as u8;
        state[1] = self.irq.latch as u8;
        state[2] = self.irq.enabled as u8;
        state[3] = self.command;
    }

    fn load_state(&mut self, state: &MapperState) {
        self.irq.counter = state[0] as i32;
        self.irq.latch = state[1] as i32;
        self.irq.enabled = state[2] != 0;
        self.command = state[3];
        self.vrom_base = if self.command & 0x80 != 0 { 0x1000 } else { 0 };
    }
}

/// MMC5, limited to 8KB PRG banking, 1KB CHR banking and the scanline-compare IRQ.
#[derive(Default)]
pub struct Mmc5 {
    irq: IrqCounter,
}

impl Mapper for Mmc5 {
    fn number(&self) -> u8 {
        5
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        self.irq = IrqCounter::default();
        for window in [0x8000, 0xA000, 0xC000, 0xE000] {
            ctx.bank_prg(8, window, LAST_BANK);
        }
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x5016, 0x5FFF), (0x8000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if (0x5C00..=0x5FFF).contains(&addr) {
            return;
        }
        match addr {
            0x5105 => ctx.mirror(
                (value & 3) as usize,
                ((value >> 2) & 3) as usize,
                ((value >> 4) & 3) as usize,
                (value >> 6) as usize,
            ),
            0x5114 => ctx.bank_prg(8, 0x8000, value as i32),
            0x5115 => {
                ctx.bank_prg(8, 0x8000, value as i32);
                ctx.bank_prg(8, 0xA000, value as i32 + 1);
            }
            0x5116 => ctx.bank_prg(8, 0xC000, value as i32),
            0x5120..=0x5123 => ctx.bank_chr(1, (addr & 3) << 10, value as i32),
            0x5128..=0x512B => ctx.bank_chr(1, 0x1000 | ((addr & 3) << 10), value as i32),
            0x5203 => {
                self.irq.counter = value as i32;
                self.irq.latch = value as i32;
            }
            0x5204 => self.irq.enabled = value & 0x80 != 0,
            _ => ctx.log(format!("unknown mmc5 write: ${value:02X} to ${addr:04X}")),
        }
    }

    fn read_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x5204, 0x5204)]
    }

    fn read(&mut self, _ctx: &mut MapperCtx, _addr: u16) -> u8 {
        if self.irq.reset { 0x40 } else { 0x00 }
    }

    fn hblank(&mut self, ctx: &mut MapperCtx, _vblank: bool) {
        if self.irq.counter == ctx.scanline {
            if self.irq.enabled {
                ctx.irq();
                self.irq.reset = true;
            }
            self.irq.counter = self.irq.latch;
        }
    }

    fn sound_ext(&self) -> Option<ExtKind> {
        Some(ExtKind::Mmc5)
    }
}

/// MMC2 (Punch-Out!!): CHR banks flip when the renderer fetches tile $FD or $FE.
pub struct Mmc2 {
    latch: [u8; 2],
    regs: [u8; 4],
}

impl Default for Mmc2 {
    fn default() -> Self {
        Self {
            latch: [0xFE; 2],
            regs: [0; 4],
        }
    }
}

impl Mapper for Mmc2 {
    fn number(&self) -> u8 {
        9
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        *self = Self::default();
        let banks = ctx.prg_banks_8k();
        ctx.bank_prg(8, 0x8000, 0);
        ctx.bank_prg(8, 0xA000, banks - 3);
        ctx.bank_prg(8, 0xC000, banks - 2);
        ctx.bank_prg(8, 0xE000, banks - 1);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0xA000, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        match addr >> 12 {
            0xA => ctx.bank_prg(8, 0x8000, value as i32),
            0xB => {
                self.regs[0] = value;
                if self.latch[0] == 0xFD {
                    ctx.bank_chr(4, 0x0000, value as i32);
                }
            }
            0xC => {
                self.regs[1] = value;
                if self.latch[0] == 0xFE {
                    ctx.bank_chr(4, 0x0000, value as i32);
                }
            }
            0xD => {
                self.regs[2] = value;
                if self.latch[1] == 0xFD {
                    ctx.bank_chr(4, 0x1000, value as i32);
                }
            }
            0xE => {
                self.regs[3] = value;
                if self.latch[1] == 0xFE {
                    ctx.bank_chr(4, 0x1000, value as i32);
                }
            }
            _ => {
                if value & 1 != 0 {
                    ctx.mirror(0, 0, 1, 1);
                } else {
                    ctx.mirror(0, 1, 0, 1);
                }
            }
        }
    }

    fn ppu_latch(&mut self, pages: &mut PageTable, rom: &Rom, base: u16, tile: u8) {
        if tile != 0xFD && tile != 0xFE {
            return;
        }
        let offset = (tile - 0xFD) as usize;
        let reg = if base != 0 {
            self.latch[1] = tile;
            2 + offset
        } else {
            self.latch[0] = tile;
            offset
        };
        bank::bank_chr(pages, rom, 4, base, self.regs[reg] as i32);
    }

    fn save_state(&self, state: &mut MapperState) {
        state[..2].copy_from_slice(&self.latch);
        state[2..6].copy_from_slice(&self.regs);
    }

    fn load_state(&mut self, state: &MapperState) {
        self.latch.copy_from_slice(&state[..2]);
        self.regs.copy_from_slice(&state[2..6]);
    }
}
