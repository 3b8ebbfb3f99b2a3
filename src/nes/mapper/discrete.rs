//! Latch-only boards: one register, no IRQ, no private state.

use super::{LAST_BANK, Mapper, MapperCtx};
use crate::nes::cartridge::ROM_FLAG_FOURSCREEN;

const ROM_WINDOW: &[(u16, u16)] = &[(0x8000, 0xFFFF)];

fn mirror_one_screen(ctx: &mut MapperCtx, screen: u8) {
    let screen = screen as usize;
    ctx.mirror(screen, screen, screen, screen);
}

fn mirror_hv(ctx: &mut MapperCtx, horizontal: bool) {
    if horizontal {
        ctx.mirror(0, 0, 1, 1);
    } else {
        ctx.mirror(0, 1, 0, 1);
    }
}

pub struct Nrom;

impl Mapper for Nrom {
    fn number(&self) -> u8 {
        0
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[]
    }

    fn write(&mut self, _ctx: &mut MapperCtx, _addr: u16, _value: u8) {}
}

pub struct Unrom;

impl Mapper for Unrom {
    fn number(&self) -> u8 {
        2
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, value as i32);
    }
}

pub struct Cnrom;

impl Mapper for Cnrom {
    fn number(&self) -> u8 {
        3
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_chr(8, 0x0000, value as i32);
    }
}

pub struct Aorom;

impl Mapper for Aorom {
    fn number(&self) -> u8 {
        7
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(32, 0x8000, value as i32);
        mirror_one_screen(ctx, (value & 0x10) >> 4);
    }
}

pub struct FrontFarEast;

impl Mapper for FrontFarEast {
    fn number(&self) -> u8 {
        8
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, (value >> 3) as i32);
        ctx.bank_chr(8, 0x0000, (value & 7) as i32);
    }
}

pub struct ColorDreams;

impl Mapper for ColorDreams {
    fn number(&self) -> u8 {
        11
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(32, 0x8000, (value & 0x0F) as i32);
        ctx.bank_chr(8, 0x0000, (value >> 4) as i32);
    }
}

/// NINA-001: PRG at $7FFD or anywhere in ROM space, two 4KB CHR ports.
pub struct Nina1;

impl Mapper for Nina1 {
    fn number(&self) -> u8 {
        34
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, LAST_BANK);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x7FFD, 0xFFFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if addr & 0x8000 != 0 || addr == 0x7FFD {
            ctx.bank_prg(32, 0x8000, value as i32);
        } else if addr == 0x7FFE {
            ctx.bank_chr(4, 0x0000, value as i32);
        } else if addr == 0x7FFF {
            ctx.bank_chr(4, 0x1000, value as i32);
        }
    }
}

pub struct Gnrom;

impl Mapper for Gnrom {
    fn number(&self) -> u8 {
        66
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
        ctx.bank_chr(8, 0x0000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(32, 0x8000, ((value >> 4) & 3) as i32);
        ctx.bank_chr(8, 0x0000, (value & 3) as i32);
    }
}

/// Bandai 74161 board. The four-screen header bit picks what D7 means.
pub struct Mapper70;

impl Mapper for Mapper70 {
    fn number(&self) -> u8 {
        70
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, ((value >> 4) & 7) as i32);
        ctx.bank_chr(8, 0x0000, (value & 0x0F) as i32);
        if ctx.has_flag(ROM_FLAG_FOURSCREEN) {
            mirror_hv(ctx, value & 0x80 != 0);
        } else {
            mirror_one_screen(ctx, (value & 0x80) >> 7);
        }
    }
}

/// Irem 74161 board; same abuse of the four-screen bit as mapper 70.
pub struct Mapper78;

impl Mapper for Mapper78 {
    fn number(&self) -> u8 {
        78
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, (value & 7) as i32);
        ctx.bank_chr(8, 0x0000, ((value >> 4) & 0x0F) as i32);
        if ctx.has_flag(ROM_FLAG_FOURSCREEN) {
            mirror_hv(ctx, value & 0x08 == 0);
        } else {
            mirror_one_screen(ctx, (value >> 3) & 1);
        }
    }
}

/// NINA-03/06: the latch decodes at $4100 with A8 set.
pub struct Nina3;

impl Mapper for Nina3 {
    fn number(&self) -> u8 {
        79
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, 0);
        ctx.bank_chr(8, 0x0000, 0);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x4100, 0x5FFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8) {
        if addr & 0x5100 == 0x4100 {
            ctx.bank_prg(32, 0x8000, ((value >> 3) & 1) as i32);
            ctx.bank_chr(8, 0x0000, (value & 7) as i32);
        }
    }
}

pub struct Mapper87;

impl Mapper for Mapper87 {
    fn number(&self) -> u8 {
        87
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[(0x6000, 0x7FFF)]
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        let bank = if value & 0x02 != 0 { 1 } else { 0 };
        ctx.bank_chr(8, 0x0000, bank);
    }
}

pub struct Mapper93;

impl Mapper for Mapper93 {
    fn number(&self) -> u8 {
        93
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, (value >> 4) as i32);
        mirror_hv(ctx, value & 1 == 0);
    }
}

pub struct Mapper94;

impl Mapper for Mapper94 {
    fn number(&self) -> u8 {
        94
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        ctx.bank_prg(16, 0x8000, (value >> 2) as i32);
    }
}

/// VS. System: four-screen nametables, CHR picked by bit 2 of the $4016 strobe.
pub struct VsSystem;

impl Mapper for VsSystem {
    fn number(&self) -> u8 {
        99
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.mirror(0, 1, 2, 3);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        &[]
    }

    fn write(&mut self, _ctx: &mut MapperCtx, _addr: u16, _value: u8) {}

    fn vrom_switch(&mut self, ctx: &mut MapperCtx, value: u8) {
        ctx.bank_chr(8, 0x0000, ((value & 0x04) >> 2) as i32);
    }
}

pub struct Nina7;

impl Mapper for Nina7 {
    fn number(&self) -> u8 {
        231
    }

    fn init(&mut self, ctx: &mut MapperCtx) {
        ctx.bank_prg(32, 0x8000, LAST_BANK);
    }

    fn write_ranges(&self) -> &'static [(u16, u16)] {
        ROM_WINDOW
    }

    fn write(&mut self, ctx: &mut MapperCtx, _addr: u16, value: u8) {
        let bank = ((value & 0x80) >> 5) | (value & 0x03);
        ctx.bank_prg(32, 0x8000, bank as i32);
        ctx.bank_chr(8, 0x0000, ((value >> 4) & 7) as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Board;
    use crate::nes::bank::Region;

    #[test]
    fn unrom_switches_low_window_only() {
        let mut board = Board::new(2, 8, 0);
        board.write(0x8000, 3);
        assert_eq!(board.prg_at(0x8000), 6);
        assert_eq!(board.prg_at(0xC000), 14);
    }

    #[test]
    fn cnrom_switches_chr() {
        let mut board = Board::new(3, 2, 4);
        board.write(0xFFFF, 2);
        assert_eq!(board.chr_at(0x0000), 16);
        assert_eq!(board.chr_at(0x1C00), 23);
    }

    #[test]
    fn aorom_selects_single_screen() {
        let mut board = Board::new(7, 8, 0);
        assert_eq!(board.prg_at(0xE000), 3);
        board.write(0x8000, 0x12);
        assert_eq!(board.prg_at(0x8000), 8);
        assert!(board.ppu.pages[8..16].iter().all(|p| p.offset == 0x400));
        board.write(0x8000, 0x00);
        assert!(board.ppu.pages[8..16].iter().all(|p| p.offset == 0));
    }

    #[test]
    fn nina1_decodes_cart_ram_ports() {
        let mut board = Board::new(34, 8, 4);
        assert_eq!(board.prg_at(0x8000), 12);
        board.write(0x7FFD, 1);
        assert_eq!(board.prg_at(0x8000), 4);
        board.write(0x7FFE, 3);
        board.write(0x7FFF, 5);
        assert_eq!(board.chr_at(0x0000), 12);
        assert_eq!(board.chr_at(0x1000), 20);
    }

    #[test]
    fn mapper70_uses_fourscreen_bit_for_mirroring_mode() {
        let mut board = Board::new(70, 8, 8);
        board.write(0x8000, 0x80 | 0x25);
        assert_eq!(board.prg_at(0x8000), 4);
        assert_eq!(board.chr_at(0x0000), 40);
        assert!(board.ppu.pages[8..12].iter().all(|p| p.offset == 0x400));
    }

    #[test]
    fn nina3_ignores_writes_without_a8() {
        let mut board = Board::new(79, 4, 4);
        board.write(0x4000 | 0x1000, 0x0B);
        assert_eq!(board.chr_at(0x0000), 0);
        board.write(0x4100, 0x0B);
        assert_eq!(board.prg_at(0x8000), 4);
        assert_eq!(board.chr_at(0x0000), 24);
    }

    #[test]
    fn vs_system_switches_chr_from_strobe() {
        let mut board = Board::new(99, 2, 2);
        assert_eq!(board.ppu.pages[11].offset, 0xC00);
        board.with(0, |mapper, ctx| mapper.vrom_switch(ctx, 0x04));
        assert_eq!(board.chr_at(0x0000), 8);
        assert_eq!(board.ppu.pages[0].region, Region::Chr);
    }

    #[test]
    fn nina7_bank_bits() {
        let mut board = Board::new(231, 16, 8);
        assert_eq!(board.prg_at(0x8000), 28);
        board.write(0x8000, 0x81 | 0x30);
        assert_eq!(board.prg_at(0x8000), 20);
        assert_eq!(board.chr_at(0x0000), 24);
    }
}
