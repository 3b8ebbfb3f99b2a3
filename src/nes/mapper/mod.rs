mod discrete;
mod konami;
mod licensee;
mod multicart;
mod nintendo;

use std::collections::VecDeque;

use anyhow::{Result, bail};

use super::apu::ext::ExtKind;
use super::bank::{self, Page, PageTable, Region};
use super::cartridge::{PRG_BANK_SIZE, Rom};
use super::cpu::Cpu;
use super::ppu::Ppu;

pub use super::bank::LAST_BANK;

/// Size of the mapper-private area of an `MPRD` save-state block.
pub const MAPPER_STATE_LEN: usize = 128;

pub type MapperState = [u8; MAPPER_STATE_LEN];

/// Everything a mapper may touch while handling a bus access or a timing callback.
pub struct MapperCtx<'a> {
    pub cpu: &'a mut Cpu,
    pub ppu: &'a mut Ppu,
    pub rom: &'a mut Rom,
    pub events: &'a mut VecDeque<String>,
    pub scanline: i32,
}

impl MapperCtx<'_> {
    pub fn log<S: Into<String>>(&mut self, message: S) {
        super::push_event(self.events, message);
    }

    pub fn bank_prg(&mut self, size_kb: usize, addr: u16, bank: i32) {
        bank::bank_prg(&mut self.cpu.pages, self.rom, size_kb, addr, bank);
    }

    pub fn bank_chr(&mut self, size_kb: usize, addr: u16, bank: i32) {
        bank::bank_chr(&mut self.ppu.pages, self.rom, size_kb, addr, bank);
    }

    pub fn mirror(&mut self, nt0: usize, nt1: usize, nt2: usize, nt3: usize) {
        self.ppu.mirror(nt0, nt1, nt2, nt3);
    }

    pub fn irq(&mut self) {
        self.cpu.irq(self.rom);
    }

    pub fn ppu_enabled(&self) -> bool {
        self.ppu.enabled()
    }

    pub fn prg_banks_8k(&self) -> i32 {
        (self.rom.prg.len() / 0x2000) as i32
    }

    pub fn prg_banks_16k(&self) -> usize {
        self.rom.prg.len() / PRG_BANK_SIZE
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.rom.has_flag(flag)
    }

    /// Points one nametable window at a 1KB page of CHR-ROM, or at RAM for values $E0 and up.
    pub fn set_nametable_page(&mut self, table: usize, value: u8) {
        let page = if value < 0xE0 && self.rom.has_chr_rom() {
            let count = (self.rom.chr.len() / 0x400).max(1);
            Page::new(Region::Chr, (value as usize % count) << 10)
        } else if self.rom.has_vram() {
            Page::new(Region::Vram, ((value & 7) as usize) << 10)
        } else {
            Page::new(Region::Nametable, ((value & 3) as usize) << 10)
        };
        self.ppu.pages[8 + (table & 3)] = page;
        self.ppu.mirror_high_pages();
    }
}

/// Cartridge board logic. Only `write_ranges` and `write` are mandatory; the rest are
/// optional hooks that most boards leave alone.
pub trait Mapper {
    fn number(&self) -> u8;

    fn init(&mut self, _ctx: &mut MapperCtx) {}

    /// Ordered `(min, max)` CPU ranges routed to `write`.
    fn write_ranges(&self) -> &'static [(u16, u16)];

    fn write(&mut self, ctx: &mut MapperCtx, addr: u16, value: u8);

    /// Ordered `(min, max)` CPU ranges routed to `read`.
    fn read_ranges(&self) -> &'static [(u16, u16)] {
        &[]
    }

    fn read(&mut self, _ctx: &mut MapperCtx, _addr: u16) -> u8 {
        0xFF
    }

    fn hblank(&mut self, _ctx: &mut MapperCtx, _vblank: bool) {}

    fn vblank(&mut self, _ctx: &mut MapperCtx) {}

    /// Called by the renderer for every fetched tile.
    fn ppu_latch(&mut self, _pages: &mut PageTable, _rom: &Rom, _base: u16, _tile: u8) {}

    /// VS. System CHR select on $4016 writes.
    fn vrom_switch(&mut self, _ctx: &mut MapperCtx, _value: u8) {}

    fn save_state(&self, _state: &mut MapperState) {}

    fn load_state(&mut self, _state: &MapperState) {}

    fn sound_ext(&self) -> Option<ExtKind> {
        None
    }
}

const SUPPORTED: &[u8] = &[
    0, 1, 2, 3, 4, 5, 7, 8, 9, 11, 15, 16, 18, 19, 21, 22, 23, 24, 25, 32, 33, 34, 40, 41, 42,
    46, 50, 64, 65, 66, 70, 73, 75, 78, 79, 85, 87, 93, 94, 99, 160, 229, 231,
];

pub fn is_supported(number: u8) -> bool {
    SUPPORTED.contains(&number)
}

pub fn supported_mappers() -> &'static [u8] {
    SUPPORTED
}

pub fn mapper_name(number: u8) -> &'static str {
    match number {
        0 => "None",
        1 => "MMC1",
        2 => "UNROM",
        3 => "CNROM",
        4 => "MMC3",
        5 => "MMC5",
        7 => "AOROM",
        8 => "Front Far East",
        9 => "MMC2",
        11 => "Color Dreams",
        15 => "Contra 100-in-1",
        16 => "Bandai",
        18 => "Jaleco SS8806",
        19 => "Namco 129/163",
        21 => "Konami VRC4 A",
        22 => "Konami VRC2 A",
        23 => "Konami VRC2 B",
        24 => "Konami VRC6",
        25 => "Konami VRC4 B",
        32 => "Irem G-101",
        33 => "Taito TC0190",
        34 => "Nina-1",
        40 => "SMB 2j (pirate)",
        41 => "Caltron 6 in 1",
        42 => "Baby Mario (bootleg)",
        46 => "Pelican Game Station",
        50 => "SMB2j (3rd discovered variant)",
        64 => "Tengen RAMBO-1",
        65 => "Irem H-3001",
        66 => "GNROM",
        70 => "Mapper 70",
        73 => "Konami VRC3",
        75 => "Konami VRC1",
        78 => "Mapper 78",
        79 => "NINA-03/06",
        85 => "Konami VRC7",
        87 => "16K VROM switch",
        93 => "Mapper 93",
        94 => "Mapper 94",
        99 => "VS. System",
        160 => "Aladdin (pirate)",
        229 => "31 in 1 (bootleg)",
        231 => "NINA-07",
        _ => "Unsupported",
    }
}

pub fn create_mapper(number: u8) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match number {
        0 => Box::new(discrete::Nrom),
        1 => Box::new(nintendo::Mmc1::default()),
        2 => Box::new(discrete::Unrom),
        3 => Box::new(discrete::Cnrom),
        4 => Box::new(nintendo::Mmc3::default()),
        5 => Box::new(nintendo::Mmc5::default()),
        7 => Box::new(discrete::Aorom),
        8 => Box::new(discrete::FrontFarEast),
        9 => Box::new(nintendo::Mmc2::default()),
        11 => Box::new(discrete::ColorDreams),
        15 => Box::new(multicart::Contra100),
        16 => Box::new(licensee::Bandai::default()),
        18 => Box::new(licensee::Jaleco::default()),
        19 => Box::new(licensee::Namco::default()),
        21 | 22 | 23 | 25 => Box::new(konami::Vrc2And4::new(number)),
        24 => Box::new(konami::Vrc6::default()),
        32 => Box::new(licensee::IremG101::default()),
        33 => Box::new(licensee::Taito),
        34 => Box::new(discrete::Nina1),
        40 => Box::new(multicart::Smb2jPirate::default()),
        41 => Box::new(multicart::Caltron::default()),
        42 => Box::new(multicart::BabyMario::default()),
        46 => Box::new(multicart::Pelican::default()),
        50 => Box::new(multicart::Smb2jVariant::default()),
        64 => Box::new(licensee::Rambo1::default()),
        65 => Box::new(licensee::IremH3001::default()),
        66 => Box::new(discrete::Gnrom),
        70 => Box::new(discrete::Mapper70),
        73 => Box::new(konami::Vrc3::default()),
        75 => Box::new(konami::Vrc1::default()),
        78 => Box::new(discrete::Mapper78),
        79 => Box::new(discrete::Nina3),
        85 => Box::new(konami::Vrc7::default()),
        87 => Box::new(discrete::Mapper87),
        93 => Box::new(discrete::Mapper93),
        94 => Box::new(discrete::Mapper94),
        99 => Box::new(discrete::VsSystem),
        160 => Box::new(multicart::Aladdin::default()),
        229 => Box::new(multicart::Bootleg31In1),
        231 => Box::new(discrete::Nina7),
        _ => bail!("mapper {number} not yet implemented"),
    };
    Ok(mapper)
}

/// Board-independent layout every cartridge starts from before its own `init`.
pub fn set_default_pages(ctx: &mut MapperCtx) {
    ctx.bank_prg(16, 0x8000, 0);
    ctx.bank_prg(16, 0xC000, LAST_BANK);
    ctx.bank_chr(8, 0x0000, 0);

    if ctx.has_flag(super::cartridge::ROM_FLAG_FOURSCREEN) {
        ctx.mirror(0, 1, 2, 3);
    } else if ctx.rom.mirroring == super::cartridge::Mirroring::Vertical {
        ctx.mirror(0, 1, 0, 1);
    } else {
        ctx.mirror(0, 0, 1, 1);
    }

    if !ctx.rom.has_chr_rom() {
        for i in 0..8 {
            ctx.ppu.pages[i] = Page::new(Region::Vram, i * 0x400);
        }
        ctx.ppu.mirror_high_pages();
    }
}

/// Shared shape of the scanline IRQ counters: `counter` is the live value, `latch` the reload.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IrqCounter {
    pub counter: i32,
    pub latch: i32,
    pub enabled: bool,
    pub reset: bool,
    pub wait_state: bool,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nes::cartridge::tests::make_rom;

    pub(crate) struct Board {
        pub cpu: Cpu,
        pub ppu: Ppu,
        pub rom: Rom,
        pub events: VecDeque<String>,
        pub mapper: Box<dyn Mapper>,
    }

    impl Board {
        pub(crate) fn new(number: u8, prg_banks: u8, chr_banks: u8) -> Self {
            let rom = make_rom(number, prg_banks, chr_banks);
            let mut board = Self {
                cpu: Cpu::new(),
                ppu: Ppu::new(),
                events: VecDeque::new(),
                mapper: create_mapper(number).expect("supported mapper"),
                rom,
            };
            let Board {
                cpu,
                ppu,
                rom,
                events,
                mapper,
            } = &mut board;
            let mut ctx = MapperCtx {
                cpu,
                ppu,
                rom,
                events,
                scanline: 0,
            };
            set_default_pages(&mut ctx);
            mapper.init(&mut ctx);
            board
        }

        pub(crate) fn with<R>(
            &mut self,
            scanline: i32,
            f: impl FnOnce(&mut dyn Mapper, &mut MapperCtx) -> R,
        ) -> R {
            let Board {
                cpu,
                ppu,
                rom,
                events,
                mapper,
            } = self;
            let mut ctx = MapperCtx {
                cpu,
                ppu,
                rom,
                events,
                scanline,
            };
            f(mapper.as_mut(), &mut ctx)
        }

        pub(crate) fn write(&mut self, addr: u16, value: u8) {
            self.with(0, |mapper, ctx| mapper.write(ctx, addr, value));
        }

        pub(crate) fn read(&mut self, addr: u16) -> u8 {
            self.with(0, |mapper, ctx| mapper.read(ctx, addr))
        }

        pub(crate) fn hblank(&mut self, scanline: i32, vblank: bool) {
            self.with(scanline, |mapper, ctx| mapper.hblank(ctx, vblank));
        }

        pub(crate) fn irq_pending(&self) -> bool {
            self.cpu.int_pending
        }

        /// 8KB PRG bank visible at `addr`; the test images tag every 8KB bank with its index.
        pub(crate) fn prg_at(&self, addr: u16) -> u8 {
            self.cpu.read_page(&self.rom, addr)
        }

        /// 1KB CHR bank visible at `addr`.
        pub(crate) fn chr_at(&self, addr: u16) -> u8 {
            self.ppu.read_mem(&self.rom, addr)
        }
    }

    #[test]
    fn every_supported_mapper_maps_the_whole_rom_window() {
        for &number in supported_mappers() {
            let board = Board::new(number, 8, 4);
            for page in 8..16 {
                assert_eq!(
                    board.cpu.pages[page].region,
                    Region::Prg,
                    "mapper {number} left page {page:X} unmapped"
                );
            }
        }
    }

    #[test]
    fn default_layout_pins_last_bank_high() {
        let board = Board::new(0, 8, 1);
        assert_eq!(board.prg_at(0x8000), 0);
        assert_eq!(board.prg_at(0xC000), 14);
        assert_eq!(board.prg_at(0xE000), 15);
    }

    #[test]
    fn registry_rejects_unknown_boards() {
        assert!(create_mapper(200).is_err());
        assert!(!is_supported(200));
        assert_eq!(mapper_name(200), "Unsupported");
        assert_eq!(mapper_name(4), "MMC3");
    }

    #[test]
    fn chr_ram_carts_get_vram_pattern_pages() {
        let board = Board::new(2, 4, 0);
        for i in 0..8 {
            assert_eq!(board.ppu.pages[i], Page::new(Region::Vram, i * 0x400));
        }
    }

    #[test]
    fn namco_nametable_fallback_uses_internal_ram_without_vram() {
        let mut board = Board::new(19, 4, 2);
        board.write(0xC000, 0xE1);
        assert_eq!(board.ppu.pages[8], Page::new(Region::Nametable, 0x400));
        assert_eq!(board.ppu.pages[12], board.ppu.pages[8]);
        board.write(0xC800, 0x03);
        assert_eq!(board.ppu.pages[9], Page::new(Region::Chr, 3 * 0x400));
    }
}
