use super::cartridge::Rom;

/// Bank index that always resolves to the final physical bank of the requested size.
pub const LAST_BANK: i32 = -1;

pub const CPU_PAGE_SHIFT: u16 = 12;
pub const CPU_PAGE_SIZE: usize = 0x1000;
pub const PPU_PAGE_SHIFT: u16 = 10;
pub const PPU_PAGE_SIZE: usize = 0x400;

/// Backing store a page window points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Dead,
    Ram,
    Prg,
    Chr,
    Sram,
    Vram,
    Nametable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub region: Region,
    pub offset: usize,
}

impl Page {
    pub const DEAD: Page = Page {
        region: Region::Dead,
        offset: 0,
    };

    pub const fn new(region: Region, offset: usize) -> Self {
        Self { region, offset }
    }
}

pub type PageTable = [Page; 16];

fn resolve_bank(bank: i32, count: usize) -> usize {
    let count = count.max(1);
    if bank == LAST_BANK {
        count - 1
    } else {
        (bank as i64).rem_euclid(count as i64) as usize
    }
}

/// Maps `size_kb` (8, 16 or 32) of PRG-ROM at `addr` in CPU space.
pub fn bank_prg(pages: &mut PageTable, rom: &Rom, size_kb: usize, addr: u16, bank: i32) {
    let size = size_kb * 1024;
    let count = rom.prg.len() / size;
    let base = resolve_bank(bank, count) * size;
    let first = (addr >> CPU_PAGE_SHIFT) as usize;
    for i in 0..size / CPU_PAGE_SIZE {
        if let Some(page) = pages.get_mut(first + i) {
            *page = Page::new(Region::Prg, base + i * CPU_PAGE_SIZE);
        }
    }
}

/// Maps `size_kb` (1, 2, 4 or 8) of CHR-ROM at `addr` in PPU space. CHR-RAM boards ignore this.
pub fn bank_chr(pages: &mut PageTable, rom: &Rom, size_kb: usize, addr: u16, bank: i32) {
    if !rom.has_chr_rom() {
        return;
    }
    let size = size_kb * 1024;
    let count = rom.chr.len() / size;
    let base = resolve_bank(bank, count) * size;
    let first = ((addr & 0x1FFF) >> PPU_PAGE_SHIFT) as usize;
    for i in 0..size / PPU_PAGE_SIZE {
        if let Some(page) = pages.get_mut(first + i) {
            *page = Page::new(Region::Chr, base + i * PPU_PAGE_SIZE);
        }
    }
}

/// Which 8KB PRG bank a CPU window currently shows, for snapshots.
pub fn prg_bank_of(pages: &PageTable, addr: u16) -> u16 {
    (pages[(addr >> CPU_PAGE_SHIFT) as usize].offset >> 13) as u16
}

/// Which 1KB CHR bank a PPU window currently shows, for snapshots.
pub fn chr_bank_of(pages: &PageTable, index: usize) -> u16 {
    (pages[index].offset >> 10) as u16
}
