use super::Prng;
use super::bank::{PPU_PAGE_SHIFT, PPU_PAGE_SIZE, Page, PageTable, Region};
use super::cartridge::Rom;
use super::mapper::Mapper;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

pub const NAMETABLE_SIZE: usize = 0x1000;
pub const OAM_SIZE: usize = 256;
pub const PALETTE_SIZE: usize = 32;

const CTRL_NMI_ENABLE: u8 = 0x80;
const CTRL_SPRITE_SIZE_16: u8 = 0x20;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_VRAM_INC_32: u8 = 0x04;

const MASK_SHOW_SPRITES: u8 = 0x10;
const MASK_SHOW_BG: u8 = 0x08;
const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
const MASK_SHOW_BG_LEFT: u8 = 0x02;

const STATUS_VBLANK: u8 = 0x80;
const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
const STATUS_SPRITE_OVERFLOW: u8 = 0x20;

const OAM_VFLIP: u8 = 0x80;
const OAM_HFLIP: u8 = 0x40;
const OAM_BEHIND: u8 = 0x20;

const MAX_SPRITES_PER_LINE: usize = 8;

/// Marker bits kept in the line buffer alongside the 6-bit palette index.
const BG_TRANSPARENT: u8 = 0x80;
const SPRITE_PIXEL: u8 = 0x40;
const PIXEL_MASK: u8 = 0x3F;

/// The background is drawn up to 7 pixels left of the screen and 33 tiles wide.
const LINE_MARGIN: usize = 8;
const LINE_LEN: usize = FRAME_WIDTH + 2 * LINE_MARGIN;

/// Marks "no strike this frame".
pub const STRIKE_NONE: u64 = u64::MAX;

/// Scanline renderer with banked pattern/nametable pages and deferred sprite-0 timing.
///
/// Each visible line is rendered in one go at the start of its CPU slice. A sprite-0
/// hit found while rendering is recorded as a CPU-cycle deadline (3 pixels per cycle)
/// so that $2002 polling reports it at roughly the right time.
pub struct Ppu {
    pub(crate) ctrl0: u8,
    pub(crate) ctrl1: u8,
    pub(crate) stat: u8,
    pub(crate) oam_addr: u8,
    pub(crate) latch: u8,
    pub(crate) vdata_latch: u8,
    pub(crate) vaddr: u16,
    pub(crate) vaddr_latch: u16,
    pub(crate) tile_xofs: u8,
    pub(crate) flipflop: bool,
    pub(crate) strike: bool,
    pub(crate) strike_cycle: u64,
    pub(crate) vram_accessible: bool,
    pub(crate) draw_sprites: bool,

    pub(crate) pages: PageTable,
    pub(crate) nametab: [u8; NAMETABLE_SIZE],
    pub(crate) oam: [u8; OAM_SIZE],
    pub(crate) palette: [u8; PALETTE_SIZE],

    /// Scanline currently being run, for diagnostics.
    pub(crate) scanline: i32,
    pub(crate) notes: Vec<String>,

    line: [u8; LINE_LEN],
    frame: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        let mut palette = [0; PALETTE_SIZE];
        for i in 0..8 {
            palette[i << 2] = BG_TRANSPARENT;
        }
        let mut ppu = Self {
            ctrl0: 0,
            ctrl1: 0,
            stat: 0,
            oam_addr: 0,
            latch: 0,
            vdata_latch: 0,
            vaddr: 0,
            vaddr_latch: 0,
            tile_xofs: 0,
            flipflop: false,
            strike: false,
            strike_cycle: STRIKE_NONE,
            vram_accessible: true,
            draw_sprites: true,
            pages: [Page::DEAD; 16],
            nametab: [0; NAMETABLE_SIZE],
            oam: [0; OAM_SIZE],
            palette,
            scanline: 0,
            notes: Vec::new(),
            line: [0; LINE_LEN],
            frame: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
        };
        ppu.mirror(0, 0, 1, 1);
        ppu.soft_reset();
        ppu
    }

    fn soft_reset(&mut self) {
        self.ctrl0 = 0;
        self.ctrl1 = MASK_SHOW_SPRITES | MASK_SHOW_BG;
        self.stat = 0;
        self.flipflop = false;
        self.vaddr = 0x2000;
        self.vaddr_latch = 0x2000;
        self.oam_addr = 0;
        self.tile_xofs = 0;
        self.latch = 0;
        self.vram_accessible = true;
    }

    /// Power-on resets also scramble sprite memory.
    pub fn reset(&mut self, hard: bool, prng: &mut Prng) {
        if hard {
            prng.fill(&mut self.oam);
        }
        self.soft_reset();
    }

    pub fn enabled(&self) -> bool {
        self.bg_on() || self.obj_on()
    }

    pub fn set_draw_sprites(&mut self, draw: bool) {
        self.draw_sprites = draw;
    }

    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }

    fn bg_on(&self) -> bool {
        self.ctrl1 & MASK_SHOW_BG != 0
    }

    fn obj_on(&self) -> bool {
        self.ctrl1 & MASK_SHOW_SPRITES != 0
    }

    fn obj_height(&self) -> i32 {
        if self.ctrl0 & CTRL_SPRITE_SIZE_16 != 0 { 16 } else { 8 }
    }

    fn bg_base(&self) -> u16 {
        if self.ctrl0 & CTRL_BG_TABLE != 0 { 0x1000 } else { 0 }
    }

    fn obj_base(&self) -> u16 {
        if self.ctrl0 & CTRL_SPRITE_TABLE != 0 { 0x1000 } else { 0 }
    }

    fn vaddr_inc(&self) -> u16 {
        if self.ctrl0 & CTRL_VRAM_INC_32 != 0 { 32 } else { 1 }
    }

    /// Points the four nametable windows at 1KB slices of internal nametable RAM.
    pub fn mirror(&mut self, nt0: usize, nt1: usize, nt2: usize, nt3: usize) {
        for (i, nt) in [nt0, nt1, nt2, nt3].into_iter().enumerate() {
            self.pages[8 + i] = Page::new(Region::Nametable, (nt & 3) << 10);
        }
        self.mirror_high_pages();
    }

    /// $3000-$3FFF shadows $2000-$2FFF.
    pub fn mirror_high_pages(&mut self) {
        for i in 0..4 {
            self.pages[12 + i] = self.pages[8 + i];
        }
    }

    pub(crate) fn read_mem(&self, rom: &Rom, addr: u16) -> u8 {
        let page = self.pages[((addr >> PPU_PAGE_SHIFT) & 0x0F) as usize];
        let index = page.offset + (addr as usize & (PPU_PAGE_SIZE - 1));
        match page.region {
            Region::Nametable => self.nametab[index & (NAMETABLE_SIZE - 1)],
            Region::Dead => 0,
            region => rom.read(region, index),
        }
    }

    pub(crate) fn write_mem(&mut self, rom: &mut Rom, addr: u16, value: u8) {
        let page = self.pages[((addr >> PPU_PAGE_SHIFT) & 0x0F) as usize];
        let index = page.offset + (addr as usize & (PPU_PAGE_SIZE - 1));
        match page.region {
            Region::Nametable => self.nametab[index & (NAMETABLE_SIZE - 1)] = value,
            Region::Dead => {}
            region => rom.write(region, index, value),
        }
    }

    /// CPU read of $2000-$3FFF. `cpu_cycles` is the live CPU clock, compared against
    /// the pending sprite-0 deadline.
    pub fn read_register(&mut self, rom: &Rom, addr: u16, cpu_cycles: u64) -> u8 {
        match addr & 0x2007 {
            0x2002 => {
                let mut value = (self.stat & 0xE0) | (self.latch & 0x1F);
                if self.strike && cpu_cycles >= self.strike_cycle {
                    value |= STATUS_SPRITE_ZERO_HIT;
                }
                self.stat &= !STATUS_VBLANK;
                self.flipflop = false;
                value
            }
            0x2007 => {
                let value = self.vdata_latch;
                self.latch = value;
                if self.enabled() && !self.vram_accessible {
                    self.vdata_latch = 0xFF;
                    self.notes.push(format!(
                        "VRAM read at ${:04X}, scanline {}",
                        self.vaddr, self.scanline
                    ));
                } else {
                    let addr = if self.vaddr >= 0x3000 {
                        self.vaddr - 0x1000
                    } else {
                        self.vaddr
                    };
                    self.vdata_latch = self.read_mem(rom, addr);
                }
                self.vaddr = self.vaddr.wrapping_add(self.vaddr_inc()) & 0x3FFF;
                value
            }
            _ => self.latch,
        }
    }

    /// CPU write of $2000-$3FFF.
    pub fn write_register(&mut self, rom: &mut Rom, addr: u16, value: u8) {
        self.latch = value;

        match addr & 0x2007 {
            0x2000 => {
                self.ctrl0 = value;
                self.vaddr_latch = (self.vaddr_latch & !0x0C00) | (((value & 3) as u16) << 10);
            }
            0x2001 => self.ctrl1 = value,
            0x2003 => self.oam_addr = value,
            0x2004 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            0x2005 => {
                if !self.flipflop {
                    self.vaddr_latch = (self.vaddr_latch & !0x001F) | (value >> 3) as u16;
                    self.tile_xofs = value & 7;
                } else {
                    self.vaddr_latch &= !0x73E0;
                    self.vaddr_latch |= ((value & 0xF8) as u16) << 2;
                    self.vaddr_latch |= ((value & 7) as u16) << 12;
                }
                self.flipflop = !self.flipflop;
            }
            0x2006 => {
                if !self.flipflop {
                    self.vaddr_latch = (self.vaddr_latch & 0x00FF) | (((value & 0x3F) as u16) << 8);
                } else {
                    self.vaddr_latch = (self.vaddr_latch & 0xFF00) | value as u16;
                    self.vaddr = self.vaddr_latch;
                }
                self.flipflop = !self.flipflop;
            }
            0x2007 => {
                self.write_vdata(rom, value);
                self.vaddr = self.vaddr.wrapping_add(self.vaddr_inc()) & 0x3FFF;
            }
            _ => {}
        }
    }

    fn write_vdata(&mut self, rom: &mut Rom, value: u8) {
        if self.vaddr < 0x3F00 {
            if self.enabled() && !self.vram_accessible {
                self.notes.push(format!(
                    "VRAM write to ${:04X}, scanline {}",
                    self.vaddr, self.scanline
                ));
                self.write_mem(rom, self.vaddr, 0xFF);
            } else {
                self.write_mem(rom, self.vaddr, value);
            }
        } else if self.vaddr & 0x0F == 0 {
            for i in 0..8 {
                self.palette[i << 2] = (value & PIXEL_MASK) | BG_TRANSPARENT;
            }
        } else if self.vaddr & 3 != 0 {
            self.palette[(self.vaddr & 0x1F) as usize] = value & PIXEL_MASK;
        }
    }

    /// $4014: copies a CPU page into OAM starting at the current OAM address.
    /// The first 8 bytes are then rewritten from the page depending on address bit 2.
    pub fn write_oam_dma(&mut self, bytes: &[u8; OAM_SIZE]) {
        let start = self.oam_addr;
        for (i, &byte) in bytes.iter().enumerate() {
            self.oam[start.wrapping_add(i as u8) as usize] = byte;
        }

        if (start >> 2) & 1 != 0 {
            self.oam[4..8].copy_from_slice(&bytes[0..4]);
            self.oam[0..4].copy_from_slice(&bytes[252..256]);
        } else {
            self.oam[0..8].copy_from_slice(&bytes[0..8]);
        }
    }

    /// Whether the vblank NMI is enabled in $2000.
    pub fn nmi_enabled(&self) -> bool {
        self.ctrl0 & CTRL_NMI_ENABLE != 0
    }

    pub fn in_vblank(&self) -> bool {
        self.stat & STATUS_VBLANK != 0
    }

    /// Start-of-line work: render visible lines, raise or drop the vblank window.
    pub fn scanline(
        &mut self,
        rom: &Rom,
        mapper: Option<&mut (dyn Mapper + 'static)>,
        line: i32,
        draw: bool,
        cpu_cycles: u64,
    ) {
        self.scanline = line;
        if line < FRAME_HEIGHT as i32 {
            self.stat &= !STATUS_SPRITE_OVERFLOW;
            self.render_line(rom, mapper, line, draw, cpu_cycles);
        } else if line == 241 {
            self.stat |= STATUS_VBLANK;
            self.vram_accessible = true;
        } else if line == 261 {
            self.stat &= !STATUS_VBLANK;
            self.strike = false;
            self.strike_cycle = STRIKE_NONE;
            self.vram_accessible = false;
        }
    }

    /// End-of-line VRAM address advance (fine y, then coarse y with nametable wrap).
    pub fn end_scanline(&mut self, line: i32) {
        if line >= FRAME_HEIGHT as i32 || !self.enabled() {
            return;
        }

        if self.vaddr >> 12 == 7 {
            self.vaddr &= !0x7000;
            match (self.vaddr >> 5) & 0x1F {
                29 => {
                    self.vaddr &= !0x03E0;
                    self.vaddr ^= 0x0800;
                }
                31 => self.vaddr &= !0x03E0,
                _ => self.vaddr += 0x20,
            }
        } else {
            self.vaddr += 0x1000;
        }
    }

    fn render_line(
        &mut self,
        rom: &Rom,
        mut mapper: Option<&mut (dyn Mapper + 'static)>,
        line: i32,
        draw: bool,
        cpu_cycles: u64,
    ) {
        if self.enabled() {
            if line == 0 {
                self.vaddr = self.vaddr_latch;
            } else {
                self.vaddr = (self.vaddr & !0x041F) | (self.vaddr_latch & 0x041F);
            }
        }

        if draw {
            self.render_background(rom, mapper.as_deref_mut());
        }

        if draw && self.draw_sprites {
            self.render_sprites(rom, mapper, line, cpu_cycles);
        } else {
            self.fake_sprite_zero(rom, line, cpu_cycles);
        }

        if draw {
            let row = line as usize * FRAME_WIDTH;
            self.frame[row..row + FRAME_WIDTH]
                .copy_from_slice(&self.line[LINE_MARGIN..LINE_MARGIN + FRAME_WIDTH]);
        }
    }

    fn full_bg(&self) -> u8 {
        self.palette[0] | BG_TRANSPARENT
    }

    fn render_background(
        &mut self,
        rom: &Rom,
        mut mapper: Option<&mut (dyn Mapper + 'static)>,
    ) {
        if !self.bg_on() {
            let fill = self.full_bg();
            self.line.fill(fill);
            return;
        }

        let mut x = LINE_MARGIN - self.tile_xofs as usize;
        let mut refresh_vaddr = 0x2000 + (self.vaddr & 0x0FE0);
        let mut x_tile = self.vaddr & 0x1F;
        let y_tile = (self.vaddr >> 5) & 0x1F;
        let bg_offset = ((self.vaddr >> 12) & 7) + self.bg_base();
        let bg_base = self.bg_base();

        let mut tile_addr = refresh_vaddr + x_tile;
        let mut attrib_base = (refresh_vaddr & 0x2C00) + 0x3C0 + ((y_tile & 0x1C) << 1);
        let mut attrib_addr = attrib_base + (x_tile >> 2);
        let mut attrib = self.read_mem(rom, attrib_addr);
        attrib_addr += 1;
        let mut attrib_shift = (x_tile & 2) + ((y_tile & 2) << 1);
        let mut col_high = ((attrib >> attrib_shift) & 3) << 2;

        for _ in 0..33 {
            let tile = self.read_mem(rom, tile_addr);
            tile_addr += 1;
            let data = bg_offset + ((tile as u16) << 4);
            let lo = self.read_mem(rom, data);
            let hi = self.read_mem(rom, data + 8);

            if let Some(mapper) = mapper.as_deref_mut() {
                mapper.ppu_latch(&mut self.pages, rom, bg_base, tile);
            }

            for px in 0..8 {
                let color = tile_pixel(lo, hi, px);
                self.line[x + px] = self.palette[(col_high + color) as usize];
            }
            x += 8;

            x_tile += 1;
            if x_tile & 1 == 0 {
                if x_tile & 3 == 0 {
                    if x_tile == 32 {
                        x_tile = 0;
                        refresh_vaddr ^= 1 << 10;
                        attrib_base ^= 1 << 10;
                        tile_addr = refresh_vaddr;
                        attrib_addr = attrib_base;
                    }
                    attrib = self.read_mem(rom, attrib_addr);
                    attrib_addr += 1;
                }
                attrib_shift ^= 2;
                col_high = ((attrib >> attrib_shift) & 3) << 2;
            }
        }

        if self.ctrl1 & MASK_SHOW_BG_LEFT == 0 {
            let fill = self.full_bg();
            self.line[LINE_MARGIN..LINE_MARGIN + 8].fill(fill);
        }
    }

    /// Pattern address of the row of `sprite` that lands on `line`.
    fn sprite_row_addr(&self, tile: u8, attrib: u8, sprite_y: i32, line: i32) -> u16 {
        let height = self.obj_height();
        let base = if height == 16 {
            (((tile & 1) as u16) << 12) | (((tile & 0xFE) as u16) << 4)
        } else {
            self.obj_base() + ((tile as u16) << 4)
        };

        let mut y_offset = line - sprite_y;
        if y_offset > 7 {
            y_offset += 8;
        }
        if attrib & OAM_VFLIP != 0 {
            let flip = if height == 16 { 23 } else { 7 };
            (base as i32 + flip - y_offset) as u16
        } else {
            (base as i32 + y_offset) as u16
        }
    }

    fn sprite_on_line(&self, sprite_y: i32, line: i32, limit: i32) -> bool {
        !(sprite_y > line || sprite_y <= line - self.obj_height() || sprite_y == 0 || sprite_y >= limit)
    }

    fn set_strike(&mut self, pixel: usize, cpu_cycles: u64) {
        if !self.strike {
            self.strike = true;
            self.strike_cycle = cpu_cycles + (pixel / 3) as u64;
        }
    }

    fn render_sprites(
        &mut self,
        rom: &Rom,
        mut mapper: Option<&mut (dyn Mapper + 'static)>,
        line: i32,
        cpu_cycles: u64,
    ) {
        if !self.obj_on() {
            return;
        }

        let mut saved = [0u8; 8];
        saved.copy_from_slice(&self.line[LINE_MARGIN..LINE_MARGIN + 8]);
        let obj_base = self.obj_base();
        let mut count = 0;

        for sprite in 0..64 {
            let entry = sprite * 4;
            let sprite_y = self.oam[entry] as i32 + 1;
            if !self.sprite_on_line(sprite_y, line, 240) {
                continue;
            }
            if count == MAX_SPRITES_PER_LINE {
                self.stat |= STATUS_SPRITE_OVERFLOW;
                break;
            }
            count += 1;

            let tile = self.oam[entry + 1];
            let attrib = self.oam[entry + 2];
            let sprite_x = self.oam[entry + 3] as usize;

            if let Some(mapper) = mapper.as_deref_mut() {
                mapper.ppu_latch(&mut self.pages, rom, obj_base, tile);
            }

            let addr = self.sprite_row_addr(tile, attrib, sprite_y, line);
            let lo = self.read_mem(rom, addr);
            let hi = self.read_mem(rom, addr.wrapping_add(8));
            let col_high = 16 + ((attrib & 3) << 2) as usize;
            let check_strike = sprite == 0 && !self.strike;

            if let Some(pixel) = self.draw_sprite_row(sprite_x, attrib, lo, hi, col_high, check_strike) {
                self.set_strike(sprite_x + pixel, cpu_cycles);
            }
        }

        if self.ctrl1 & MASK_SHOW_SPRITE_LEFT == 0 {
            self.line[LINE_MARGIN..LINE_MARGIN + 8].copy_from_slice(&saved);
        }
    }

    /// Draws 8 pixels of one sprite row and reports the first solid-on-solid pixel
    /// when `check_strike` is set.
    fn draw_sprite_row(
        &mut self,
        sprite_x: usize,
        attrib: u8,
        lo: u8,
        hi: u8,
        col_high: usize,
        check_strike: bool,
    ) -> Option<usize> {
        if lo | hi == 0 {
            return None;
        }

        let start = LINE_MARGIN + sprite_x;
        let mut strike = None;
        for px in 0..8 {
            let src = if attrib & OAM_HFLIP != 0 { 7 - px } else { px };
            let color = tile_pixel(lo, hi, src);
            if color == 0 {
                continue;
            }
            let under = self.line[start + px];
            if check_strike && strike.is_none() && under & BG_TRANSPARENT == 0 {
                strike = Some(px);
            }
            let sprite_color = self.palette[col_high + color as usize];
            if attrib & OAM_BEHIND != 0 {
                let shown = if under & BG_TRANSPARENT != 0 { sprite_color } else { under };
                self.line[start + px] = SPRITE_PIXEL | shown;
            } else if under & SPRITE_PIXEL == 0 {
                self.line[start + px] = SPRITE_PIXEL | sprite_color;
            }
        }
        strike
    }

    /// Skipped frames still need sprite-0 timing: the first opaque pixel of sprite 0
    /// counts as a hit, background or not.
    fn fake_sprite_zero(&mut self, rom: &Rom, line: i32, cpu_cycles: u64) {
        if !self.obj_on() || self.strike {
            return;
        }

        let sprite_y = self.oam[0] as i32 + 1;
        if !self.sprite_on_line(sprite_y, line, 241) {
            return;
        }
        let tile = self.oam[1];
        let attrib = self.oam[2];
        let sprite_x = self.oam[3] as usize;

        let addr = self.sprite_row_addr(tile, attrib, sprite_y, line);
        let lo = self.read_mem(rom, addr);
        let hi = self.read_mem(rom, addr.wrapping_add(8));

        let first = (0..8).find(|&px| {
            let src = if attrib & OAM_HFLIP != 0 { 7 - px } else { px };
            tile_pixel(lo, hi, src) != 0
        });
        if let Some(pixel) = first {
            self.set_strike(sprite_x + pixel, cpu_cycles);
        }
    }

    /// 6-bit palette index of the last rendered pixel at `(x, y)`.
    pub fn frame_pixel(&self, x: usize, y: usize) -> u8 {
        self.frame
            .get(y * FRAME_WIDTH + x)
            .map_or(0, |pixel| pixel & PIXEL_MASK)
    }

    /// Copies one row of 6-bit palette indices into `out`.
    pub fn frame_row(&self, y: usize, out: &mut [u8]) {
        let row = y.min(FRAME_HEIGHT - 1) * FRAME_WIDTH;
        for (dst, src) in out.iter_mut().zip(&self.frame[row..row + FRAME_WIDTH]) {
            *dst = src & PIXEL_MASK;
        }
    }

    /// The whole frame with marker bits stripped.
    pub fn frame(&self) -> Vec<u8> {
        self.frame.iter().map(|pixel| pixel & PIXEL_MASK).collect()
    }
}

/// 2-bit color of pixel `px` (0 = leftmost) of a pattern row.
fn tile_pixel(lo: u8, hi: u8, px: usize) -> u8 {
    let bit = 7 - px;
    ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::tests::make_rom;

    fn setup() -> (Ppu, Rom) {
        let rom = make_rom(0, 2, 0);
        let mut ppu = Ppu::new();
        for i in 0..8 {
            ppu.pages[i] = Page::new(Region::Vram, i * 0x400);
        }
        (ppu, rom)
    }

    fn set_addr(ppu: &mut Ppu, rom: &mut Rom, addr: u16) {
        ppu.write_register(rom, 0x2006, (addr >> 8) as u8);
        ppu.write_register(rom, 0x2006, addr as u8);
    }

    #[test]
    fn status_read_resets_address_flipflop() {
        let (mut ppu, mut rom) = setup();
        ppu.write_register(&mut rom, 0x2006, 0x21);
        ppu.read_register(&rom, 0x2002, 0);
        set_addr(&mut ppu, &mut rom, 0x2345);
        assert_eq!(ppu.vaddr, 0x2345);
    }

    #[test]
    fn status_read_clears_vblank() {
        let (mut ppu, rom) = setup();
        ppu.scanline(&rom, None, 241, true, 0);
        assert!(ppu.in_vblank());
        assert_eq!(ppu.read_register(&rom, 0x2002, 0) & 0x80, 0x80);
        assert_eq!(ppu.read_register(&rom, 0x2002, 0) & 0x80, 0);
    }

    #[test]
    fn vram_data_reads_are_buffered() {
        let (mut ppu, mut rom) = setup();
        ppu.write_register(&mut rom, 0x2001, 0);
        set_addr(&mut ppu, &mut rom, 0x2400);
        ppu.write_register(&mut rom, 0x2007, 0x11);
        ppu.write_register(&mut rom, 0x2007, 0x22);
        set_addr(&mut ppu, &mut rom, 0x2400);
        ppu.read_register(&rom, 0x2007, 0);
        assert_eq!(ppu.read_register(&rom, 0x2007, 0), 0x11);
        assert_eq!(ppu.read_register(&rom, 0x2007, 0), 0x22);
    }

    #[test]
    fn palette_backdrop_writes_fan_out() {
        let (mut ppu, mut rom) = setup();
        set_addr(&mut ppu, &mut rom, 0x3F10);
        ppu.write_register(&mut rom, 0x2007, 0x2D);
        for i in 0..8 {
            assert_eq!(ppu.palette[i << 2], 0x2D | BG_TRANSPARENT);
        }
        set_addr(&mut ppu, &mut rom, 0x3F05);
        ppu.write_register(&mut rom, 0x2007, 0xFF);
        assert_eq!(ppu.palette[5], 0x3F);
        set_addr(&mut ppu, &mut rom, 0x3F04);
        ppu.write_register(&mut rom, 0x2007, 0x01);
        assert_eq!(ppu.palette[4], 0x2D | BG_TRANSPARENT);
    }

    #[test]
    fn rendering_time_vram_write_is_corrupted_and_logged() {
        let (mut ppu, mut rom) = setup();
        ppu.scanline(&rom, None, 261, false, 0);
        ppu.scanline(&rom, None, 12, false, 0);
        set_addr(&mut ppu, &mut rom, 0x2000);
        ppu.write_register(&mut rom, 0x2007, 0x42);
        assert_eq!(ppu.nametab[0], 0xFF);
        let notes = ppu.take_notes();
        assert_eq!(notes, vec!["VRAM write to $2000, scanline 12".to_string()]);
        assert!(ppu.notes.is_empty());
    }

    #[test]
    fn high_nametable_pages_alias_low_ones() {
        let (mut ppu, mut rom) = setup();
        ppu.mirror(0, 1, 0, 1);
        ppu.write_register(&mut rom, 0x2001, 0);
        set_addr(&mut ppu, &mut rom, 0x2C05);
        ppu.write_register(&mut rom, 0x2007, 0x77);
        assert_eq!(ppu.read_mem(&rom, 0x2405), 0x77);
        assert_eq!(ppu.read_mem(&rom, 0x3C05), 0x77);
    }

    #[test]
    fn oam_dma_starts_at_oam_address() {
        let (mut ppu, mut rom) = setup();
        let mut page = [0u8; OAM_SIZE];
        for (i, byte) in page.iter_mut().enumerate() {
            *byte = i as u8;
        }
        ppu.write_register(&mut rom, 0x2003, 0x10);
        ppu.write_oam_dma(&page);
        assert_eq!(ppu.oam[0x10], 0);
        assert_eq!(ppu.oam[0x0F], 0xFF);
        assert_eq!(&ppu.oam[0..8], &page[0..8]);

        ppu.write_register(&mut rom, 0x2003, 0x04);
        ppu.write_oam_dma(&page);
        assert_eq!(&ppu.oam[4..8], &[0, 1, 2, 3]);
        assert_eq!(&ppu.oam[0..4], &[252, 253, 254, 255]);
    }

    fn solid_sprite_zero(ppu: &mut Ppu, rom: &mut Rom, x: u8) {
        // tile 1 row 0..8 fully opaque in both planes
        for row in 0..8 {
            rom.vram[0x10 + row] = 0xFF;
            rom.vram[0x18 + row] = 0xFF;
        }
        ppu.oam[0] = 9;
        ppu.oam[1] = 1;
        ppu.oam[2] = 0;
        ppu.oam[3] = x;
        ppu.write_register(rom, 0x2001, 0x1E);
    }

    #[test]
    fn skipped_frames_still_time_sprite_zero() {
        let (mut ppu, mut rom) = setup();
        solid_sprite_zero(&mut ppu, &mut rom, 30);
        ppu.scanline(&rom, None, 9, false, 100);
        assert!(!ppu.strike);
        ppu.scanline(&rom, None, 10, false, 200);
        assert!(ppu.strike);
        assert_eq!(ppu.strike_cycle, 210);
        assert_eq!(ppu.read_register(&rom, 0x2002, 209) & 0x40, 0);
        assert_eq!(ppu.read_register(&rom, 0x2002, 210) & 0x40, 0x40);
    }

    #[test]
    fn strike_deadline_holds_until_prerender_line() {
        let (mut ppu, mut rom) = setup();
        solid_sprite_zero(&mut ppu, &mut rom, 0);
        // opaque background under the sprite
        for i in 0..0x3C0 {
            ppu.nametab[i] = 1;
        }
        let mut last = 0;
        for line in 0..240 {
            ppu.scanline(&rom, None, line, true, line as u64 * 113);
            if ppu.strike {
                assert!(ppu.strike_cycle >= last);
                last = ppu.strike_cycle;
            }
            ppu.end_scanline(line);
        }
        assert_eq!(last, 10 * 113);
        ppu.scanline(&rom, None, 261, true, 0);
        assert!(!ppu.strike);
        assert_eq!(ppu.strike_cycle, STRIKE_NONE);
    }

    #[test]
    fn ninth_sprite_on_a_line_sets_overflow() {
        let (mut ppu, mut rom) = setup();
        ppu.write_register(&mut rom, 0x2001, MASK_SHOW_SPRITES);
        for sprite in 0..9 {
            ppu.oam[sprite * 4] = 19;
            ppu.oam[sprite * 4 + 3] = (sprite * 10) as u8;
        }
        for sprite in 9..64 {
            ppu.oam[sprite * 4] = 0xF0;
        }
        ppu.scanline(&rom, None, 20, true, 0);
        assert_eq!(ppu.read_register(&rom, 0x2002, 0) & 0x20, 0x20);
        ppu.scanline(&rom, None, 100, true, 0);
        assert_eq!(ppu.read_register(&rom, 0x2002, 0) & 0x20, 0);
    }

    #[test]
    fn frame_output_masks_marker_bits() {
        let (mut ppu, mut rom) = setup();
        set_addr(&mut ppu, &mut rom, 0x3F00);
        ppu.write_register(&mut rom, 0x2007, 0x21);
        ppu.write_register(&mut rom, 0x2001, 0);
        ppu.scanline(&rom, None, 5, true, 0);
        assert_eq!(ppu.frame_pixel(17, 5), 0x21);
        let mut row = [0u8; FRAME_WIDTH];
        ppu.frame_row(5, &mut row);
        assert!(row.iter().all(|&p| p == 0x21));
    }

    #[test]
    fn end_of_line_wraps_coarse_y_into_next_nametable() {
        let (mut ppu, _rom) = setup();
        ppu.vaddr = 0x7000 | (29 << 5);
        ppu.end_scanline(0);
        assert_eq!(ppu.vaddr, 0x0800);
        ppu.vaddr = 0x7000 | (31 << 5);
        ppu.end_scanline(0);
        assert_eq!(ppu.vaddr, 0);
        ppu.vaddr = 0x1000;
        ppu.end_scanline(0);
        assert_eq!(ppu.vaddr, 0x2000);
    }
}
