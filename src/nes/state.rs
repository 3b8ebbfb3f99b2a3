//! SNSS save states: a `SNSS` header with a block count, then tagged big-endian blocks.

use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

use super::apu::SOUND_REGS_LEN;
use super::bank::{self, Page, Region, chr_bank_of, prg_bank_of};
use super::cartridge::{SRAM_SIZE, VRAM_SIZE};
use super::cpu::RAM_SIZE;
use super::mapper::{MAPPER_STATE_LEN, MapperState};
use super::ppu::{NAMETABLE_SIZE, OAM_SIZE, PALETTE_SIZE};
use super::{Nes, push_event};

pub const SNSS_MAGIC: &[u8; 4] = b"SNSS";
const BLOCK_VERSION: u32 = 1;
const BLOCK_HEADER_LEN: usize = 12;

const BASE_BLOCK_LEN: usize = 0x1931;
const MAPPER_BLOCK_LEN: usize = 0x98;

const BASE_RAM: usize = 0x0009;
const BASE_OAM: usize = BASE_RAM + RAM_SIZE;
const BASE_NAMETAB: usize = BASE_OAM + OAM_SIZE;
const BASE_PALETTE: usize = BASE_NAMETAB + NAMETABLE_SIZE;
const BASE_MIRROR: usize = BASE_PALETTE + PALETTE_SIZE;
const BASE_VADDR: usize = BASE_MIRROR + 4;

struct BlockWriter {
    out: Vec<u8>,
    blocks: u32,
}

impl BlockWriter {
    fn new() -> Self {
        let mut out = Vec::with_capacity(BASE_BLOCK_LEN + 0x4000);
        out.extend_from_slice(SNSS_MAGIC);
        out.extend_from_slice(&0u32.to_be_bytes());
        Self { out, blocks: 0 }
    }

    fn block(&mut self, tag: &[u8; 4], body: &[u8]) {
        self.out.extend_from_slice(tag);
        self.out.extend_from_slice(&BLOCK_VERSION.to_be_bytes());
        self.out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.out.extend_from_slice(body);
        self.blocks += 1;
    }

    fn finish(mut self) -> Vec<u8> {
        self.out[4..8].copy_from_slice(&self.blocks.to_be_bytes());
        self.out
    }
}

struct Block<'a> {
    tag: [u8; 4],
    body: &'a [u8],
}

fn read_blocks(data: &[u8]) -> Result<Vec<Block<'_>>> {
    if data.len() < 8 || &data[0..4] != SNSS_MAGIC {
        bail!("not an SNSS save state");
    }
    let count = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    let mut blocks = Vec::new();
    let mut cursor = 8;
    for index in 0..count {
        let header = data
            .get(cursor..cursor + BLOCK_HEADER_LEN)
            .with_context(|| format!("save state truncated in block {index} header"))?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&header[0..4]);
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        cursor += BLOCK_HEADER_LEN;
        let body = data.get(cursor..cursor + len).with_context(|| {
            format!(
                "save state truncated in {} block",
                String::from_utf8_lossy(&tag)
            )
        })?;
        cursor += len;
        blocks.push(Block { tag, body });
    }
    Ok(blocks)
}

fn pad_to<const N: usize>(body: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = body.len().min(N);
    out[..len].copy_from_slice(&body[..len]);
    out
}

impl Nes {
    /// Serializes the machine into SNSS blocks.
    pub fn save_state(&self) -> Vec<u8> {
        let mut writer = BlockWriter::new();
        writer.block(b"BASR", &self.base_block());

        if self.rom.has_vram() {
            writer.block(b"VRAM", &self.rom.vram);
        }

        if self.rom.sram.iter().any(|&b| b != 0) {
            let mut body = Vec::with_capacity(SRAM_SIZE + 1);
            body.push(1);
            body.extend_from_slice(&self.rom.sram);
            writer.block(b"SRAM", &body);
        }

        writer.block(b"SOUN", &self.apu.registers());

        if self.rom.mapper_number != 0 {
            writer.block(b"MPRD", &self.mapper_block());
        }

        writer.finish()
    }

    fn base_block(&self) -> Vec<u8> {
        let mut body = vec![0u8; BASE_BLOCK_LEN];
        body[0] = self.cpu.a;
        body[1] = self.cpu.x;
        body[2] = self.cpu.y;
        body[3] = self.cpu.p;
        body[4] = self.cpu.s;
        body[5..7].copy_from_slice(&self.cpu.pc.to_be_bytes());
        body[7] = self.ppu.ctrl0;
        body[8] = self.ppu.ctrl1;
        body[BASE_RAM..BASE_OAM].copy_from_slice(&self.cpu.ram);
        body[BASE_OAM..BASE_NAMETAB].copy_from_slice(&self.ppu.oam);
        body[BASE_NAMETAB..BASE_PALETTE].copy_from_slice(&self.ppu.nametab);
        for (dst, &src) in body[BASE_PALETTE..BASE_MIRROR]
            .iter_mut()
            .zip(self.ppu.palette.iter())
        {
            *dst = src & 0x3F;
        }
        for i in 0..4 {
            let page = self.ppu.pages[8 + i];
            body[BASE_MIRROR + i] = match page.region {
                Region::Nametable => (page.offset >> 10) as u8,
                _ => i as u8,
            };
        }
        body[BASE_VADDR..BASE_VADDR + 2].copy_from_slice(&self.ppu.vaddr.to_be_bytes());
        body[BASE_VADDR + 2] = self.ppu.oam_addr;
        body[BASE_VADDR + 3] = self.ppu.tile_xofs;
        body
    }

    fn mapper_block(&self) -> Vec<u8> {
        let mut body = vec![0u8; MAPPER_BLOCK_LEN];
        for i in 0..4 {
            let bank = prg_bank_of(&self.cpu.pages, 0x8000 + (i as u16) * 0x2000);
            body[i * 2..i * 2 + 2].copy_from_slice(&bank.to_be_bytes());
        }
        for i in 0..8 {
            let bank = if self.rom.has_chr_rom() {
                chr_bank_of(&self.ppu.pages, i)
            } else {
                i as u16
            };
            body[8 + i * 2..8 + i * 2 + 2].copy_from_slice(&bank.to_be_bytes());
        }

        let mut extra: MapperState = [0; MAPPER_STATE_LEN];
        if let Some(mapper) = self.mapper.as_ref() {
            mapper.save_state(&mut extra);
        }
        body[0x18..].copy_from_slice(&extra);
        body
    }

    /// Restores a state written by `save_state`. Unknown blocks are logged and skipped.
    pub fn load_state(&mut self, data: &[u8]) -> Result<()> {
        if self.mapper.is_none() {
            bail!("no cartridge inserted");
        }
        let blocks = read_blocks(data)?;

        // A state without an SRAM block was saved with SRAM all zero.
        if !blocks.iter().any(|block| &block.tag == b"SRAM") {
            self.rom.sram.fill(0);
        }

        for block in &blocks {
            match &block.tag {
                b"BASR" => self.load_base_block(block.body),
                b"VRAM" => {
                    let len = block.body.len().min(VRAM_SIZE);
                    if let Some(vram) = self.rom.region_mut(Region::Vram) {
                        let len = len.min(vram.len());
                        vram[..len].copy_from_slice(&block.body[..len]);
                    }
                }
                b"SRAM" => {
                    let image = block.body.get(1..).unwrap_or_default();
                    let len = image.len().min(SRAM_SIZE);
                    self.rom.sram[..len].copy_from_slice(&image[..len]);
                }
                b"MPRD" => self.load_mapper_block(block.body),
                b"CNTR" => {}
                b"SOUN" => {
                    let regs: [u8; SOUND_REGS_LEN] = pad_to(block.body);
                    self.apu.load_registers(&regs);
                }
                tag => push_event(
                    &mut self.debug_events,
                    format!(
                        "unknown SNSS block {} skipped",
                        String::from_utf8_lossy(tag)
                    ),
                ),
            }
        }

        self.push_debug_event(format!("state loaded ({} blocks)", blocks.len()));
        Ok(())
    }

    fn load_base_block(&mut self, body: &[u8]) {
        let body: [u8; BASE_BLOCK_LEN] = pad_to(body);

        self.cpu.a = body[0];
        self.cpu.x = body[1];
        self.cpu.y = body[2];
        self.cpu.p = body[3];
        self.cpu.s = body[4];
        self.cpu.pc = u16::from_be_bytes([body[5], body[6]]);
        self.ppu.ctrl0 = body[7];
        self.ppu.ctrl1 = body[8];
        self.cpu.ram.copy_from_slice(&body[BASE_RAM..BASE_OAM]);
        self.ppu.oam.copy_from_slice(&body[BASE_OAM..BASE_NAMETAB]);
        self.ppu
            .nametab
            .copy_from_slice(&body[BASE_NAMETAB..BASE_PALETTE]);
        self.ppu
            .palette
            .copy_from_slice(&body[BASE_PALETTE..BASE_MIRROR]);
        let backdrop = self.ppu.palette[0] | 0x80;
        for i in 0..8 {
            self.ppu.palette[i << 2] = backdrop;
        }

        for i in 0..4 {
            self.ppu.pages[8 + i] =
                Page::new(Region::Nametable, ((body[BASE_MIRROR + i] & 3) as usize) << 10);
        }
        self.ppu.mirror_high_pages();

        let vaddr = u16::from_be_bytes([body[BASE_VADDR], body[BASE_VADDR + 1]]);
        self.ppu.oam_addr = body[BASE_VADDR + 2];
        self.ppu.tile_xofs = body[BASE_VADDR + 3];
        self.ppu.flipflop = false;
        self.ppu.strike = false;

        let (ctrl0, ctrl1) = (self.ppu.ctrl0, self.ppu.ctrl1);
        self.bus_write(0x2000, ctrl0);
        self.bus_write(0x2001, ctrl1);
        self.bus_write(0x2006, (vaddr >> 8) as u8);
        self.bus_write(0x2006, vaddr as u8);
        // $2006 only carries 14 bits; keep fine y intact.
        self.ppu.vaddr = vaddr;
    }

    fn load_mapper_block(&mut self, body: &[u8]) {
        let body: [u8; MAPPER_BLOCK_LEN] = pad_to(body);

        for i in 0..4 {
            let bank = u16::from_be_bytes([body[i * 2], body[i * 2 + 1]]);
            bank::bank_prg(
                &mut self.cpu.pages,
                &self.rom,
                8,
                0x8000 + (i as u16) * 0x2000,
                bank as i32,
            );
        }

        if self.rom.has_chr_rom() {
            for i in 0..8 {
                let bank = u16::from_be_bytes([body[8 + i * 2], body[8 + i * 2 + 1]]);
                bank::bank_chr(
                    &mut self.ppu.pages,
                    &self.rom,
                    1,
                    (i as u16) * 0x400,
                    bank as i32,
                );
            }
        } else {
            for i in 0..8 {
                self.ppu.pages[i] = Page::new(Region::Vram, i * 0x400);
            }
        }
        self.ppu.mirror_high_pages();

        let extra: MapperState = pad_to(&body[0x18..]);
        if let Some(mapper) = self.mapper.as_mut() {
            mapper.load_state(&extra);
        }
    }

    pub fn save_state_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.save_state())
            .with_context(|| format!("failed to write save state: {}", path.display()))
    }

    pub fn load_state_file(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)
            .with_context(|| format!("failed to read save state: {}", path.display()))?;
        self.load_state(&data)
            .with_context(|| format!("failed to load save state: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::tests::make_rom;
    use crate::nes::tests::machine;

    const SPIN: &[u8] = &[0x4C, 0x00, 0x80];

    #[test]
    fn round_trip_restores_cpu_and_ppu_memory() {
        let mut nes = machine(SPIN);
        nes.render_frame(true);
        nes.cpu.a = 0x11;
        nes.cpu.x = 0x22;
        nes.cpu.y = 0x33;
        nes.cpu.s = 0xF0;
        nes.cpu.pc = 0x8123;
        nes.cpu.ram[0x300] = 0x5A;
        nes.ppu.oam[9] = 0x77;
        nes.ppu.nametab[0x400] = 0x3C;
        nes.ppu.palette[5] = 0x16;
        nes.ppu.mirror(0, 1, 0, 1);
        let saved = nes.save_state();

        let mut other = machine(SPIN);
        other.load_state(&saved).expect("valid state");
        assert_eq!(other.cpu.a, 0x11);
        assert_eq!(other.cpu.x, 0x22);
        assert_eq!(other.cpu.y, 0x33);
        assert_eq!(other.cpu.s, 0xF0);
        assert_eq!(other.cpu.pc, 0x8123);
        assert_eq!(other.cpu.ram[0x300], 0x5A);
        assert_eq!(other.ppu.oam[9], 0x77);
        assert_eq!(other.ppu.nametab[0x400], 0x3C);
        assert_eq!(other.ppu.palette[5], 0x16);
        assert_eq!(other.ppu.palette[4] & 0x80, 0x80);
        assert_eq!(other.ppu.pages[9], Page::new(Region::Nametable, 0x400));
        assert_eq!(other.ppu.pages[13], other.ppu.pages[9]);
        assert_eq!(other.save_state(), saved);
    }

    #[test]
    fn mapper_banks_survive_a_round_trip() {
        let mut nes = Nes::new();
        nes.insert(make_rom(4, 8, 8)).expect("MMC3 supported");
        nes.bus_write(0x8000, 0x06);
        nes.bus_write(0x8001, 0x05);
        nes.bus_write(0x8000, 0x02);
        nes.bus_write(0x8001, 0x13);
        let prg = nes.bus_read(0x8000);
        let chr = nes.ppu.read_mem(&nes.rom, 0x1000);
        let saved = nes.save_state();

        let mut other = Nes::new();
        other.insert(make_rom(4, 8, 8)).expect("MMC3 supported");
        other.load_state(&saved).expect("valid state");
        assert_eq!(other.bus_read(0x8000), prg);
        assert_eq!(other.ppu.read_mem(&other.rom, 0x1000), chr);
    }

    #[test]
    fn sram_block_only_when_written() {
        let mut nes = machine(SPIN);
        let tags = |data: &[u8]| -> Vec<[u8; 4]> {
            read_blocks(data)
                .expect("valid")
                .iter()
                .map(|block| block.tag)
                .collect()
        };
        assert!(!tags(&nes.save_state()).contains(b"SRAM"));
        assert!(!tags(&nes.save_state()).contains(b"MPRD"));

        nes.bus_write(0x6010, 0x42);
        let saved = nes.save_state();
        assert!(tags(&saved).contains(b"SRAM"));

        let mut other = machine(SPIN);
        other.load_state(&saved).expect("valid state");
        assert_eq!(other.sram()[0x10], 0x42);
    }

    #[test]
    fn sram_written_after_a_save_is_rolled_back() {
        let mut nes = machine(SPIN);
        let saved = nes.save_state();
        nes.bus_write(0x6000, 0xAB);
        nes.load_state(&saved).expect("valid state");
        assert_eq!(nes.bus_read(0x6000), 0);
        assert_eq!(nes.save_state(), saved);
    }

    #[test]
    fn sound_registers_are_replayed() {
        let mut nes = machine(SPIN);
        nes.bus_write(0x4015, 0x01);
        nes.bus_write(0x4000, 0x9F);
        nes.bus_write(0x4003, 0x08);
        let saved = nes.save_state();

        let mut other = machine(SPIN);
        other.load_state(&saved).expect("valid state");
        assert_eq!(other.apu.registers(), nes.apu.registers());
        assert_eq!(other.bus_read(0x4015) & 0x01, 0x01);
    }

    #[test]
    fn unknown_blocks_are_skipped_and_logged() {
        let mut nes = machine(SPIN);
        let mut writer = BlockWriter::new();
        writer.block(b"XTRA", &[1, 2, 3]);
        writer.block(b"CNTR", &[0]);
        nes.load_state(&writer.finish()).expect("skippable");
        assert!(
            nes.recent_events(4)
                .iter()
                .any(|event| event.contains("XTRA"))
        );
    }

    #[test]
    fn truncated_or_foreign_data_is_rejected() {
        let mut nes = machine(SPIN);
        assert!(nes.load_state(b"NOPE\0\0\0\0").is_err());

        let mut saved = nes.save_state();
        saved.truncate(100);
        assert!(nes.load_state(&saved).is_err());
    }
}
